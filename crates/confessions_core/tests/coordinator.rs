use confessions_core::db::open_db_in_memory;
use confessions_core::model::comment::{count_comments, find_comment, Comment};
use confessions_core::{
    CoordinatorError, DraftTarget, FieldPatch, LedgerRepository, LikeLedger, MutationCoordinator,
    MutationOutcome, NewConfession, NoticeKind, RawRecord, RecordStore, SqliteLedgerRepository, StoreError,
    StoreResult,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};

#[derive(Default)]
struct FakeStore {
    records: Vec<RawRecord>,
    patches: RefCell<Vec<(String, FieldPatch)>>,
    created: RefCell<Vec<RawRecord>>,
    fail_writes: Cell<bool>,
    fail_reads: Cell<bool>,
}

impl FakeStore {
    fn with(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    fn patch_count(&self) -> usize {
        self.patches.borrow().len()
    }

    fn last_patch(&self) -> (String, FieldPatch) {
        self.patches.borrow().last().cloned().unwrap()
    }
}

impl RecordStore for FakeStore {
    fn list_all(&self) -> StoreResult<Vec<RawRecord>> {
        if self.fail_reads.get() {
            return Err(StoreError::Status {
                code: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(self.records.clone())
    }

    fn patch_by_id(&self, id: &str, fields: &FieldPatch) -> StoreResult<()> {
        self.patches
            .borrow_mut()
            .push((id.to_string(), fields.clone()));
        if self.fail_writes.get() {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    fn create(&self, record: &RawRecord) -> StoreResult<()> {
        if self.fail_writes.get() {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        self.created.borrow_mut().push(record.clone());
        Ok(())
    }
}

fn record(id: &str, timestamp: &str, likes: u64, comments: Value) -> RawRecord {
    RawRecord {
        id: Some(json!(id)),
        title: Some(json!(format!("title {id}"))),
        content: Some(json!(format!("content {id}"))),
        category: Some(json!("work")),
        timestamp: Some(json!(timestamp)),
        likes: Some(json!(likes)),
        comments: Some(comments),
    }
}

fn seeded_store() -> FakeStore {
    let thread = json!([{
        "id": "c1",
        "text": "first",
        "author": "Anonymous",
        "timestamp": "2024-03-01T10:00:00Z",
        "replies": [{
            "id": "c2",
            "text": "nested",
            "author": "Anonymous",
            "timestamp": "2024-03-01T11:00:00Z",
            "replies": []
        }]
    }]);
    let mut family = record("2", "2024-03-02T09:00:00Z", 1, json!("[]"));
    family.category = Some(json!("family"));
    FakeStore::with(vec![
        record("1", "2024-03-01T09:00:00Z", 5, json!(thread.to_string())),
        family,
        record("3", "2024-03-03T09:00:00Z", 0, json!("")),
    ])
}

fn coordinator<'a>(
    store: &'a FakeStore,
    conn: &'a Connection,
) -> MutationCoordinator<&'a FakeStore, SqliteLedgerRepository<'a>> {
    let repo = SqliteLedgerRepository::try_new(conn).unwrap();
    let mut coordinator = MutationCoordinator::new(store, LikeLedger::load(repo).unwrap());
    coordinator.load().unwrap();
    coordinator
}

fn comments_in(patch: &FieldPatch) -> Vec<Comment> {
    let encoded = patch.get("comments").and_then(Value::as_str).unwrap();
    serde_json::from_str(encoded).unwrap()
}

#[test]
fn load_orders_newest_first() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let coordinator = coordinator(&store, &conn);

    let ids: Vec<&str> = coordinator.feed().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2", "1"]);
    assert_eq!(count_comments(&coordinator.feed()[2].comments), 2);
}

#[test]
fn visible_feed_follows_selected_category() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    coordinator.session_mut().select_category("family");
    let ids: Vec<&str> = coordinator
        .visible_feed()
        .into_iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(ids, vec!["2"]);

    coordinator.session_mut().select_category("all");
    assert_eq!(coordinator.visible_feed().len(), 3);
}

#[test]
fn failed_reload_keeps_previous_feed() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    store.fail_reads.set(true);
    assert!(matches!(coordinator.load(), Err(CoordinatorError::Store(_))));
    assert_eq!(coordinator.feed().len(), 3);
    assert_eq!(
        coordinator.session().notice().map(|n| n.kind),
        Some(NoticeKind::LoadFailed)
    );
}

#[test]
fn like_applies_before_dispatch_and_confirms() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let ticket = coordinator.toggle_like("1").unwrap();
    assert_eq!(coordinator.confession("1").unwrap().likes, 6);
    assert!(coordinator.is_liked("1"));
    assert_eq!(store.patch_count(), 0);
    assert_eq!(coordinator.queued_tickets(), vec![ticket]);

    assert_eq!(coordinator.dispatch(ticket).unwrap(), MutationOutcome::Confirmed);
    let (id, fields) = store.last_patch();
    assert_eq!(id, "1");
    assert_eq!(fields.get("likes"), Some(&json!(6)));
    assert_eq!(fields.len(), 1);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn toggling_twice_returns_to_original_count() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    coordinator.toggle_like("1").unwrap();
    coordinator.toggle_like("1").unwrap();
    let settled = coordinator.run_pending();

    assert_eq!(settled.len(), 2);
    assert_eq!(coordinator.confession("1").unwrap().likes, 5);
    assert!(!coordinator.is_liked("1"));
    assert_eq!(store.last_patch().1.get("likes"), Some(&json!(5)));
}

#[test]
fn unlike_never_goes_below_zero() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    SqliteLedgerRepository::try_new(&conn)
        .unwrap()
        .save_liked(&["3".to_string()])
        .unwrap();
    let mut coordinator = coordinator(&store, &conn);

    assert!(coordinator.is_liked("3"));
    coordinator.toggle_like("3").unwrap();
    assert_eq!(coordinator.confession("3").unwrap().likes, 0);
    assert!(!coordinator.is_liked("3"));
}

#[test]
fn rejected_like_reverts_count_and_ledger() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    store.fail_writes.set(true);

    let ticket = coordinator.toggle_like("1").unwrap();
    let outcome = coordinator.dispatch(ticket).unwrap();

    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(coordinator.confession("1").unwrap().likes, 5);
    assert!(!coordinator.is_liked("1"));
    let notice = coordinator.session_mut().take_notice().unwrap();
    assert_eq!(notice.kind, NoticeKind::LikeFailed);
    assert_eq!(notice.record_id.as_deref(), Some("1"));

    let reloaded = LikeLedger::load(SqliteLedgerRepository::try_new(&conn).unwrap()).unwrap();
    assert!(!reloaded.is_liked("1"));
}

#[test]
fn blank_comment_makes_no_write() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    assert_eq!(coordinator.post_comment("3", "  \n ").unwrap(), None);
    assert_eq!(coordinator.post_reply("1", "c1", "").unwrap(), None);
    assert!(coordinator.run_pending().is_empty());
    assert_eq!(store.patch_count(), 0);
    assert!(coordinator.confession("3").unwrap().comments.is_empty());
}

#[test]
fn confirmed_comment_clears_draft() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn).with_author("Night Owl");
    let target = DraftTarget::comment("3");
    coordinator.session_mut().set_draft(target.clone(), "  hello there ");

    let ticket = coordinator.submit_draft(&target).unwrap().unwrap();
    let local = &coordinator.confession("3").unwrap().comments;
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].text, "hello there");
    assert_eq!(local[0].author, "Night Owl");
    assert!(local[0].replies.is_empty());
    assert_eq!(coordinator.session().draft(&target), Some("  hello there "));

    assert_eq!(coordinator.dispatch(ticket).unwrap(), MutationOutcome::Confirmed);
    assert_eq!(coordinator.session().draft(&target), None);
    let (id, fields) = store.last_patch();
    assert_eq!(id, "3");
    assert_eq!(comments_in(&fields), coordinator.confession("3").unwrap().comments);
}

#[test]
fn rejected_comment_restores_tree_and_keeps_draft() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    let before = coordinator.confession("1").unwrap().comments.clone();
    let target = DraftTarget::comment("1");
    coordinator.session_mut().set_draft(target.clone(), "will fail");
    store.fail_writes.set(true);

    coordinator.submit_draft(&target).unwrap();
    let settled = coordinator.run_pending();

    assert!(matches!(settled[0].1, MutationOutcome::RolledBack { .. }));
    assert_eq!(coordinator.confession("1").unwrap().comments, before);
    assert_eq!(coordinator.session().draft(&target), Some("will fail"));
    assert_eq!(
        coordinator.session().notice().map(|n| n.kind),
        Some(NoticeKind::CommentFailed)
    );
}

#[test]
fn reply_lands_under_nested_parent_and_closes_reply_box() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    coordinator.session_mut().start_reply("1", "c2");
    let target = DraftTarget::reply("1", "c2");
    coordinator.session_mut().set_draft(target.clone(), "deep");

    let ticket = coordinator.submit_draft(&target).unwrap().unwrap();
    coordinator.dispatch(ticket).unwrap();

    let tree = &coordinator.confession("1").unwrap().comments;
    let parent = find_comment(tree, "c2").unwrap();
    assert_eq!(parent.replies.len(), 1);
    assert_eq!(parent.replies[0].text, "deep");
    assert_eq!(count_comments(tree), 3);
    assert!(coordinator.session().reply_target().is_none());
    assert_eq!(comments_in(&store.last_patch().1), *tree);
}

#[test]
fn reply_to_unknown_parent_changes_nothing() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    let before = coordinator.confession("1").unwrap().comments.clone();

    let err = coordinator.post_reply("1", "missing", "hi").unwrap_err();
    assert!(matches!(err, CoordinatorError::CommentNotFound { .. }));
    assert_eq!(coordinator.confession("1").unwrap().comments, before);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn mutations_on_unknown_confession_fail_fast() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    assert!(matches!(
        coordinator.toggle_like("nope"),
        Err(CoordinatorError::ConfessionNotFound(_))
    ));
    assert!(matches!(
        coordinator.post_comment("nope", "hi"),
        Err(CoordinatorError::ConfessionNotFound(_))
    ));
    assert!(!coordinator.is_liked("nope"));
}

#[test]
fn overlapping_comments_each_send_the_full_tree() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let first = coordinator.post_comment("3", "one").unwrap().unwrap();
    let second = coordinator.post_comment("3", "two").unwrap().unwrap();
    assert_eq!(coordinator.queued_tickets(), vec![first, second]);

    coordinator.run_pending();
    let patches = store.patches.borrow();
    assert_eq!(comments_in(&patches[0].1).len(), 1);
    assert_eq!(comments_in(&patches[1].1).len(), 2);
    assert_eq!(coordinator.confession("3").unwrap().comments.len(), 2);
}

#[test]
fn writes_can_settle_out_of_order() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let like = coordinator.toggle_like("2").unwrap();
    let comment = coordinator.post_comment("2", "later").unwrap().unwrap();
    let comment_write = coordinator.take_write(comment).unwrap();
    let like_write = coordinator.take_write(like).unwrap();
    assert_eq!(comment_write.record_id, "2");
    assert!(coordinator.queued_tickets().is_empty());

    coordinator.settle(comment, Ok(())).unwrap();
    coordinator
        .settle(like, Err(StoreError::Transport("timeout".to_string())))
        .unwrap();

    assert_eq!(like_write.fields.get("likes"), Some(&json!(2)));
    assert_eq!(coordinator.confession("2").unwrap().likes, 1);
    assert_eq!(coordinator.confession("2").unwrap().comments.len(), 1);
    assert!(matches!(
        coordinator.settle(like, Ok(())),
        Err(CoordinatorError::UnknownTicket(_))
    ));
}

#[test]
fn overlapping_failed_toggles_restore_persisted_count() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    store.fail_writes.set(true);

    coordinator.toggle_like("1").unwrap();
    coordinator.toggle_like("1").unwrap();
    assert_eq!(coordinator.confession("1").unwrap().likes, 5);

    let settled = coordinator.run_pending();
    assert_eq!(settled.len(), 2);
    assert_eq!(coordinator.confession("1").unwrap().likes, 5);
    assert!(!coordinator.is_liked("1"));
    let reloaded = LikeLedger::load(SqliteLedgerRepository::try_new(&conn).unwrap()).unwrap();
    assert!(!reloaded.is_liked("1"));
}

#[test]
fn failed_older_toggle_keeps_newer_pending_toggle_visible() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let first = coordinator.toggle_like("1").unwrap();
    let second = coordinator.toggle_like("1").unwrap();
    let third = coordinator.toggle_like("1").unwrap();
    coordinator
        .settle(first, Err(StoreError::Transport("timeout".to_string())))
        .unwrap();

    // Two toggles still pending on top of the untouched 5.
    assert_eq!(coordinator.confession("1").unwrap().likes, 5);
    assert!(!coordinator.is_liked("1"));

    coordinator.settle(third, Ok(())).unwrap();
    coordinator
        .settle(second, Err(StoreError::Transport("timeout".to_string())))
        .unwrap();
    assert_eq!(coordinator.confession("1").unwrap().likes, 6);
    assert!(coordinator.is_liked("1"));
}

#[test]
fn overlapping_failed_comments_leave_no_phantom_comment() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    let target = DraftTarget::comment("3");
    coordinator.session_mut().set_draft(target.clone(), "two");
    store.fail_writes.set(true);

    coordinator.post_comment("3", "one").unwrap().unwrap();
    coordinator.submit_draft(&target).unwrap().unwrap();
    assert_eq!(coordinator.confession("3").unwrap().comments.len(), 2);

    let settled = coordinator.run_pending();
    assert!(settled
        .iter()
        .all(|(_, outcome)| matches!(outcome, MutationOutcome::RolledBack { .. })));
    assert!(coordinator.confession("3").unwrap().comments.is_empty());
    assert_eq!(coordinator.session().draft(&target), Some("two"));
}

#[test]
fn failed_comment_keeps_later_pending_comment() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let first = coordinator.post_comment("3", "one").unwrap().unwrap();
    let second = coordinator.post_comment("3", "two").unwrap().unwrap();
    coordinator
        .settle(first, Err(StoreError::Transport("timeout".to_string())))
        .unwrap();

    let visible = &coordinator.confession("3").unwrap().comments;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].text, "two");

    // The accepted write carried the whole tree, "one" included.
    coordinator.settle(second, Ok(())).unwrap();
    let texts: Vec<&str> = coordinator
        .confession("3")
        .unwrap()
        .comments
        .iter()
        .map(|c| c.text.as_str())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn records_without_their_own_id_refuse_remote_writes() {
    let mut anonymous = record("", "2024-03-04T09:00:00Z", 2, json!("[]"));
    anonymous.id = None;
    let store = FakeStore::with(vec![anonymous]);
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);
    let id = coordinator.feed()[0].id.clone();
    assert!(coordinator.feed()[0].local_only);

    assert!(matches!(
        coordinator.toggle_like(&id),
        Err(CoordinatorError::LocalOnly(_))
    ));
    assert!(matches!(
        coordinator.post_comment(&id, "hi"),
        Err(CoordinatorError::LocalOnly(_))
    ));
    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(coordinator.confession(&id).unwrap().likes, 2);
    assert!(!coordinator.is_liked(&id));
    assert!(coordinator.run_pending().is_empty());
    assert_eq!(store.patch_count(), 0);
}

#[test]
fn publish_prepends_after_store_accepts() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    let draft = NewConfession {
        title: "  ".to_string(),
        content: " I ate the last cookie ".to_string(),
        category: "Family".to_string(),
    };
    let id = coordinator.publish(&draft).unwrap().unwrap();

    let head = &coordinator.feed()[0];
    assert_eq!(head.id, id);
    assert_eq!(head.title, "Untitled");
    assert_eq!(head.content, "I ate the last cookie");
    assert_eq!(head.category, "family");
    assert_eq!(head.likes, 0);
    assert_eq!(store.created.borrow().len(), 1);
}

#[test]
fn publish_skips_blank_content_and_reports_failures() {
    let store = seeded_store();
    let conn = open_db_in_memory().unwrap();
    let mut coordinator = coordinator(&store, &conn);

    assert_eq!(coordinator.publish(&NewConfession::default()).unwrap(), None);
    store.fail_writes.set(true);
    let draft = NewConfession {
        content: "secret".to_string(),
        ..NewConfession::default()
    };
    assert!(matches!(
        coordinator.publish(&draft),
        Err(CoordinatorError::Store(_))
    ));
    assert_eq!(coordinator.feed().len(), 3);
    assert_eq!(
        coordinator.session().notice().map(|n| n.kind),
        Some(NoticeKind::PublishFailed)
    );
}
