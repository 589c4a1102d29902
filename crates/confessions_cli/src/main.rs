//! Command-line front end for the confessions feed.
//!
//! # Responsibility
//! - Load config from `CONFESSIONS_*` (or `--config <file.json>`), start
//!   logging and pick the record store.
//! - Run one command against the feed and print the result.
//!
//! Commands:
//! `list [category]`, `show <id>`, `search <term>`, `like <id>`,
//! `comment <id> <text>`, `reply <id> <comment_id> <text>`,
//! `publish <category> <title> <content>`, `categories`, `ping`.

use chrono::Utc;
use confessions_core::model::comment::{count_comments, sort_for_display, Comment};
use confessions_core::model::confession::{category_label, CATEGORIES};
use confessions_core::model::timestamp::format_relative;
use confessions_core::service::feed_filter::search_content;
use confessions_core::{
    init_from_config, AppConfig, Confession, HttpRecordStore, LikeLedger, MutationCoordinator,
    MutationOutcome, NewConfession, RecordStore, SqliteLedgerRepository, SqliteRecordStore,
};
use log::{info, warn};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    match run(&mut args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &mut Vec<String>) -> Result<(), String> {
    let config = load_config(args)?;
    if args.first().map(String::as_str) == Some("ping") {
        println!("confessions_core ping={}", confessions_core::ping());
        println!("confessions_core version={}", confessions_core::core_version());
        return Ok(());
    }
    if args.first().map(String::as_str) == Some("categories") {
        for (tag, label) in CATEGORIES {
            println!("{tag:<14}{label}");
        }
        return Ok(());
    }

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|err| format!("cannot create {}: {err}", config.data_dir.display()))?;
    if let Err(err) = init_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let conn = confessions_core::db::open_db(config.db_path()).map_err(|err| err.to_string())?;
    let ledger_repo = SqliteLedgerRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let ledger = LikeLedger::load(ledger_repo).map_err(|err| err.to_string())?;

    match &config.store_url {
        Some(url) => {
            info!("event=cli_start module=cli status=ok store=http");
            let store = HttpRecordStore::new(url.as_str(), config.request_timeout());
            execute(MutationCoordinator::new(store, ledger), &config, args)
        }
        None => {
            info!("event=cli_start module=cli status=ok store=sqlite");
            let store = SqliteRecordStore::try_new(&conn).map_err(|err| err.to_string())?;
            execute(MutationCoordinator::new(store, ledger), &config, args)
        }
    }
}

fn load_config(args: &mut Vec<String>) -> Result<AppConfig, String> {
    let Some(position) = args.iter().position(|arg| arg == "--config") else {
        return AppConfig::from_env().map_err(|err| err.to_string());
    };
    let path = args
        .get(position + 1)
        .cloned()
        .ok_or_else(|| "--config needs a file path".to_string())?;
    args.drain(position..=position + 1);
    AppConfig::from_json_file(path).map_err(|err| err.to_string())
}

fn execute<S, L>(
    coordinator: MutationCoordinator<S, L>,
    config: &AppConfig,
    args: &[String],
) -> Result<(), String>
where
    S: RecordStore,
    L: confessions_core::LedgerRepository,
{
    let mut coordinator = coordinator.with_author(config.author_label.as_str());
    if let Err(err) = coordinator.load() {
        report_notice(&mut coordinator);
        return Err(err.to_string());
    }

    let command = args.first().map(String::as_str).unwrap_or("list");
    let arg = |index: usize, name: &str| {
        args.get(index)
            .map(String::as_str)
            .ok_or_else(|| format!("`{command}` needs <{name}>"))
    };

    match command {
        "list" => {
            if let Some(category) = args.get(1) {
                coordinator.session_mut().select_category(category);
            }
            let visible = coordinator.visible_feed();
            if visible.is_empty() {
                println!("No confessions yet.");
            }
            for confession in visible {
                print_summary(&coordinator, confession);
            }
        }
        "search" => {
            let term = args[1..].join(" ");
            for confession in search_content(coordinator.feed(), &term) {
                print_summary(&coordinator, confession);
            }
        }
        "show" => {
            let id = arg(1, "id")?;
            let confession = coordinator
                .confession(id)
                .ok_or_else(|| format!("no confession {id}"))?;
            print_summary(&coordinator, confession);
            println!("{}", confession.content);
            print_comments(&confession.comments, 1);
        }
        "like" => {
            let id = arg(1, "id")?;
            coordinator.toggle_like(id).map_err(|err| err.to_string())?;
            settle_all(&mut coordinator);
            let likes = coordinator.confession(id).map_or(0, |c| c.likes);
            println!("{id}: {likes} likes (liked: {})", coordinator.is_liked(id));
        }
        "comment" => {
            let id = arg(1, "id")?;
            let text = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
            match coordinator.post_comment(id, &text).map_err(|err| err.to_string())? {
                Some(_) => settle_all(&mut coordinator),
                None => println!("Nothing to post."),
            }
        }
        "reply" => {
            let id = arg(1, "id")?;
            let parent = arg(2, "comment_id")?;
            let text = args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();
            match coordinator
                .post_reply(id, parent, &text)
                .map_err(|err| err.to_string())?
            {
                Some(_) => settle_all(&mut coordinator),
                None => println!("Nothing to post."),
            }
        }
        "publish" => {
            let draft = NewConfession {
                category: arg(1, "category")?.to_string(),
                title: arg(2, "title")?.to_string(),
                content: args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default(),
            };
            let published = coordinator.publish(&draft);
            report_notice(&mut coordinator);
            match published.map_err(|err| err.to_string())? {
                Some(id) => println!("Published confession {id}."),
                None => println!("Nothing to publish."),
            }
        }
        other => return Err(format!("unknown command `{other}`")),
    }
    Ok(())
}

fn settle_all<S: RecordStore, L: confessions_core::LedgerRepository>(
    coordinator: &mut MutationCoordinator<S, L>,
) {
    for (ticket, outcome) in coordinator.run_pending() {
        match outcome {
            MutationOutcome::Confirmed => println!("Saved ({ticket})."),
            MutationOutcome::RolledBack { reason } => {
                warn!("event=cli_write module=cli status=rolled_back ticket={ticket}");
                println!("Reverted ({ticket}): {reason}");
            }
        }
    }
    report_notice(coordinator);
}

fn report_notice<S: RecordStore, L: confessions_core::LedgerRepository>(
    coordinator: &mut MutationCoordinator<S, L>,
) {
    if let Some(notice) = coordinator.session_mut().take_notice() {
        eprintln!("{}", notice.message);
    }
}

fn print_summary<S: RecordStore, L: confessions_core::LedgerRepository>(
    coordinator: &MutationCoordinator<S, L>,
    confession: &Confession,
) {
    let liked = if coordinator.is_liked(&confession.id) { "*" } else { " " };
    println!(
        "[{}] {} ({}, {}) {}{} likes, {} comments",
        confession.id,
        confession.title,
        category_label(&confession.category).unwrap_or(confession.category.as_str()),
        format_relative(&confession.timestamp, Utc::now()),
        liked,
        confession.likes,
        count_comments(&confession.comments)
    );
    let session = coordinator.session();
    println!("    {}", session.display_content(confession).replace('\n', "\n    "));
    if session.has_more(confession) {
        println!("    Read more: show {}", confession.id);
    }
}

fn print_comments(comments: &[Comment], depth: usize) {
    for comment in sort_for_display(comments) {
        println!(
            "{}- [{}] {}: {}",
            "  ".repeat(depth),
            comment.id,
            comment.author,
            comment.text
        );
        print_comments(&comment.replies, depth + 1);
    }
}
