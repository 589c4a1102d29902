//! Pure feed filters.
//!
//! # Invariants
//! - Filters never reorder or modify entries.
//! - The `all` selection is the identity filter.

use crate::model::confession::{Confession, ALL_CATEGORIES};

/// Keeps confessions whose tag equals `category`; `all` keeps everything.
///
/// Selection is matched case-insensitively after trimming.
pub fn filter_by_category<'a>(feed: &'a [Confession], category: &str) -> Vec<&'a Confession> {
    let selected = category.trim().to_lowercase();
    if selected == ALL_CATEGORIES {
        return feed.iter().collect();
    }
    feed.iter()
        .filter(|confession| confession.category == selected)
        .collect()
}

/// Keeps confessions whose content contains `term`, ignoring case.
/// A blank term keeps everything.
pub fn search_content<'a>(feed: &'a [Confession], term: &str) -> Vec<&'a Confession> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return feed.iter().collect();
    }
    feed.iter()
        .filter(|confession| confession.content.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{filter_by_category, search_content};
    use crate::model::confession::Confession;

    fn confession(id: &str, category: &str, content: &str) -> Confession {
        Confession {
            id: id.to_string(),
            title: "t".to_string(),
            content: content.to_string(),
            category: category.to_string(),
            timestamp: String::new(),
            likes: 0,
            comments: Vec::new(),
            local_only: false,
        }
    }

    fn ids(view: Vec<&Confession>) -> Vec<&str> {
        view.into_iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn all_is_identity_in_any_case() {
        let feed = vec![confession("1", "work", ""), confession("2", "family", "")];
        assert_eq!(ids(filter_by_category(&feed, "all")), vec!["1", "2"]);
        assert_eq!(ids(filter_by_category(&feed, " ALL ")), vec!["1", "2"]);
    }

    #[test]
    fn category_filter_keeps_order_and_matches_tag() {
        let feed = vec![
            confession("1", "work", ""),
            confession("2", "family", ""),
            confession("3", "work", ""),
        ];
        assert_eq!(ids(filter_by_category(&feed, "Work")), vec!["1", "3"]);
        assert!(filter_by_category(&feed, "health").is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let feed = vec![
            confession("1", "work", "My Boss"),
            confession("2", "work", "lunch"),
        ];
        assert_eq!(ids(search_content(&feed, "boss")), vec!["1"]);
        assert_eq!(ids(search_content(&feed, "  ")), vec!["1", "2"]);
    }
}
