//! History page and pagination state types.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// One page of message history as served by the session repository.
///
/// Items arrive newest-first. A page is transient: it is merged into the
/// timeline and then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub items: Vec<ChatMessage>,
    pub page_number: u32,
    pub page_size: u32,
    /// Total number of messages in the session, when the server reports it.
    #[serde(default)]
    pub total: Option<u64>,
}

/// Whether more pages follow page `page_number` of `page_size` items.
///
/// With a known total: `page_size * page_number < total`. Without one,
/// a full page is taken to mean more may follow.
pub fn has_more(page_number: u32, page_size: u32, total: Option<u64>, item_count: usize) -> bool {
    match total {
        Some(total) => u64::from(page_size) * u64::from(page_number) < total,
        None => page_size > 0 && item_count >= page_size as usize,
    }
}

/// State of the "load older messages" affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMoreState {
    /// More pages exist; a load may be requested.
    PullToLoad,
    /// A page request is in flight.
    Loading,
    /// The first page loaded and more pages exist.
    Success,
    /// The last request failed; a load may be retried.
    Error,
    /// All pages have been loaded.
    NoMore,
}

impl LoadMoreState {
    /// Whether a new page request may be issued from this state.
    pub fn accepts_load(&self) -> bool {
        !matches!(self, LoadMoreState::Loading | LoadMoreState::NoMore)
    }
}

impl Default for LoadMoreState {
    fn default() -> Self {
        LoadMoreState::PullToLoad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more_with_total() {
        // 10 * 3 = 30 >= 25
        assert!(!has_more(3, 10, Some(25), 5));
        // 10 * 2 = 20 < 25
        assert!(has_more(2, 10, Some(25), 10));
        assert!(!has_more(1, 10, Some(10), 10));
    }

    #[test]
    fn test_has_more_without_total_uses_item_count() {
        assert!(has_more(1, 10, None, 10));
        assert!(!has_more(1, 10, None, 9));
        assert!(!has_more(4, 10, None, 0));
        assert!(!has_more(1, 0, None, 0));
    }

    #[test]
    fn test_accepts_load() {
        assert!(LoadMoreState::PullToLoad.accepts_load());
        assert!(LoadMoreState::Success.accepts_load());
        assert!(LoadMoreState::Error.accepts_load());
        assert!(!LoadMoreState::Loading.accepts_load());
        assert!(!LoadMoreState::NoMore.accepts_load());
    }

    #[test]
    fn test_page_json_total_optional() {
        let json = r#"{"items":[],"pageNumber":2,"pageSize":20}"#;
        let page: Page = serde_json::from_str(json).unwrap();
        assert_eq!(page.page_number, 2);
        assert_eq!(page.total, None);
    }
}
