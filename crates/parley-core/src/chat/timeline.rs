//! MessageTimeline -- the ordered message list of one chat session.
//!
//! Invariants, holding after every mutation:
//! - entries are newest-first,
//! - no two entries share an `id`.
//!
//! Live messages go on the front; older history pages go on the back in
//! the order received. Both paths skip ids that are already present, which
//! makes redelivery from the gateway and page overlap harmless.

use std::collections::HashSet;

use parley_types::message::{ChatMessage, ReadStatus};
use parley_types::page::Page;

#[derive(Debug, Clone, Default)]
pub struct MessageTimeline {
    messages: Vec<ChatMessage>,
    ids: HashSet<i64>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the first page (initial load or refresh).
    pub fn replace_with_first_page(&mut self, page: Page) {
        self.messages.clear();
        self.ids.clear();
        self.extend_back(page.items);
    }

    /// Append an older page, skipping ids already present.
    ///
    /// Returns the number of messages added.
    pub fn append_older_page(&mut self, page: Page) -> usize {
        self.extend_back(page.items)
    }

    /// Insert a live message at the front unless its id is already present.
    ///
    /// Returns whether the message was inserted.
    pub fn prepend_live(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.insert(0, message);
        true
    }

    /// Set `status = Read` on every entry whose id is in `ids`.
    ///
    /// Returns the number of entries that changed.
    pub fn mark_read(&mut self, ids: &HashSet<i64>) -> usize {
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            if message.status != ReadStatus::Read {
                message.status = ReadStatus::Read;
                changed += 1;
            }
        }
        changed
    }

    /// Ids of unread entries, newest-first.
    pub fn unread_ids(&self) -> Vec<i64> {
        self.messages
            .iter()
            .filter(|m| m.is_unread())
            .map(|m| m.id)
            .collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn extend_back(&mut self, items: Vec<ChatMessage>) -> usize {
        let before = self.messages.len();
        for item in items {
            if self.ids.insert(item.id) {
                self.messages.push(item);
            }
        }
        self.messages.len() - before
    }
}
