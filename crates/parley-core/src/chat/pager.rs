//! HistoryPager -- pagination state machine over the session repository.
//!
//! ```text
//! PullToLoad/Success/Error --begin_load_more--> Loading
//! Loading --ok, more pages--> PullToLoad   (Success after the first page)
//! Loading --ok, last page---> NoMore
//! Loading --failure---------> Error        (current_page rolled back)
//! ```
//!
//! The pager never performs IO while mutating: `begin_*` hands out a
//! [`PageRequest`], the caller fetches it however it likes, and
//! [`HistoryPager::finish`] applies the outcome. Requests carry an epoch so
//! a refresh supersedes any page load still in flight.

use parley_types::error::RepositoryError;
use parley_types::page::{self, LoadMoreState, Page};

use super::repository::SessionRepository;

/// How a fetched page must be merged into the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// First page: replaces the timeline.
    Replace,
    /// Older page: appended at the tail.
    Append,
}

/// A page fetch the caller must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub mode: MergeMode,
    epoch: u64,
}

/// Outcome of [`HistoryPager::finish`].
#[derive(Debug)]
pub enum PageApply {
    Merge { page: Page, mode: MergeMode },
    Failed(RepositoryError),
    /// Superseded by a newer request; nothing to apply.
    Stale,
}

#[derive(Debug, Clone)]
pub struct HistoryPager {
    /// Last page requested (and, outside `Loading`, last page loaded).
    current_page: u32,
    page_size: u32,
    has_more: bool,
    state: LoadMoreState,
    epoch: u64,
}

impl HistoryPager {
    pub fn new(page_size: u32) -> Self {
        Self {
            current_page: 0,
            page_size: page_size.max(1),
            has_more: true,
            state: LoadMoreState::PullToLoad,
            epoch: 0,
        }
    }

    pub fn state(&self) -> LoadMoreState {
        self.state
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Back to before the first page. Any request in flight becomes stale.
    pub fn reset(&mut self) {
        self.current_page = 0;
        self.has_more = true;
        self.state = LoadMoreState::PullToLoad;
        self.epoch += 1;
    }

    /// Start (re)loading page 1. Always accepted; supersedes in-flight loads.
    pub fn begin_first_page(&mut self) -> PageRequest {
        self.reset();
        self.issue()
    }

    /// Start loading the next page, or `None` while `Loading` / `NoMore`.
    ///
    /// When nothing has loaded yet (or the first page failed) this requests
    /// page 1 in [`MergeMode::Replace`].
    pub fn begin_load_more(&mut self) -> Option<PageRequest> {
        if !self.state.accepts_load() {
            tracing::debug!(state = ?self.state, "load more refused");
            return None;
        }
        Some(self.issue())
    }

    fn issue(&mut self) -> PageRequest {
        self.current_page += 1;
        self.state = LoadMoreState::Loading;
        self.epoch += 1;
        PageRequest {
            page: self.current_page,
            size: self.page_size,
            mode: if self.current_page == 1 {
                MergeMode::Replace
            } else {
                MergeMode::Append
            },
            epoch: self.epoch,
        }
    }

    /// Apply the outcome of `request`.
    pub fn finish(&mut self, request: PageRequest, result: Result<Page, RepositoryError>) -> PageApply {
        if request.epoch != self.epoch || self.state != LoadMoreState::Loading {
            tracing::debug!(page = request.page, "discarding stale page result");
            return PageApply::Stale;
        }

        match result {
            Ok(page) => {
                self.has_more =
                    page::has_more(request.page, request.size, page.total, page.items.len());
                self.state = match (self.has_more, request.mode) {
                    (false, _) => LoadMoreState::NoMore,
                    (true, MergeMode::Replace) => LoadMoreState::Success,
                    (true, MergeMode::Append) => LoadMoreState::PullToLoad,
                };
                tracing::debug!(
                    page = request.page,
                    items = page.items.len(),
                    has_more = self.has_more,
                    "history page loaded"
                );
                PageApply::Merge {
                    page,
                    mode: request.mode,
                }
            }
            Err(err) => {
                tracing::warn!(page = request.page, "history page failed: {err}");
                self.current_page = request.page - 1;
                self.state = LoadMoreState::Error;
                PageApply::Failed(err)
            }
        }
    }

    /// Fetch one page from the repository.
    pub async fn load_page<R: SessionRepository>(
        &self,
        repository: &R,
        session_id: i64,
        page: u32,
    ) -> Result<Page, RepositoryError> {
        repository
            .get_message_page(session_id, page, self.page_size)
            .await
    }

    /// `begin_load_more` + fetch + `finish` in one call, for callers that
    /// own the pager exclusively.
    pub async fn load_more<R: SessionRepository>(
        &mut self,
        repository: &R,
        session_id: i64,
    ) -> Option<PageApply> {
        let request = self.begin_load_more()?;
        let result = self.load_page(repository, session_id, request.page).await;
        Some(self.finish(request, result))
    }
}
