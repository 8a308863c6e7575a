//! Background text search over every page of a document.

use crate::CancellationToken;
use pageturn_engine::SharedDocument;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub text: String,
    pub match_case: bool,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), match_case: false }
    }

    pub fn match_case(mut self, match_case: bool) -> Self {
        self.match_case = match_case;
        self
    }
}

/// Progress reported by a [`SearchTask`], in the order it happens.
///
/// A task ends with exactly one of `Finished`, `Canceled` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// `count` occurrences on the 1-based `page`. Pages without hits are not
    /// reported.
    Matches { page: u32, count: usize },
    /// Percentage of pages searched so far.
    Progress(u8),
    Finished,
    Canceled,
    Failed(String),
}

impl SearchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Canceled | Self::Failed(_))
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`. An empty needle
/// matches nothing.
pub fn count_occurrences(haystack: &str, needle: &str, match_case: bool) -> usize {
    if needle.is_empty() {
        return 0;
    }

    if match_case {
        haystack.matches(needle).count()
    } else {
        haystack.to_lowercase().matches(&needle.to_lowercase()).count()
    }
}

/// A search running on its own thread.
///
/// Dropping the task cancels it and waits for the thread to stop.
#[derive(Debug)]
pub struct SearchTask {
    token: CancellationToken,
    events: Receiver<SearchEvent>,
    handle: Option<JoinHandle<()>>,
}

impl SearchTask {
    pub fn spawn(document: SharedDocument, request: SearchRequest) -> io::Result<Self> {
        let token = CancellationToken::new();
        let (sender, events) = mpsc::channel();

        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("pageturn-search".to_owned())
            .spawn(move || run_search(&document, &request, &worker_token, &sender))?;

        Ok(Self { token, events, handle: Some(handle) })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the worker thread has exited. Undelivered events may remain.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Events produced since the last call, without blocking.
    pub fn try_events(&self) -> Vec<SearchEvent> {
        self.events.try_iter().collect()
    }

    /// Blocks until the search ends and returns every undelivered event.
    pub fn wait(mut self) -> Vec<SearchEvent> {
        self.join();
        self.events.try_iter().collect()
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("search thread panicked");
            }
        }
    }
}

impl Drop for SearchTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.join();
    }
}

fn run_search(
    document: &SharedDocument,
    request: &SearchRequest,
    token: &CancellationToken,
    events: &Sender<SearchEvent>,
) {
    let page_count = match document.page_count() {
        Ok(count) => count,
        Err(err) => {
            let _ = events.send(SearchEvent::Failed(err.to_string()));
            return;
        }
    };

    tracing::debug!(document = document.id(), page_count, "search started");

    for index in 0..page_count {
        if token.is_cancelled() {
            tracing::debug!(document = document.id(), page = index + 1, "search canceled");
            let _ = events.send(SearchEvent::Canceled);
            return;
        }

        match document.page_text(index) {
            Ok(text) => {
                let count = count_occurrences(&text, &request.text, request.match_case);
                let matches = SearchEvent::Matches { page: index + 1, count };
                if count > 0 && events.send(matches).is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(
                    document = document.id(),
                    page = index + 1,
                    error = %err,
                    "could not read page text"
                );
            }
        }

        let progress = ((u64::from(index) + 1) * 100 / u64::from(page_count)) as u8;
        tracing::debug!(document = document.id(), page = index + 1, progress, "search progress");
        if events.send(SearchEvent::Progress(progress)).is_err() {
            return;
        }
    }

    let _ = events.send(SearchEvent::Finished);
}
