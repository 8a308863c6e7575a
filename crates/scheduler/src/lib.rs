//! Pageturn scheduler library
//!
//! Background work for open documents. A [`SearchTask`] walks every page of a
//! document on its own thread and streams [`SearchEvent`]s back to the caller;
//! it stops early once its [`CancellationToken`] is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use pageturn_engine::LoaderRegistry;
//! use pageturn_scheduler::{SearchEvent, SearchRequest, SearchTask};
//! use std::path::Path;
//!
//! let document = LoaderRegistry::default().open(Path::new("manual.pdf")).unwrap();
//! let task = SearchTask::spawn(document, SearchRequest::new("index")).unwrap();
//!
//! for event in task.wait() {
//!     if let SearchEvent::Matches { page, count } = event {
//!         println!("{count} hit(s) on page {page}");
//!     }
//! }
//! ```

mod cancel;
mod search;

pub use cancel::CancellationToken;
pub use search::{count_occurrences, SearchEvent, SearchRequest, SearchTask};
