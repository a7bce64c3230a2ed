//! Signview Scheduler Library
//!
//! Cooperative cancellation primitives for the viewer's asynchronous work.
//!
//! Every suspension point in the viewer (document load, page load, page
//! render) runs as a [`TaskHandle`] carrying a [`CancellationToken`]. A task
//! never gets interrupted; instead its completion handler checks the token
//! (its liveness flag) before mutating any shared state. Superseded loads are
//! additionally detected with a [`Generation`] stamp.
//!
//! # Example
//!
//! ```
//! use signview_scheduler::WorkingSet;
//!
//! // Page 1 of a 3-page document keeps pages 1 and 2 warm
//! let set = WorkingSet::around(1, 3);
//! assert_eq!(set.pages().collect::<Vec<_>>(), vec![1, 2]);
//! ```

mod cancel;
mod generation;
mod task;
mod working_set;

// Re-export public API
pub use cancel::CancellationToken;
pub use generation::{Generation, GenerationCounter};
pub use task::TaskHandle;
pub use working_set::WorkingSet;
