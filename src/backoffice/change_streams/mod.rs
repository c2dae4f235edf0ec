//! Change streams
//!
//! Per-topic broadcast channels that stand in for the record store's snapshot
//! listeners. Writers emit a [`ChangeNotice`] after every committed change;
//! listeners re-read whatever snapshot they render.

mod manager;
mod types;

pub use manager::ChangeStreamManager;
pub use types::{ChangeKind, ChangeNotice, Topic};
