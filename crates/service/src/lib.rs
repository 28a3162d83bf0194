//! Session reconciliation layer for threadline
//!
//! Sits between the HTTP handlers and the storage/model crates. Each chat
//! turn loads the user's persisted session, merges it with the history the
//! client sent, runs the model turn, and persists the result without ever
//! letting a storage failure disturb the response stream.

#![allow(missing_docs, reason = "Internal crate with self-explanatory API")]
#![allow(clippy::missing_errors_doc, reason = "Errors are self-explanatory from Result types")]
#![allow(missing_debug_implementations, reason = "Internal types")]
#![allow(clippy::missing_docs_in_private_items, reason = "Internal crate")]
#![allow(clippy::implicit_return, reason = "Implicit return is idiomatic Rust")]
#![allow(clippy::question_mark_used, reason = "? operator is idiomatic Rust")]
#![allow(clippy::cognitive_complexity, reason = "Complex async flows are inherent")]
#![allow(clippy::min_ident_chars, reason = "Short error vars are idiomatic")]

mod error;
mod merge;
mod reconciler;
mod task;

pub use error::ServiceError;
pub use merge::merge_history;
pub use reconciler::{ReconcilerConfig, SessionReconciler};
pub use task::{TaskInfo, derive_task};
