//! Core types for threadline
//!
//! This crate contains the conversation data model shared across all
//! other crates, plus environment parsing helpers and shared constants.

mod constants;
mod env_config;
mod message;
mod session;

pub use constants::*;
pub use env_config::*;
pub use message::*;
pub use session::*;
