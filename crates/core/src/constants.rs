//! Shared constants for threadline.
//!
//! Centralizes values that would otherwise be duplicated across crates.

/// Upper bound on model round-trips within a single chat turn. Tool calls
/// requested by the model on the final step are reported but not executed.
pub const MAX_TURN_STEPS: usize = 20;

/// PostgreSQL connection pool: maximum connections.
pub const PG_POOL_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL connection pool: acquire timeout in seconds.
pub const PG_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL connection pool: idle timeout in seconds.
pub const PG_POOL_IDLE_TIMEOUT_SECS: u64 = 300;
