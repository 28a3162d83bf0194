//! History merge between server-persisted and client-supplied messages.

use std::collections::HashSet;

use threadline_core::Message;

/// Merge client history into server history, deduplicating by message id.
///
/// The server copy is the authoritative prefix: its messages keep their
/// order and content, and for ids present on both sides the server version
/// wins. Client messages with ids the server has not seen are appended in
/// the client's order. With no server session the client history is taken
/// as-is.
///
/// This is an at-least-once-safe concat, not a general merge: there is no
/// content-level conflict resolution.
#[must_use]
pub fn merge_history(server: Option<&[Message]>, client: &[Message]) -> Vec<Message> {
    let Some(server) = server else {
        return client.to_vec();
    };
    let mut seen: HashSet<&str> = server.iter().map(|m| m.id.as_str()).collect();
    let mut merged = server.to_vec();
    for message in client {
        if seen.insert(&message.id) {
            merged.push(message.clone());
        }
    }
    merged
}
