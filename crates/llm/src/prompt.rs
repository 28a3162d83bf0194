//! Default system prompt assembly.

use std::fmt::Write;

use crate::tools::ToolRegistry;

/// Build the default system prompt, listing whatever tools are registered.
///
/// Deployments that want full control set their own prompt instead; this
/// one covers the common case of the stock hub tool set.
#[must_use]
pub fn default_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant that can take actions on the user's \
         connected platforms. Be concise. Confirm what you did after an \
         action completes, and report failures plainly instead of retrying \
         silently.",
    );
    if registry.is_empty() {
        prompt.push_str("\n\nNo tools are available; answer from knowledge alone.");
        return prompt;
    }
    prompt.push_str("\n\nAvailable tools:\n");
    for definition in registry.definitions() {
        // Infallible for String, ignore the Result.
        let _ = writeln!(prompt, "- {}: {}", definition.name, definition.description);
    }
    prompt.push_str(
        "\nBefore executing an action, fetch its knowledge to learn the \
         required parameters. If the user's platform is not connected, \
         offer a connection link rather than guessing.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hub::{HubClient, stock_registry};

    #[test]
    fn prompt_lists_registered_tools() {
        let hub = Arc::new(HubClient::new("http://localhost:9", "s").unwrap());
        let prompt = default_system_prompt(&stock_registry(hub));
        assert!(prompt.contains("- execute:"));
        assert!(prompt.contains("- getAvailableConnections:"));
        assert!(!prompt.contains("No tools are available"));
    }

    #[test]
    fn prompt_without_tools_says_so() {
        let prompt = default_system_prompt(&ToolRegistry::new());
        assert!(prompt.contains("No tools are available"));
    }
}
