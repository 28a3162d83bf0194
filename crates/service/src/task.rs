//! Coarse task status derived from a turn's tool invocations.

use serde_json::Value;
use threadline_core::{InvocationState, TaskStatus, ToolInvocation};

/// Human-readable task plus its status, shown to the user while a turn's
/// actions run and after they settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub task: String,
    pub status: TaskStatus,
}

/// Derive the current task from the invocations of one turn.
///
/// Only the last invocation counts: the newest action overwrites whatever
/// came before it, it is not an aggregate over the whole list. No
/// invocations means no task.
#[must_use]
pub fn derive_task(invocations: &[ToolInvocation]) -> Option<TaskInfo> {
    let last = invocations.last()?;
    let status = match last.state {
        InvocationState::Call => TaskStatus::InProgress,
        InvocationState::Result => status_from_result(last.result.as_ref()),
        // States this server never produces get the safe default.
        InvocationState::Unknown => TaskStatus::InProgress,
    };
    Some(TaskInfo { task: task_label(&last.tool_name), status })
}

fn task_label(tool_name: &str) -> String {
    match tool_name {
        "getAvailableConnections" => "Fetching available connections".to_owned(),
        "getAvailableActions" => "Retrieving supported actions".to_owned(),
        "getActionKnowledge" => "Loading action knowledge".to_owned(),
        "execute" => "Executing action".to_owned(),
        "connectGithub" => "Connecting to GitHub".to_owned(),
        other => format!("Running {other}"),
    }
}

/// A result fails the task when it carries a literal `success: false` or a
/// truthy `error` field. Anything else, including non-object and absent
/// results, completes it.
fn status_from_result(result: Option<&Value>) -> TaskStatus {
    let Some(Value::Object(map)) = result else {
        return TaskStatus::Completed;
    };
    if map.get("success") == Some(&Value::Bool(false)) || map.get("error").is_some_and(is_truthy) {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    }
}

/// Truthiness as browser clients evaluate it: null, false, zero, and the
/// empty string are falsy; everything else, including empty objects and
/// arrays, is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
