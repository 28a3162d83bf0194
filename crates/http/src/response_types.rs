//! Response types (Serialize)

use serde::Serialize;
use threadline_core::TaskStatus;

#[derive(Debug, Serialize)]
#[non_exhaustive]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[non_exhaustive]
pub struct VersionResponse {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionDeleteResponse {
    pub deleted: bool,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TaskUpdateResponse {
    pub user_id: String,
    pub current_task: Option<String>,
    pub task_status: Option<TaskStatus>,
}
