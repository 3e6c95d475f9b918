use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::sanitize::{reject_unsafe_text, reject_unsafe_transcript};

pub const UNASSIGNED: &str = "Unassigned";

/// Candidate action item produced by extraction, pending user review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub task: String,
    pub assignee: String,
    pub assignee_reason: String,
    pub deadline: Option<String>,
    pub deadline_text: Option<String>,
}

impl ActionItem {
    /// Item with no known owner or deadline.
    pub fn unassigned(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            assignee: UNASSIGNED.to_string(),
            assignee_reason: String::new(),
            deadline: None,
            deadline_text: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddTaskRequest {
    #[validate(
        length(min = 1, max = 8192, message = "Task must be between 1 and 8192 characters"),
        custom(function = "reject_unsafe_text")
    )]
    pub task: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessTextRequest {
    #[validate(
        length(min = 1, max = 50000, message = "Text must be between 1 and 50000 characters"),
        custom(function = "reject_unsafe_transcript")
    )]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConfirmTaskItem {
    #[validate(
        length(min = 1, max = 8192, message = "Task must be between 1 and 8192 characters"),
        custom(function = "reject_unsafe_text")
    )]
    pub task: String,
    #[serde(default)]
    #[validate(
        length(max = 100, message = "Deadline must be at most 100 characters"),
        custom(function = "reject_unsafe_text")
    )]
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmTasksRequest {
    #[validate(
        length(min = 1, max = 100, message = "Between 1 and 100 tasks may be confirmed at once"),
        nested
    )]
    pub tasks: Vec<ConfirmTaskItem>,
}

/// JSON envelope shared by the task endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<ActionItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reauth: Option<bool>,
}

impl ApiResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            tasks: None,
            source: None,
            created: None,
            reauth: None,
        }
    }
}
