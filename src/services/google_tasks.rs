/// Google Tasks integration
/// Inserts tasks into the signed-in user's tasklist
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::ConfirmTaskItem;
use crate::utils::sanitize::strip_html;
use crate::utils::time::{parse_deadline, to_due_timestamp};

/// Body of a task insertion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

/// Task as returned by the remote service
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Error)]
pub enum TasksApiError {
    /// The access token was rejected
    #[error("Tasks API rejected the access token")]
    Unauthorized,
    #[error("Tasks API returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Tasks API request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TasksApi: Send + Sync {
    async fn insert_task(
        &self,
        access_token: &str,
        task: &NewTask,
    ) -> Result<CreatedTask, TasksApiError>;
}

pub struct GoogleTasksClient {
    client: Client,
    base_url: String,
    tasklist_id: String,
}

impl GoogleTasksClient {
    pub fn new(client: Client, base_url: impl Into<String>, tasklist_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            tasklist_id: tasklist_id.into(),
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(client, config.tasks_api_url.clone(), config.tasklist_id.clone())
    }

    fn insert_url(&self) -> String {
        format!(
            "{}/lists/{}/tasks",
            self.base_url.trim_end_matches('/'),
            self.tasklist_id
        )
    }
}

#[async_trait]
impl TasksApi for GoogleTasksClient {
    async fn insert_task(
        &self,
        access_token: &str,
        task: &NewTask,
    ) -> Result<CreatedTask, TasksApiError> {
        let response = self
            .client
            .post(self.insert_url())
            .bearer_auth(access_token)
            .json(task)
            .send()
            .await
            .map_err(|e| TasksApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TasksApiError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TasksApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TasksApiError::Transport(e.to_string()))
    }
}

/// Map a confirmed item to a task insertion, or `None` when it is blank.
pub fn prepare_task(item: &ConfirmTaskItem) -> Option<NewTask> {
    let title = strip_html(item.task.trim());
    if title.is_empty() {
        return None;
    }

    let due = item
        .deadline
        .as_deref()
        .and_then(parse_deadline)
        .map(to_due_timestamp);

    Some(NewTask { title, due })
}

/// Outcome of a confirmation batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub created: usize,
    pub failed: usize,
    /// The access token was rejected partway through the batch
    pub reauth_required: bool,
}

/// Insert tasks one at a time in input order.
///
/// Per-item failures are logged and skipped. A rejected access token stops
/// the batch: it is an error when nothing was created yet, otherwise the
/// outcome reports the tasks already created and flags re-authentication.
pub async fn create_tasks(
    api: &dyn TasksApi,
    access_token: &str,
    tasks: &[NewTask],
) -> Result<BatchOutcome, TasksApiError> {
    let mut outcome = BatchOutcome {
        attempted: tasks.len(),
        created: 0,
        failed: 0,
        reauth_required: false,
    };

    for (index, task) in tasks.iter().enumerate() {
        match api.insert_task(access_token, task).await {
            Ok(created) => {
                debug!("Created task {} ({})", created.id, created.title);
                outcome.created += 1;
            }
            Err(TasksApiError::Unauthorized) if outcome.created == 0 => {
                return Err(TasksApiError::Unauthorized)
            }
            Err(TasksApiError::Unauthorized) => {
                warn!(
                    "Access token rejected at task {} of {}, stopping batch",
                    index + 1,
                    tasks.len()
                );
                outcome.failed = tasks.len() - outcome.created;
                outcome.reauth_required = true;
                break;
            }
            Err(e) => {
                warn!("Failed to create task {} of {}: {}", index + 1, tasks.len(), e);
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Task batch finished: {} created, {} failed",
        outcome.created, outcome.failed
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the calls whose zero-based index is listed
    struct ScriptedTasks {
        fail_at: Vec<usize>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TasksApi for ScriptedTasks {
        async fn insert_task(
            &self,
            _access_token: &str,
            task: &NewTask,
        ) -> Result<CreatedTask, TasksApiError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push(task.title.clone());
            if self.fail_at.contains(&index) {
                Err(TasksApiError::Http {
                    status: 500,
                    message: "backend error".into(),
                })
            } else {
                Ok(CreatedTask {
                    id: format!("t{}", index),
                    title: task.title.clone(),
                })
            }
        }
    }

    fn tasks(n: usize) -> Vec<NewTask> {
        (0..n)
            .map(|i| NewTask {
                title: format!("Task {}", i),
                due: None,
            })
            .collect()
    }

    #[test]
    fn test_prepare_task_trims_and_skips_blank() {
        let blank = ConfirmTaskItem {
            task: "   ".into(),
            deadline: None,
        };
        assert_eq!(prepare_task(&blank), None);

        let item = ConfirmTaskItem {
            task: "  <b>Send</b> minutes ".into(),
            deadline: Some("2025-06-02".into()),
        };
        assert_eq!(
            prepare_task(&item),
            Some(NewTask {
                title: "Send minutes".into(),
                due: Some("2025-06-02T00:00:00.000Z".into()),
            })
        );
    }

    #[test]
    fn test_prepare_task_drops_unparseable_deadline() {
        let item = ConfirmTaskItem {
            task: "Plan offsite".into(),
            deadline: Some("sometime soon".into()),
        };
        assert_eq!(prepare_task(&item).unwrap().due, None);
    }

    #[test]
    fn test_new_task_serialization_omits_missing_due() {
        let json = serde_json::to_value(NewTask {
            title: "x".into(),
            due: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "title": "x" }));
    }

    #[tokio::test]
    async fn test_partial_failures_continue_in_order() {
        let api = ScriptedTasks {
            fail_at: vec![1, 3],
            calls: Mutex::new(Vec::new()),
        };
        let outcome = create_tasks(&api, "token", &tasks(5)).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                attempted: 5,
                created: 3,
                failed: 2,
                reauth_required: false,
            }
        );
        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["Task 0", "Task 1", "Task 2", "Task 3", "Task 4"]
        );
    }

    #[tokio::test]
    async fn test_unauthorized_stops_batch() {
        struct Rejecting;

        #[async_trait]
        impl TasksApi for Rejecting {
            async fn insert_task(
                &self,
                _access_token: &str,
                _task: &NewTask,
            ) -> Result<CreatedTask, TasksApiError> {
                Err(TasksApiError::Unauthorized)
            }
        }

        let result = create_tasks(&Rejecting, "token", &tasks(3)).await;
        assert!(matches!(result, Err(TasksApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_unauthorized_after_success_keeps_created_count() {
        /// Accepts the first insertion, then rejects the token
        struct ExpiresMidway {
            calls: Mutex<usize>,
        }

        #[async_trait]
        impl TasksApi for ExpiresMidway {
            async fn insert_task(
                &self,
                _access_token: &str,
                task: &NewTask,
            ) -> Result<CreatedTask, TasksApiError> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    Ok(CreatedTask {
                        id: "t0".into(),
                        title: task.title.clone(),
                    })
                } else {
                    Err(TasksApiError::Unauthorized)
                }
            }
        }

        let api = ExpiresMidway {
            calls: Mutex::new(0),
        };
        let outcome = create_tasks(&api, "token", &tasks(3)).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                attempted: 3,
                created: 1,
                failed: 2,
                reauth_required: true,
            }
        );
        assert_eq!(*api.calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_insert_url() {
        let client = GoogleTasksClient::new(
            Client::new(),
            "https://tasks.googleapis.com/tasks/v1/",
            "@default",
        );
        assert_eq!(
            client.insert_url(),
            "https://tasks.googleapis.com/tasks/v1/lists/@default/tasks"
        );
    }
}
