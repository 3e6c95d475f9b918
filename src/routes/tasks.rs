/// Task Routes
/// Transcript processing and Google Tasks creation
use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::{ClientInfo, SessionTokens, ValidatedJson};
use crate::models::{
    AddTaskRequest, ApiResponse, ConfirmTaskItem, ConfirmTasksRequest, ProcessTextRequest,
};
use crate::services::google_tasks::{create_tasks, prepare_task, NewTask, TasksApiError};
use crate::services::pdf;
use crate::utils::sanitize::strip_html;
use crate::utils::upload::{validate_content, validate_metadata, UploadRejection};
use crate::AppState;

const TRANSCRIPT_FIELD: &str = "transcript";

/// Register task routes
pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/add-task", post(add_task))
        .route(
            "/process-transcript",
            post(process_transcript).layer(DefaultBodyLimit::max(config.upload_body_limit_bytes)),
        )
        .route("/process-text", post(process_text))
        .route("/confirm-tasks", post(confirm_tasks))
}

fn with_refreshed(jar: CookieJar, cookie: Option<Cookie<'static>>) -> CookieJar {
    match cookie {
        Some(cookie) => jar.add(cookie),
        None => jar,
    }
}

fn tasks_error(e: TasksApiError) -> AppError {
    match e {
        TasksApiError::Unauthorized => {
            AppError::AuthExpired("Tasks API rejected the access token".to_string())
        }
        other => AppError::UpstreamFailure {
            message: "Failed to create task".to_string(),
            detail: other.to_string(),
        },
    }
}

async fn add_task(
    State(state): State<Arc<AppState>>,
    tokens: SessionTokens,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<AddTaskRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse>)> {
    let item = ConfirmTaskItem {
        task: request.task,
        deadline: None,
    };
    let task = prepare_task(&item).ok_or_else(|| AppError::validation("Task cannot be empty"))?;

    let (bundle, cookie) = tokens
        .ensure_fresh(state.oauth.as_ref(), &state.config)
        .await?;

    let created = state
        .tasks
        .insert_task(&bundle.access_token, &task)
        .await
        .map_err(tasks_error)?;

    info!("Task created: {}", created.id);
    Ok((
        with_refreshed(jar, cookie),
        Json(ApiResponse::message("Task added successfully")),
    ))
}

async fn process_text(
    State(state): State<Arc<AppState>>,
    _tokens: SessionTokens,
    ValidatedJson(request): ValidatedJson<ProcessTextRequest>,
) -> Json<ApiResponse> {
    Json(extract_action_items(&state, &strip_html(&request.text)).await)
}

async fn process_transcript(
    State(state): State<Arc<AppState>>,
    _tokens: SessionTokens,
    client: ClientInfo,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse>> {
    let data = match read_transcript_upload(multipart, state.config.max_upload_bytes).await {
        Ok(data) => data,
        Err(AppError::UploadRejected(rejection)) => {
            client.security_event(rejection.reason(), &rejection.to_string());
            return Err(rejection.into());
        }
        Err(e) => return Err(e),
    };

    debug!("Received transcript upload of {} bytes", data.len());
    let text = pdf::extract_text(data)
        .await
        .map_err(|e| AppError::ProcessingError(e.to_string()))?;

    Ok(Json(extract_action_items(&state, &text).await))
}

async fn extract_action_items(state: &AppState, text: &str) -> ApiResponse {
    let items = state.extractor.extract(text).await;
    let source = items.source();
    let tasks: Vec<_> = items.collect();

    let message = if tasks.is_empty() {
        "No action items found".to_string()
    } else {
        format!("Found {} action items", tasks.len())
    };

    ApiResponse {
        success: true,
        message,
        tasks: Some(tasks),
        source: Some(source.as_str()),
        created: None,
        reauth: None,
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body too large".to_string())
    } else {
        AppError::validation(e.body_text())
    }
}

/// Read the single `transcript` file, enforcing the size limit while streaming.
async fn read_transcript_upload(mut multipart: Multipart, max_bytes: usize) -> AppResult<Bytes> {
    let mut upload: Option<Bytes> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        // Plain form values are ignored; only file parts are considered
        if field.file_name().is_none() {
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        if name != TRANSCRIPT_FIELD {
            return Err(UploadRejection::UnexpectedField(name).into());
        }
        if upload.is_some() {
            return Err(UploadRejection::TooManyFiles.into());
        }

        validate_metadata(field.file_name(), field.content_type())?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if buffer.len() + chunk.len() > max_bytes {
                return Err(UploadRejection::too_large(max_bytes).into());
            }
            buffer.extend_from_slice(&chunk);
        }
        upload = Some(buffer.freeze());
    }

    let data = upload.ok_or(UploadRejection::MissingFile)?;
    validate_content(&data)?;
    Ok(data)
}

async fn confirm_tasks(
    State(state): State<Arc<AppState>>,
    tokens: SessionTokens,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<ConfirmTasksRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse>)> {
    let prepared: Vec<NewTask> = request.tasks.iter().filter_map(prepare_task).collect();
    if prepared.is_empty() {
        return Err(AppError::validation("No valid tasks to create"));
    }

    let (bundle, cookie) = tokens
        .ensure_fresh(state.oauth.as_ref(), &state.config)
        .await?;

    let outcome = create_tasks(state.tasks.as_ref(), &bundle.access_token, &prepared)
        .await
        .map_err(tasks_error)?;

    if outcome.created == 0 {
        return Err(AppError::UpstreamFailure {
            message: "Failed to create any tasks".to_string(),
            detail: format!("all {} insertions failed", outcome.attempted),
        });
    }

    let response = ApiResponse {
        success: true,
        message: format!(
            "Successfully created {} of {} tasks",
            outcome.created, outcome.attempted
        ),
        tasks: None,
        source: None,
        created: Some(outcome.created),
        reauth: outcome.reauth_required.then_some(true),
    };
    Ok((with_refreshed(jar, cookie), Json(response)))
}
