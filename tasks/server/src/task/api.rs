use crate::entities::task::TaskState;
use crate::task::{
    DEFAULT_PAGE_LIMIT, NewTask, SeaOrmTaskStore, Task, TaskChanges, TaskFilter, TaskRepository,
    TaskRepositoryError,
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Shared state for the task API routes.
#[derive(Clone, Debug)]
pub struct TaskApiState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    /// Upper bound applied to the `limit` query parameter. `None` leaves it unbounded.
    pub max_page_limit: Option<u64>,
}

/// JSON representation of a Task for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskJson {
    /// Unique identifier for the task
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub state: TaskState,
    /// Username owning the task
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id(),
            title: task.title().to_string(),
            description: task.description().map(str::to_string),
            state: task.state(),
            username: task.username().to_string(),
            created_at: task.created_at(),
            updated_at: task.updated_at(),
        }
    }
}

/// Request body for creating a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    /// Defaults to `todo`
    #[serde(default)]
    state: Option<TaskState>,
    username: String,
}

impl CreateTaskRequest {
    fn into_new_task(self) -> Result<NewTask, TaskApiError> {
        require_non_blank("title", &self.title)?;
        require_non_blank("username", &self.username)?;
        Ok(NewTask {
            username: self.username,
            title: self.title,
            description: self.description,
            state: self.state.unwrap_or_default(),
        })
    }
}

/// Request body for updating a task. Omitted fields are left untouched.
///
/// Unknown keys, `username` included, are ignored.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    title: Option<String>,
    /// `null` clears the description
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    description: Option<Option<String>>,
    #[serde(default)]
    state: Option<TaskState>,
}

impl UpdateTaskRequest {
    fn into_changes(self) -> Result<TaskChanges, TaskApiError> {
        if let Some(title) = &self.title {
            require_non_blank("title", title)?;
        }
        Ok(TaskChanges {
            title: self.title,
            description: self.description,
            state: self.state,
        })
    }
}

/// Keeps an explicit `null` apart from an absent field.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn require_non_blank(field: &str, value: &str) -> Result<(), TaskApiError> {
    if value.trim().is_empty() {
        return Err(TaskApiError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// Parses the `{id}` path segment. Integers outside the id column's range
/// cannot name a stored task, so they are reported as not found.
fn task_id(id: Result<Path<i64>, PathRejection>) -> Result<i32, TaskApiError> {
    let Path(id) = id?;
    i32::try_from(id).map_err(|_| TaskApiError::NotFound(id))
}

/// Query parameters for listing tasks.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    skip: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

impl ListTasksQuery {
    fn into_filter(self, max_page_limit: Option<u64>) -> TaskFilter {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        TaskFilter {
            // An empty username means no filter
            username: self.username.filter(|username| !username.is_empty()),
            skip: self.skip.unwrap_or(0),
            limit: max_page_limit.map_or(limit, |max| limit.min(max)),
        }
    }
}

/// JSON response for API errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error type for task API handlers.
#[derive(Debug, thiserror::Error)]
pub enum TaskApiError {
    /// The request was malformed or failed validation.
    #[error("{0}")]
    Validation(String),
    /// No task has the requested ID.
    #[error("Task {0} not found")]
    NotFound(i64),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl From<TaskRepositoryError> for TaskApiError {
    fn from(err: TaskRepositoryError) -> Self {
        match err {
            TaskRepositoryError::NotFound(id) => TaskApiError::NotFound(id.into()),
            TaskRepositoryError::Database(db_err) => TaskApiError::Database(db_err),
        }
    }
}

impl From<JsonRejection> for TaskApiError {
    fn from(rejection: JsonRejection) -> Self {
        TaskApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for TaskApiError {
    fn from(rejection: PathRejection) -> Self {
        TaskApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for TaskApiError {
    fn from(rejection: QueryRejection) -> Self {
        TaskApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for TaskApiError {
    fn into_response(self) -> Response {
        let (status_code, error, message) = match &self {
            TaskApiError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                self.to_string(),
            ),
            TaskApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            TaskApiError::Database(err) => {
                tracing::error!("Task request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred while processing your request. Please try again later."
                        .to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: error.to_string(),
            message,
        };
        (status_code, Json(error_response)).into_response()
    }
}

/// Handler for GET /api/tasks/ - Lists tasks, optionally filtered by username.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/",
    params(
        ("username" = Option<String>, Query, description = "Only return tasks owned by this username"),
        ("skip" = Option<u64>, Query, description = "Number of tasks to skip, default 0"),
        ("limit" = Option<u64>, Query, description = "Maximum number of tasks to return, default 100")
    ),
    responses(
        (status = 200, description = "Successfully retrieved tasks", body = Vec<TaskJson>),
        (status = 422, description = "Malformed query string", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<TaskApiState>>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskJson>>, TaskApiError> {
    let Query(query) = query?;
    let filter = query.into_filter(state.max_page_limit);

    let repository = TaskRepository::new(SeaOrmTaskStore::new(&state.db));
    let tasks = repository.list_tasks(filter).await?;
    Ok(Json(tasks.into_iter().map(TaskJson::from).collect()))
}

/// Handler for POST /api/tasks/ - Creates a task.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/tasks/",
    request_body = CreateTaskRequest,
    responses(
        (status = 200, description = "Task created", body = TaskJson),
        (status = 422, description = "Invalid task payload", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskApiState>>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let Json(request) = payload?;
    let new_task = request.into_new_task()?;

    let repository = TaskRepository::new(SeaOrmTaskStore::new(&state.db));
    let task = repository.create_task(new_task).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for GET /api/tasks/{id} - Returns a single task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = TaskJson),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 422, description = "Malformed task ID", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<TaskApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let id = task_id(id)?;

    let repository = TaskRepository::new(SeaOrmTaskStore::new(&state.db));
    let task = repository.get_task(id).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT /api/tasks/{id} - Updates the given fields of a task.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskJson),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 422, description = "Invalid update payload", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<TaskApiState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let id = task_id(id)?;
    let Json(request) = payload?;
    let changes = request.into_changes()?;

    let repository = TaskRepository::new(SeaOrmTaskStore::new(&state.db));
    let task = repository.update_task(id, changes).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/tasks/{id} - Deletes a task and returns it as it was.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted", body = TaskJson),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 422, description = "Malformed task ID", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskApiState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let id = task_id(id)?;

    let repository = TaskRepository::new(SeaOrmTaskStore::new(&state.db));
    let task = repository.delete_task(id).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Creates and returns the tasks API router.
///
/// The collection is served both with and without the trailing slash.
pub fn create_api_router(state: Arc<TaskApiState>) -> Router {
    Router::new()
        .route(
            "/api/tasks/",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route(
            "/api/tasks",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route(
            "/api/tasks/{id}",
            get(get_task_handler)
                .put(update_task_handler)
                .delete(delete_task_handler),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn error_body(error: TaskApiError) -> (StatusCode, ErrorResponse) {
        let response = error.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn can_default_state_to_todo_on_create() {
        let request: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "T1", "username": "u"}"#).unwrap();
        let new_task = request.into_new_task().unwrap();

        assert_eq!(new_task.state, TaskState::Todo);
        assert_eq!(new_task.description, None);
    }

    #[test]
    fn can_reject_create_without_title() {
        let result: Result<CreateTaskRequest, _> = serde_json::from_str(r#"{"username": "u"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn can_reject_blank_title_or_username() {
        let blank_title: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "  ", "username": "u"}"#).unwrap();
        assert!(matches!(
            blank_title.into_new_task(),
            Err(TaskApiError::Validation(message)) if message == "title must not be empty"
        ));

        let blank_username: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "T1", "username": ""}"#).unwrap();
        assert!(matches!(
            blank_username.into_new_task(),
            Err(TaskApiError::Validation(message)) if message == "username must not be empty"
        ));
    }

    #[test]
    fn can_reject_unknown_state_on_create() {
        let result: Result<CreateTaskRequest, _> =
            serde_json::from_str(r#"{"title": "T1", "username": "u", "state": "bogus"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn can_distinguish_absent_and_null_description_on_update() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{"title": "New"}"#).unwrap();
        assert_eq!(absent.into_changes().unwrap().description, None);

        let null: UpdateTaskRequest = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(null.into_changes().unwrap().description, Some(None));

        let value: UpdateTaskRequest =
            serde_json::from_str(r#"{"description": "details"}"#).unwrap();
        assert_eq!(
            value.into_changes().unwrap().description,
            Some(Some("details".to_string()))
        );
    }

    #[test]
    fn can_ignore_username_on_update() {
        let request: UpdateTaskRequest =
            serde_json::from_str(r#"{"username": "someone-else"}"#).unwrap();
        assert!(request.into_changes().unwrap().is_empty());
    }

    #[test]
    fn can_reject_blank_title_on_update() {
        let request: UpdateTaskRequest = serde_json::from_str(r#"{"title": ""}"#).unwrap();
        assert!(matches!(
            request.into_changes(),
            Err(TaskApiError::Validation(_))
        ));
    }

    #[test]
    fn can_build_filter_with_defaults() {
        let filter = ListTasksQuery::default().into_filter(None);
        assert_eq!(filter, TaskFilter::default());
    }

    #[test]
    fn can_treat_empty_username_as_no_filter() {
        let query = ListTasksQuery {
            username: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(query.into_filter(None).username, None);
    }

    #[test]
    fn can_clamp_limit_to_configured_maximum() {
        let query = ListTasksQuery {
            limit: Some(5_000),
            ..Default::default()
        };
        assert_eq!(query.into_filter(Some(500)).limit, 500);

        let unbounded = ListTasksQuery {
            limit: Some(5_000),
            ..Default::default()
        };
        assert_eq!(unbounded.into_filter(None).limit, 5_000);
    }

    #[tokio::test]
    async fn can_respond_with_not_found() {
        let (status, body) = error_body(TaskApiError::NotFound(42)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        insta::assert_yaml_snapshot!(body, @r"
        error: NOT_FOUND
        message: Task 42 not found
        ");
    }

    #[tokio::test]
    async fn can_respond_with_validation_error() {
        let (status, body) =
            error_body(TaskApiError::Validation("title must not be empty".to_string())).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        insta::assert_yaml_snapshot!(body, @r"
        error: VALIDATION_ERROR
        message: title must not be empty
        ");
    }

    #[tokio::test]
    async fn can_hide_database_details_behind_internal_error() {
        let db_error = sea_orm::DbErr::Custom("password authentication failed".to_string());
        let (status, body) = error_body(TaskApiError::Database(db_error)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "INTERNAL_ERROR");
        assert!(!body.message.contains("password"));
    }

    #[test]
    fn can_map_repository_not_found() {
        let api_error = TaskApiError::from(TaskRepositoryError::NotFound(7));
        assert!(matches!(api_error, TaskApiError::NotFound(7)));
    }

    #[test]
    fn can_report_out_of_range_task_id_as_not_found() {
        assert!(matches!(task_id(Ok(Path(12))), Ok(12)));
        assert!(matches!(
            task_id(Ok(Path(2_147_483_648))),
            Err(TaskApiError::NotFound(2_147_483_648))
        ));
        assert!(matches!(
            task_id(Ok(Path(i64::MIN))),
            Err(TaskApiError::NotFound(i64::MIN))
        ));
    }
}
