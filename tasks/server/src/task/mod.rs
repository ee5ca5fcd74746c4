use crate::entities::task::{self, TaskState};
use chrono::{DateTime, Utc};

pub mod api;
pub mod store;

pub use store::{SeaOrmTaskStore, TaskStore};

/// Default page size when a listing does not specify one.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    username: String,
    title: String,
    description: Option<String>,
    state: TaskState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: i32,
        username: String,
        title: String,
        description: Option<String>,
        state: TaskState,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            title,
            description,
            state,
            created_at,
            updated_at,
        }
    }

    /// Returns the ID of the task.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the username owning the task.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Task::new(
            model.id,
            model.username,
            model.title,
            model.description,
            model.state,
            model.created_at,
            model.updated_at,
        )
    }
}

/// A validated task that has not been stored yet.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct NewTask {
    pub username: String,
    pub title: String,
    pub description: Option<String>,
    pub state: TaskState,
}

/// Fields to change on an existing task. `None` leaves a field untouched.
///
/// `description` is doubly optional: `Some(None)` clears it, `None` keeps it.
/// There is deliberately no username here.
#[derive(Debug, PartialEq, Clone, Eq, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub state: Option<TaskState>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.state.is_none()
    }
}

/// Listing criteria. Pagination applies after the username filter.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TaskFilter {
    pub username: Option<String>,
    pub skip: u64,
    pub limit: u64,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            username: None,
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Error type for TaskRepository operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskRepositoryError {
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    NotFound(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Turns CRUD intents into store calls and absent rows into `NotFound`.
pub struct TaskRepository<S> {
    store: S,
}

impl<S: TaskStore> TaskRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a new task.
    ///
    /// # Returns
    ///
    /// The stored `Task`, with its id and timestamps assigned by the store.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task, TaskRepositoryError> {
        let task = self.store.insert(new_task).await?;
        tracing::info!("Created task {} for {}", task.id(), task.username());
        Ok(task)
    }

    /// Lists tasks matching the filter, forwarding it to the store unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, TaskRepositoryError> {
        Ok(self.store.list(filter).await?)
    }

    /// Retrieves a task by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, id: i32) -> Result<Task, TaskRepositoryError> {
        self.store
            .get(id)
            .await?
            .ok_or(TaskRepositoryError::NotFound(id))
    }

    /// Applies the given changes to a task.
    ///
    /// An empty change set still refreshes `updated_at`.
    ///
    /// # Returns
    ///
    /// The task as it is after the update, or `NotFound` if no task has this ID.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(
        &self,
        id: i32,
        changes: TaskChanges,
    ) -> Result<Task, TaskRepositoryError> {
        if changes.is_empty() {
            tracing::debug!("Update of task {} carries no changes", id);
        }
        let task = self
            .store
            .update(id, changes)
            .await?
            .ok_or(TaskRepositoryError::NotFound(id))?;
        tracing::info!("Updated task {}", id);
        Ok(task)
    }

    /// Deletes a task by its ID.
    ///
    /// # Returns
    ///
    /// The task as it was before deletion, or `NotFound` if no task has this ID.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, id: i32) -> Result<Task, TaskRepositoryError> {
        let task = self
            .store
            .delete(id)
            .await?
            .ok_or(TaskRepositoryError::NotFound(id))?;
        tracing::info!("Deleted task {}", id);
        Ok(task)
    }
}
