use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use crate::entities::task;
use crate::task::{NewTask, Task, TaskChanges, TaskFilter};

/// Persistence operations for tasks.
///
/// Absence is reported as `Ok(None)`, never as an error. Errors are reserved
/// for storage failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a task, letting the store assign its id and timestamps.
    async fn insert(&self, new_task: NewTask) -> Result<Task, DbErr>;

    async fn get(&self, id: i32) -> Result<Option<Task>, DbErr>;

    /// Lists tasks in ascending id order, applying `skip` and `limit` after the
    /// username filter.
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>, DbErr>;

    /// Applies only the present fields and refreshes `updated_at`.
    async fn update(&self, id: i32, changes: TaskChanges) -> Result<Option<Task>, DbErr>;

    /// Removes a task and returns it as it was.
    async fn delete(&self, id: i32) -> Result<Option<Task>, DbErr>;
}

/// `TaskStore` backed by a SeaORM connection borrowed for one request.
pub struct SeaOrmTaskStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SeaOrmTaskStore<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }
}

// Bound parameters are signed 64-bit in both supported backends.
fn to_sql_bound(value: u64) -> u64 {
    value.min(i64::MAX as u64)
}

#[async_trait]
impl TaskStore for SeaOrmTaskStore<'_> {
    #[tracing::instrument(skip(self))]
    async fn insert(&self, new_task: NewTask) -> Result<Task, DbErr> {
        let active_model = task::ActiveModel {
            username: ActiveValue::Set(new_task.username),
            title: ActiveValue::Set(new_task.title),
            description: ActiveValue::Set(new_task.description),
            state: ActiveValue::Set(new_task.state),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Task::from(created_model))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: i32) -> Result<Option<Task>, DbErr> {
        let task_model = task::Entity::find_by_id(id).one(self.db).await?;
        Ok(task_model.map(Task::from))
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>, DbErr> {
        let mut query = task::Entity::find();
        if let Some(username) = filter.username {
            query = query.filter(task::Column::Username.eq(username));
        }

        let tasks = query
            .order_by_asc(task::Column::Id)
            .offset(to_sql_bound(filter.skip))
            .limit(to_sql_bound(filter.limit))
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    #[tracing::instrument(skip(self))]
    async fn update(&self, id: i32, changes: TaskChanges) -> Result<Option<Task>, DbErr> {
        let Some(task_to_update) = task::Entity::find_by_id(id).one(self.db).await? else {
            return Ok(None);
        };

        let mut active_model: task::ActiveModel = task_to_update.into();
        if let Some(title) = changes.title {
            active_model.title = ActiveValue::Set(title);
        }
        if let Some(description) = changes.description {
            active_model.description = ActiveValue::Set(description);
        }
        if let Some(state) = changes.state {
            active_model.state = ActiveValue::Set(state);
        }

        match active_model.update(self.db).await {
            Ok(updated_model) => Ok(Some(Task::from(updated_model))),
            // Deleted between the lookup and the write
            Err(DbErr::RecordNotUpdated) => {
                tracing::warn!("Task {} disappeared before it could be updated", id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: i32) -> Result<Option<Task>, DbErr> {
        let Some(task_to_delete) = task::Entity::find_by_id(id).one(self.db).await? else {
            return Ok(None);
        };

        let result = task::Entity::delete_by_id(id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Some(Task::from(task_to_delete)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_clamp_page_bounds_to_signed_range() {
        assert_eq!(to_sql_bound(100), 100);
        assert_eq!(to_sql_bound(u64::MAX), i64::MAX as u64);
    }
}
