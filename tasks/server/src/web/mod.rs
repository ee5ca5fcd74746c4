use axum::Router;
use axum::routing::get;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::entities::task::TaskState;
use crate::task::api::{
    CreateTaskRequest, ErrorResponse, TaskApiState, TaskJson, UpdateTaskRequest,
    create_api_router,
};

/// OpenAPI document for the JSON API, served at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(title = "Tasks API"),
    paths(
        crate::task::api::list_tasks_handler,
        crate::task::api::create_task_handler,
        crate::task::api::get_task_handler,
        crate::task::api::update_task_handler,
        crate::task::api::delete_task_handler,
    ),
    components(schemas(
        TaskJson,
        TaskState,
        CreateTaskRequest,
        UpdateTaskRequest,
        ErrorResponse
    )),
    tags((name = "Tasks", description = "Task management endpoints"))
)]
pub struct ApiDoc;

/// Builds the full application router over an existing database connection.
pub fn create_app(db: Arc<DatabaseConnection>, config: &Config) -> Router {
    let task_state = Arc::new(TaskApiState {
        db,
        max_page_limit: config.max_page_limit,
    });

    Router::new()
        .route("/health", get(health_check_handler))
        .merge(create_api_router(task_state))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    if config.max_page_limit.is_none() {
        tracing::warn!("MAX_PAGE_LIMIT is not set, task listings are unbounded");
    }

    let app = create_app(Arc::new(db), &config);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_document_every_task_route() {
        let openapi = ApiDoc::openapi();

        assert!(openapi.paths.paths.contains_key("/api/tasks/"));
        assert!(openapi.paths.paths.contains_key("/api/tasks/{id}"));
    }

    #[tokio::test]
    async fn can_report_health() {
        assert_eq!(health_check_handler().await, "OK");
    }
}
