//! JSON-over-HTTP surface for the list/task API.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::TodoApi;
use crate::error::ApiError;
use crate::models::{CreatedList, DeletedCount, Task, TaskPatch, TodoList};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub api: Arc<dyn TodoApi>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}

pub fn router(api: Arc<dyn TodoApi>) -> Router {
    let state = Arc::new(AppState { api });
    Router::new()
        .route("/api/todolists", post(create_todolist))
        .route(
            "/api/todolists/{list_id}",
            get(get_tasks).delete(delete_todolist),
        )
        .route(
            "/api/todolists/{list_id}/tasks",
            post(create_task).delete(delete_all_tasks),
        )
        .route("/api/tasks/{task_id}", patch(edit_task).delete(delete_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until ctrl-c.
pub async fn serve(addr: SocketAddr, api: Arc<dyn TodoApi>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("todolist server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(api))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await
}

async fn create_todolist(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreatedList>), ApiError> {
    let created = state.api.create_todolist().await?;
    info!(list_id = %created.id, "created todo list");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_todolist(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.api.delete_todolist(&list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_tasks(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<String>,
) -> Result<Json<Option<TodoList>>, ApiError> {
    Ok(Json(state.api.get_tasks(&list_id).await?))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<String>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.api.create_task(&list_id).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn edit_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(patch) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    Ok(Json(state.api.edit_task(&task_id, patch).await?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.api.delete_task(&task_id).await?))
}

async fn delete_all_tasks(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<String>,
) -> Result<Json<DeletedCount>, ApiError> {
    Ok(Json(state.api.delete_all_tasks(&list_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpApi, LocalApi};
    use crate::models::Priority;
    use crate::store::Store;
    use serde_json::json;

    async fn spawn_server() -> String {
        let api: Arc<dyn TodoApi> = Arc::new(LocalApi::new(Arc::new(
            Store::open_in_memory().unwrap(),
        )));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(api)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let base = spawn_server().await;
        let api = HttpApi::new(&base);

        let list_id = api.create_todolist().await.unwrap().id;
        let task = api.create_task(&list_id).await.unwrap();
        let edited = api
            .edit_task(&task.id, TaskPatch::priority(Priority::High))
            .await
            .unwrap();
        assert_eq!(edited.priority, Priority::High);

        let list = api.get_tasks(&list_id).await.unwrap().unwrap();
        assert_eq!(list.tasks, vec![edited.clone()]);

        assert_eq!(api.delete_all_tasks(&list_id).await.unwrap().count, 1);
        api.delete_todolist(&list_id).await.unwrap();
        assert!(api.get_tasks(&list_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_errors_keep_their_kind() {
        let base = spawn_server().await;
        let api = HttpApi::new(&base);

        let err = api.create_task("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::ListNotFound(_)));

        let err = api.delete_task("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_ids_with_url_syntax_stay_in_the_path() {
        let base = spawn_server().await;
        let api = HttpApi::new(&base);
        let list_id = api.create_todolist().await.unwrap().id;
        let task = api.create_task(&list_id).await.unwrap();

        for suffix in ["?x=1", "#frag", "/tasks"] {
            let id = format!("{}{}", list_id, suffix);
            assert!(api.get_tasks(&id).await.unwrap().is_none(), "{}", id);
        }

        let err = api
            .edit_task(&format!("{}?x=1", task.id), TaskPatch::completed(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TaskNotFound(_)));
        let list = api.get_tasks(&list_id).await.unwrap().unwrap();
        assert_eq!(list.tasks, vec![task]);
    }

    #[tokio::test]
    async fn test_malformed_patch_is_rejected() {
        let base = spawn_server().await;
        let api = HttpApi::new(&base);
        let list_id = api.create_todolist().await.unwrap().id;
        let task = api.create_task(&list_id).await.unwrap();

        let res = reqwest::Client::new()
            .patch(format!("{}/api/tasks/{}", base, task.id))
            .json(&json!({ "priority": "URGENT" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 422);

        let list = api.get_tasks(&list_id).await.unwrap().unwrap();
        assert_eq!(list.tasks, vec![task]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = HttpApi::new(&format!("http://{}", addr));
        let err = api.create_todolist().await.unwrap_err();
        assert!(matches!(err, ApiError::StoreUnavailable(_)));
    }
}
