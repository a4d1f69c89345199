use std::sync::Arc;

use crate::error::{ApiError, ErrorBody};
use crate::models::{CreatedList, DeletedCount, Task, TaskPatch, TodoList};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// The remote-callable list/task operations.
#[async_trait]
pub trait TodoApi: Send + Sync + 'static {
    async fn create_todolist(&self) -> Result<CreatedList, ApiError>;
    async fn delete_todolist(&self, list_id: &str) -> Result<(), ApiError>;
    /// `Ok(None)` when the identifier does not resolve to a list.
    async fn get_tasks(&self, list_id: &str) -> Result<Option<TodoList>, ApiError>;
    async fn create_task(&self, list_id: &str) -> Result<Task, ApiError>;
    async fn edit_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, ApiError>;
    async fn delete_task(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn delete_all_tasks(&self, list_id: &str) -> Result<DeletedCount, ApiError>;
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreUnavailable(err.to_string())
    }
}

fn require_id(kind: &str, id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} id must not be empty", kind)));
    }
    Ok(())
}

/// Store-backed implementation; this is what the server exposes.
#[derive(Clone)]
pub struct LocalApi {
    store: Arc<Store>,
}

impl LocalApi {
    pub fn new(store: Arc<Store>) -> LocalApi {
        LocalApi { store }
    }
}

#[async_trait]
impl TodoApi for LocalApi {
    async fn create_todolist(&self) -> Result<CreatedList, ApiError> {
        let id = self.store.create_list()?;
        Ok(CreatedList { id })
    }

    async fn delete_todolist(&self, list_id: &str) -> Result<(), ApiError> {
        // Two independent deletes; a failure part way is logged, not surfaced.
        match self.store.delete_tasks_for_list(list_id) {
            Ok(count) => debug!(list_id, count, "deleted tasks of list"),
            Err(err) => warn!(list_id, error = %err, "failed to delete tasks of list"),
        }
        match self.store.delete_list(list_id) {
            Ok(0) => debug!(list_id, "delete of unknown list ignored"),
            Ok(_) => debug!(list_id, "deleted list"),
            Err(err) => warn!(list_id, error = %err, "failed to delete list"),
        }
        Ok(())
    }

    async fn get_tasks(&self, list_id: &str) -> Result<Option<TodoList>, ApiError> {
        match self.store.find_list(list_id) {
            Ok(list) => Ok(list),
            Err(err) => {
                warn!(list_id, error = %err, "list lookup failed, reporting not found");
                Ok(None)
            }
        }
    }

    async fn create_task(&self, list_id: &str) -> Result<Task, ApiError> {
        require_id("list", list_id)?;
        self.store
            .insert_task(list_id)?
            .ok_or_else(|| ApiError::ListNotFound(list_id.to_string()))
    }

    async fn edit_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, ApiError> {
        require_id("task", task_id)?;
        self.store
            .update_task(task_id, &patch)?
            .ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))
    }

    async fn delete_task(&self, task_id: &str) -> Result<Task, ApiError> {
        require_id("task", task_id)?;
        self.store
            .delete_task(task_id)?
            .ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))
    }

    async fn delete_all_tasks(&self, list_id: &str) -> Result<DeletedCount, ApiError> {
        let count = self.store.delete_tasks_for_list(list_id)?;
        Ok(DeletedCount { count })
    }
}

/// Client for a remote server speaking the JSON surface in `server`.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> HttpApi {
        HttpApi {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Appends `/api/<segments..>` to the base URL. Each segment is
    /// percent-encoded, so ids never spill into the query or fragment.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = || ApiError::StoreUnavailable(format!("invalid server url '{}'", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::StoreUnavailable(err.to_string())
}

async fn error_from(res: Response) -> ApiError {
    let status = res.status().as_u16();
    let body = res.json::<ErrorBody>().await.ok();
    ApiError::from_response(status, body)
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    if res.status().is_success() {
        res.json::<T>().await.map_err(transport)
    } else {
        Err(error_from(res).await)
    }
}

#[async_trait]
impl TodoApi for HttpApi {
    async fn create_todolist(&self) -> Result<CreatedList, ApiError> {
        let res = self
            .client
            .post(self.url(&["todolists"])?)
            .send()
            .await
            .map_err(transport)?;
        decode(res).await
    }

    async fn delete_todolist(&self, list_id: &str) -> Result<(), ApiError> {
        let res = self
            .client
            .delete(self.url(&["todolists", list_id])?)
            .send()
            .await
            .map_err(transport)?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(error_from(res).await)
        }
    }

    async fn get_tasks(&self, list_id: &str) -> Result<Option<TodoList>, ApiError> {
        let res = self
            .client
            .get(self.url(&["todolists", list_id])?)
            .send()
            .await
            .map_err(transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(res).await
    }

    async fn create_task(&self, list_id: &str) -> Result<Task, ApiError> {
        let res = self
            .client
            .post(self.url(&["todolists", list_id, "tasks"])?)
            .send()
            .await
            .map_err(transport)?;
        decode(res).await
    }

    async fn edit_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, ApiError> {
        let res = self
            .client
            .patch(self.url(&["tasks", task_id])?)
            .json(&patch)
            .send()
            .await
            .map_err(transport)?;
        decode(res).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let res = self
            .client
            .delete(self.url(&["tasks", task_id])?)
            .send()
            .await
            .map_err(transport)?;
        decode(res).await
    }

    async fn delete_all_tasks(&self, list_id: &str) -> Result<DeletedCount, ApiError> {
        let res = self
            .client
            .delete(self.url(&["todolists", list_id, "tasks"])?)
            .send()
            .await
            .map_err(transport)?;
        decode(res).await
    }
}
