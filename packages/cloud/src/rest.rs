//! Task table access through the hosted REST endpoint

use async_trait::async_trait;
use reqwest::Method;
use taskmaster_core::{Task, TaskId, UserId};
use taskmaster_tasks::{
    NewTaskRow, StoreError, StoreResult, TableStore, TaskOrder, TaskPatch, TaskQuery,
};
use tracing::debug;

use crate::api::eq;
use crate::client::SupabaseClient;
use crate::error::CloudResult;

/// Return the affected rows from writes
const RETURN_REPRESENTATION: &str = "return=representation";

impl SupabaseClient {
    async fn authorized(&self, method: Method) -> CloudResult<reqwest::RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self.request(method, &self.rest_url(&self.tasks_table), Some(&token)))
    }

    /// Filter matching a single row of one owner
    fn row_filter(id: &TaskId, owner: &UserId) -> [(&'static str, String); 2] {
        [("id", eq(id.as_str())), ("user_id", eq(owner.as_str()))]
    }
}

fn order_param(order: TaskOrder) -> &'static str {
    match order {
        TaskOrder::NewestFirst => "created_at.desc",
        TaskOrder::OldestFirst => "created_at.asc",
    }
}

#[async_trait]
impl TableStore for SupabaseClient {
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", eq(query.owner.as_str())),
            ("order", order_param(query.order).to_string()),
        ];
        if let Some(status) = query.status {
            params.push(("status", eq(status.as_str())));
        }

        let request = self.authorized(Method::GET).await?.query(&params);
        let tasks: Vec<Task> = Self::send_json(request).await?;
        debug!("Fetched {} rows from {}", tasks.len(), self.tasks_table);
        Ok(tasks)
    }

    async fn insert(&self, row: &NewTaskRow) -> StoreResult<Task> {
        let request = self
            .authorized(Method::POST)
            .await?
            .header("Prefer", RETURN_REPRESENTATION)
            .json(row);
        let rows: Vec<Task> = Self::send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))
    }

    async fn update(
        &self,
        id: &TaskId,
        owner: &UserId,
        patch: &TaskPatch,
    ) -> StoreResult<Option<Task>> {
        let request = self
            .authorized(Method::PATCH)
            .await?
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&Self::row_filter(id, owner))
            .json(patch);
        let rows: Vec<Task> = Self::send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, id: &TaskId, owner: &UserId) -> StoreResult<bool> {
        let request = self
            .authorized(Method::DELETE)
            .await?
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&Self::row_filter(id, owner));
        let rows: Vec<serde_json::Value> = Self::send_json(request).await?;
        Ok(!rows.is_empty())
    }
}
