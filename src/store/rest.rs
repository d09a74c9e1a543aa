//! Hosted Table Backend
//!
//! Talks to the table through its PostgREST HTTP interface and opens the
//! realtime websocket for change notifications.
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{ChangeCallback, Order, RemoteStore, Subscription};
use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{NewTodo, Todo, TodoPatch};
use crate::realtime;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

/// HTTP client for the `todos` table
pub struct RestStore {
    config: ClientConfig,
    client: Client,
}

impl RestStore {
    /// Create a new table client
    pub fn new(config: ClientConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
    }

    fn row_url(&self, id: i64) -> String {
        format!("{}?id=eq.{}", self.config.rest_endpoint(), id)
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    fn resource(&self) -> &str {
        &self.config.table
    }

    async fn list(&self, order: Order) -> StoreResult<Vec<Todo>> {
        let request = self
            .client
            .get(self.config.rest_endpoint())
            .query(&[("select", "*".to_string()), ("order", order.to_query())]);

        let response = self.authorized(request).send().await?;
        decode(check(response, None).await?).await
    }

    async fn insert(&self, todo: NewTodo) -> StoreResult<Todo> {
        let request = self
            .client
            .post(self.config.rest_endpoint())
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&[todo]);

        let response = self.authorized(request).send().await?;
        decode(check(response, None).await?).await
    }

    async fn update(&self, id: i64, patch: TodoPatch) -> StoreResult<Todo> {
        let request = self
            .client
            .patch(self.row_url(id))
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&patch);

        let response = self.authorized(request).send().await?;
        decode(check(response, Some(id)).await?).await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let request = self.client.delete(self.row_url(id));

        let response = self.authorized(request).send().await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> StoreResult<Subscription> {
        let endpoint = self
            .config
            .realtime_endpoint()
            .map_err(|e| StoreError::Realtime(e.to_string()))?;
        let topic = realtime::Topic::new(&self.config.schema, resource);

        let handle = realtime::connect_channel(
            endpoint,
            topic,
            self.config.heartbeat_interval(),
            on_change,
        )
        .await?;

        Ok(Subscription::from_task(handle))
    }
}

/// Turn non-success statuses into errors
///
/// A 406 on a single-row request means no row matched `id`.
async fn check(response: Response, id: Option<i64>) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if let (StatusCode::NOT_ACCEPTABLE, Some(id)) = (status, id) {
        return Err(StoreError::NotFound { id });
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Prefer the `message` field of a PostgREST error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
