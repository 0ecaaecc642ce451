use crate::ids;
use crate::retry::RetryPolicy;
use crate::schema::DatabaseSchema;
use async_trait::async_trait;
use config::{RemoteConfig, RetryConfig};
use errors::{ConfigError, ConfigResult, RemoteError, RemoteResult};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use st_core::traits::{DiagnosticsSink, Severity};
use std::sync::Arc;
use tracing::{debug, warn};

/// One page of raw query results plus the opaque continuation cursor.
#[derive(Debug, Clone)]
pub struct PageBatch {
    pub pages: Vec<Value>,
    pub next_cursor: Option<String>
}

/// The remote record service, reduced to the five endpoints the engine
/// consumes. Pure request/response; no business state.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn schema(&self) -> RemoteResult<DatabaseSchema>;
    async fn query_page(&self, cursor: Option<&str>, page_size: u32) -> RemoteResult<PageBatch>;
    /// Returns the remote-issued id of the created record.
    async fn create_record(&self, properties: Value) -> RemoteResult<String>;
    async fn update_record(&self, id: &str, properties: Value) -> RemoteResult<()>;
    async fn archive_record(&self, id: &str) -> RemoteResult<()>;
}

pub struct NotionStore {
    client: Client,
    token: String,
    api_version: String,
    base_url: String,
    database_id: String,
    retry: RetryPolicy,
    diag: Arc<dyn DiagnosticsSink>
}

impl std::fmt::Debug for NotionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionStore")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("database_id", &self.database_id)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl NotionStore {
    pub fn new(
        config: &RemoteConfig,
        retry: &RetryConfig,
        diag: Arc<dyn DiagnosticsSink>
    ) -> ConfigResult<Self> {
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                name: "api_token".into()
            })?;
        let raw = config
            .database
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                name: "database".into()
            })?;
        let database_id = ids::normalize_container_id(&raw)?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string()
            })?;

        Ok(Self {
            client,
            token,
            api_version: config.api_version.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            database_id,
            retry: RetryPolicy::from_config(retry),
            diag
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// One attempt. Classification happens here: transport failures and
    /// 408/409/429/5xx are retryable, every other status is fatal, and a
    /// body that fails to parse as JSON is fatal.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>
    ) -> RemoteResult<Value> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.api_version);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| RemoteError::Transport {
            reason: e.to_string()
        })?;

        match response.status() {
            StatusCode::OK => response
                .json::<Value>()
                .await
                .map_err(|e| RemoteError::MalformedBody {
                    reason: e.to_string()
                }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(self.retry.rate_limit_fallback.as_secs());
                Err(RemoteError::RateLimited { retry_after_secs })
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    message
                })
            }
        }
    }

    /// The retry loop. The policy is an explicit value; a rate-limited
    /// attempt sleeps the server-supplied delay instead of the computed
    /// backoff. Every attempt emits one diagnostics entry.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> RemoteResult<Value> {
        let mut attempt: u32 = 0;
        loop {
            metrics::counter!("remote.attempts").increment(1);
            match self.send_once(method.clone(), path, body).await {
                Ok(value) => {
                    self.diag.record(
                        Severity::Debug,
                        "remote",
                        "request succeeded",
                        json!({ "path": path, "attempt": attempt + 1 })
                    );
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = e
                        .retry_after()
                        .map(std::time::Duration::from_secs)
                        .unwrap_or_else(|| self.retry.delay_for(attempt));
                    warn!(
                        path = path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying remote request"
                    );
                    self.diag.record(
                        Severity::Warn,
                        "remote",
                        "retrying request",
                        json!({
                            "path": path,
                            "attempt": attempt + 1,
                            "delayMs": delay.as_millis() as u64,
                            "error": e.to_string()
                        })
                    );
                    metrics::counter!("remote.retries").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    metrics::counter!("remote.retry_exhausted").increment(1);
                    return Err(RemoteError::RetryExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e)
                    });
                }
                Err(e) => {
                    debug!(path = path, error = %e, "Remote request failed permanently");
                    self.diag.record(
                        Severity::Error,
                        "remote",
                        "request failed",
                        json!({ "path": path, "error": e.to_string() })
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl RemoteStore for NotionStore {
    async fn schema(&self) -> RemoteResult<DatabaseSchema> {
        let body = self
            .send(
                Method::GET,
                &format!("/databases/{}", self.database_id),
                None
            )
            .await?;
        DatabaseSchema::parse(&body)
    }

    async fn query_page(&self, cursor: Option<&str>, page_size: u32) -> RemoteResult<PageBatch> {
        let mut request = json!({ "page_size": page_size.min(100) });
        if let Some(cursor) = cursor {
            request["start_cursor"] = json!(cursor);
        }

        let body = self
            .send(
                Method::POST,
                &format!("/databases/{}/query", self.database_id),
                Some(&request)
            )
            .await?;

        let pages = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| RemoteError::MalformedBody {
                reason: "query response missing results array".into()
            })?;
        let next_cursor = body
            .get("next_cursor")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(PageBatch { pages, next_cursor })
    }

    async fn create_record(&self, properties: Value) -> RemoteResult<String> {
        let request = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties
        });
        let body = self.send(Method::POST, "/pages", Some(&request)).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| RemoteError::MalformedBody {
                reason: "create response missing id".into()
            })
    }

    async fn update_record(&self, id: &str, properties: Value) -> RemoteResult<()> {
        let request = json!({ "properties": properties });
        self.send(Method::PATCH, &format!("/pages/{id}"), Some(&request))
            .await?;
        Ok(())
    }

    async fn archive_record(&self, id: &str) -> RemoteResult<()> {
        let request = json!({ "archived": true });
        self.send(Method::PATCH, &format!("/pages/{id}"), Some(&request))
            .await?;
        Ok(())
    }
}
