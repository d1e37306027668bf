//! The request executor: one logical HTTP call with timeout, retry/backoff
//! and cancellation.
//!
//! Construct one [`RequestExecutor`] per process at startup; it owns the
//! shared `reqwest::Client` and the cancellation registry.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::error::Elapsed;
use url::Url;

use plutus_types::{ExecutorConfig, Method, RequestDescriptor, RequestKey};

use crate::backoff;
use crate::error::RequestError;
use crate::registry::{CancelReason, CancellationRegistry};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// A 2xx response with its body fully read. The per-attempt timeout covers
/// the body, not just the response headers, so by the time callers see this
/// the wire work is done.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: u16,
    body: Vec<u8>,
}

impl RawResponse {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Executes dashboard API calls with the delivery semantics described in the
/// crate docs. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RequestExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
    registry: CancellationRegistry,
}

impl RequestExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build()?;
        Ok(Self {
            client,
            config,
            registry: CancellationRegistry::new(),
        })
    }

    /// Execute `descriptor` and decode the 2xx body into `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, RequestError> {
        let response = self.send_raw(descriptor).await?;
        serde_json::from_slice(response.body()).map_err(RequestError::Decode)
    }

    /// Execute `descriptor` and return the raw 2xx response. Retry, timeout
    /// and cancellation semantics are identical to [`execute`](Self::execute);
    /// only body decoding is left to the caller.
    pub async fn send_raw(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<RawResponse, RequestError> {
        match descriptor.key().cloned() {
            Some(key) => {
                let (generation, cancel_rx) = self.registry.install(&key).await;
                let result = self.run_attempts(&descriptor, Some(cancel_rx)).await;
                // Only the current holder may evict; a successor under the
                // same key keeps its own entry.
                self.registry.remove(&key, generation).await;
                result
            }
            None => self.run_attempts(&descriptor, None).await,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.execute(RequestDescriptor::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, RequestError> {
        self.execute_with_body(Method::Post, path, body).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, RequestError> {
        self.execute_with_body(Method::Put, path, body).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, RequestError> {
        self.execute_with_body(Method::Patch, path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.execute(RequestDescriptor::new(Method::Delete, path))
            .await
    }

    /// Cancel the in-flight request under `key`, if any.
    pub async fn cancel(&self, key: &RequestKey) -> bool {
        self.registry.cancel(key).await
    }

    /// Cancel every in-flight keyed request. Whole-application teardown.
    pub async fn cancel_all(&self) {
        self.registry.cancel_all().await;
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn execute_with_body<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, RequestError> {
        let body = serde_json::to_value(body).map_err(RequestError::Encode)?;
        self.execute(RequestDescriptor::new(method, path).body(body))
            .await
    }

    async fn run_attempts(
        &self,
        descriptor: &RequestDescriptor,
        mut cancel_rx: Option<oneshot::Receiver<CancelReason>>,
    ) -> Result<RawResponse, RequestError> {
        let url = self
            .config
            .base_url()
            .join(descriptor.path())
            .map_err(|_| RequestError::InvalidTarget {
                path: descriptor.path().to_string(),
            })?;
        let timeout = descriptor
            .timeout_override()
            .unwrap_or_else(|| self.config.timeout());
        let max_retries = descriptor
            .max_retries_override()
            .unwrap_or_else(|| self.config.max_retries());

        let mut attempt: u32 = 0;
        loop {
            // The whole exchange, headers and body, lives inside one timed
            // race: a server that stalls mid-body is a timeout, not a hang.
            let call = self.one_call(&url, descriptor);
            let timed = tokio::time::timeout(timeout, call);

            // Cancellation is checked ahead of the transport race so a
            // superseded request can never surface success afterwards.
            let outcome = match cancel_rx.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        biased;
                        reason = &mut *rx => {
                            tracing::debug!(path = descriptor.path(), ?reason, "request cancelled in flight");
                            return Err(RequestError::Cancelled);
                        }
                        raced = timed => classify(raced),
                    }
                }
                None => classify(timed.await),
            };

            let cause = match outcome {
                Attempt::Success(response) => return Ok(response),
                Attempt::Client { status, detail } => {
                    tracing::debug!(path = descriptor.path(), status, "client error, not retrying");
                    return Err(RequestError::ClientError { status, detail });
                }
                Attempt::Transient(cause) => cause,
            };

            if attempt >= max_retries {
                tracing::warn!(
                    path = descriptor.path(),
                    attempts = attempt + 1,
                    "retry budget exhausted"
                );
                return Err(cause.into_terminal(attempt + 1));
            }

            let delay = backoff::retry_delay(attempt);
            tracing::debug!(
                path = descriptor.path(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );

            // The backoff wait also races cancellation; a superseded request
            // settles from inside its backoff, not after it.
            match cancel_rx.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        biased;
                        _ = &mut *rx => return Err(RequestError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// One transport call: send the request and read the full body.
    async fn one_call(
        &self,
        url: &Url,
        descriptor: &RequestDescriptor,
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let response = self.build_request(url, descriptor).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }

    fn build_request(&self, url: &Url, descriptor: &RequestDescriptor) -> reqwest::RequestBuilder {
        let method = match descriptor.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        // Later inserts win: JSON defaults, then executor-wide headers, then
        // per-call headers.
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let configured = self.config.headers().iter();
        let per_call = descriptor.headers().iter().map(|(n, v)| (n, v));
        for (name, value) in configured.chain(per_call) {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = name.as_str(), "skipping malformed header"),
            }
        }

        let mut builder = self.client.request(method, url.clone()).headers(headers);
        if let Some(body) = descriptor.body_value() {
            builder = builder.json(body);
        }
        builder
    }
}

enum Attempt {
    Success(RawResponse),
    Client { status: u16, detail: Option<Value> },
    Transient(TransientCause),
}

enum TransientCause {
    Server(u16),
    Network(reqwest::Error),
    TimedOut,
}

impl TransientCause {
    fn into_terminal(self, attempts: u32) -> RequestError {
        match self {
            TransientCause::Server(status) => RequestError::ServerError { status, attempts },
            TransientCause::Network(source) => RequestError::NetworkError { attempts, source },
            TransientCause::TimedOut => RequestError::Timeout { attempts },
        }
    }
}

fn classify(raced: Result<Result<(StatusCode, Vec<u8>), reqwest::Error>, Elapsed>) -> Attempt {
    match raced {
        Ok(Ok((status, body))) => {
            if status.is_success() {
                Attempt::Success(RawResponse {
                    status: status.as_u16(),
                    body,
                })
            } else if status.is_client_error() {
                Attempt::Client {
                    status: status.as_u16(),
                    detail: serde_json::from_slice(&body).ok(),
                }
            } else {
                Attempt::Transient(TransientCause::Server(status.as_u16()))
            }
        }
        Ok(Err(source)) => Attempt::Transient(TransientCause::Network(source)),
        Err(_elapsed) => Attempt::Transient(TransientCause::TimedOut),
    }
}
