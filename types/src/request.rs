use std::time::Duration;

use serde_json::Value;

use crate::ids::RequestKey;

/// HTTP method for a dashboard API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// GET requests never carry a body.
    #[must_use]
    pub fn allows_body(self) -> bool {
        !matches!(self, Method::Get)
    }
}

/// One logical HTTP call, immutable once built.
///
/// `path` is joined onto the executor's base URL. Per-call `timeout` and
/// `max_retries` override the executor defaults when present. A `request_key`
/// opts the call into supersession: a later call under the same key cancels
/// this one.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    path: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    request_key: Option<RequestKey>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: Vec::new(),
            body: None,
            timeout: None,
            max_retries: None,
            request_key: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Caller-supplied header, merged over the JSON defaults.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON body. Ignored for GET requests.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn request_key(mut self, key: impl Into<RequestKey>) -> Self {
        self.request_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn body_value(&self) -> Option<&Value> {
        if self.method.allows_body() {
            self.body.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn max_retries_override(&self) -> Option<u32> {
        self.max_retries
    }

    #[must_use]
    pub fn key(&self) -> Option<&RequestKey> {
        self.request_key.as_ref()
    }
}
