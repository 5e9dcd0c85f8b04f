use std::collections::BTreeMap;
use std::fmt::{self, Display};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::{ErrorKind, Result};

/// Caller-assigned task identifier.
///
/// Identifiers must be unique among tasks that are in flight at the same
/// time. Once a task has finished, its identifier may be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// View the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Description of the outbound call a task performs.
///
/// Parameters are sent as the query string; the optional body is sent
/// verbatim.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: Method,
    url: Url,
    params: BTreeMap<String, String>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Endpoint {
    /// Create an endpoint for the given method and address
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` endpoint
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Shorthand for a `POST` endpoint
    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request body
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP method of the call
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Target address, without parameters
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Query parameters, sorted by key
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body, if any
    #[must_use]
    pub const fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// A unit of outbound work.
///
/// The `context` is an opaque caller payload carried through the dispatcher
/// untouched, so a completed task can be matched with the record that
/// motivated it. A completed task holds either the raw response body or the
/// error that prevented one.
#[derive(Debug)]
pub struct Task<C> {
    id: TaskId,
    endpoint: Endpoint,
    context: C,
    result: Option<Bytes>,
    error: Option<ErrorKind>,
}

impl<C> Task<C> {
    /// Create a new, not yet executed task
    pub fn new(id: impl Into<TaskId>, endpoint: Endpoint, context: C) -> Self {
        Self {
            id: id.into(),
            endpoint,
            context,
            result: None,
            error: None,
        }
    }

    /// The task identifier
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// The call this task performs
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The caller payload
    pub const fn context(&self) -> &C {
        &self.context
    }

    /// Raw response body, present once the call succeeded
    pub const fn result(&self) -> Option<&Bytes> {
        self.result.as_ref()
    }

    /// The failure attached by the executor, if any
    pub const fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    /// Returns `true` if the task completed with a response body
    pub const fn is_success(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Record the outcome of the call
    pub(crate) fn complete(&mut self, outcome: Result<Bytes>) {
        match outcome {
            Ok(body) => self.result = Some(body),
            Err(e) => self.error = Some(e),
        }
    }

    /// Split a completed task into its identifier, context and outcome
    ///
    /// A task that was never executed yields an empty body.
    pub fn into_outcome(self) -> (TaskId, C, Result<Bytes>) {
        let outcome = match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or_default()),
        };
        (self.id, self.context, outcome)
    }
}
