//! Request descriptors.
//!
//! A [`RequestDescriptor`] describes one logical call before signing. Signing
//! strategies consume it, append headers or parameters, and hand it back.
//! Query parameters keep insertion order because several venues sign the
//! query string exactly as sent.

use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::ports::HttpMethod;

/// Whether a call must be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Public endpoint, sent as-is
    Public,
    /// Private endpoint, signed with the client's credentials
    Signed,
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Raw JSON text, signed byte-for-byte
    Json(String),
}

/// Description of one call: method, path, ordered params, body, headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Method
    pub method: HttpMethod,
    /// Path including any API prefix (e.g. `/api/v4/spot/accounts`)
    pub path: String,
    /// Query parameters, in the order they are sent and signed
    pub query: Vec<(String, String)>,
    /// Body
    pub body: RequestBody,
    /// Headers added by the caller or the signer
    pub headers: Vec<(String, String)>,
    /// Receive window in ms; signers inject their default when `None`
    pub recv_window: Option<u64>,
}

impl RequestDescriptor {
    /// New descriptor with no params, body or headers.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            headers: Vec::new(),
            recv_window: None,
        }
    }

    /// GET descriptor.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST descriptor.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// DELETE descriptor.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_param(key, value);
        self
    }

    /// Append a query parameter when `value` is present.
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Set the body to `body` serialized as JSON.
    pub fn json<T: Serialize>(mut self, body: &T) -> GatewayResult<Self> {
        let raw = serde_json::to_string(body)
            .map_err(|e| GatewayError::Serialization(e.to_string()))?;
        self.body = RequestBody::Json(raw);
        Ok(self)
    }

    /// Set a raw JSON body.
    pub fn raw_json(mut self, raw: impl Into<String>) -> Self {
        self.body = RequestBody::Json(raw.into());
        self
    }

    /// Override the receive window.
    pub fn recv_window(mut self, millis: u64) -> Self {
        self.recv_window = Some(millis);
        self
    }

    /// Append a query parameter in place.
    pub fn push_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Append a header in place.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// URL-encoded query string, in insertion order, without leading `?`.
    pub fn query_string(&self) -> String {
        // Pairs of strings always encode.
        serde_urlencoded::to_string(&self.query).unwrap_or_default()
    }

    /// Raw body text (`""` when empty).
    pub fn body_str(&self) -> &str {
        match &self.body {
            RequestBody::Empty => "",
            RequestBody::Json(raw) => raw,
        }
    }

    /// Path plus `?query` when there is one.
    pub fn request_path(&self) -> String {
        let query = self.query_string();
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, query)
        }
    }

    /// `METHOD path` label used in logs and errors.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}
