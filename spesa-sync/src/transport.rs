//! Transport seam between the sync layer and the remote API.
//!
//! A [`Transport`] performs exactly one HTTP exchange. It never retries and
//! never interprets bodies beyond JSON parsing; classification into success
//! and failure happens here, normalization of failures happens in
//! [`crate::SyncError`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// HTTP methods used by the Spesa API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against the API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Filled in by the sync client from the credential source.
    pub auth_token: Option<String>,
    /// Anonymous requests never carry a token, even when one is stored.
    pub anonymous: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth_token: None,
            anonymous: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter; empty values are skipped.
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.query.push((name.into(), value));
        }
        self
    }

    /// Append a query parameter only when present.
    pub fn with_optional_query<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query(name, value),
            None => self,
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Path plus encoded query string, used for logging and mocks.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Percent-encode one path segment (aisle names, search terms, ids).
pub fn path_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Successful (2xx) response. Empty bodies come back as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Body of a failed response, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// No response at all: offline, DNS, connection reset, transport timeout.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a status outside [200, 300).
    #[error("HTTP {status}")]
    Api { status: u16, body: ResponseBody },
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_query_values_are_skipped() {
        let request = Request::get("/offers/aisle/Frutta")
            .with_query("page", 1)
            .with_query("chainName", "")
            .with_optional_query::<String>("sort", None);
        assert_eq!(request.query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(request.target(), "/offers/aisle/Frutta?page=1");
    }

    #[test]
    fn target_encodes_query_values() {
        let request = Request::get("/offers").with_query("brand", "Mulino Bianco");
        assert_eq!(request.target(), "/offers?brand=Mulino%20Bianco");
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(path_segment("Frutta & Verdura"), "Frutta%20%26%20Verdura");
    }

    #[test]
    fn response_body_detects_json() {
        assert_eq!(
            ResponseBody::from_text("{\"msg\":\"x\"}".into()),
            ResponseBody::Json(json!({"msg": "x"}))
        );
        assert_eq!(
            ResponseBody::from_text("oops".into()),
            ResponseBody::Text("oops".into())
        );
        assert_eq!(ResponseBody::from_text("  ".into()), ResponseBody::Empty);
    }
}
