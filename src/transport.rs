//! Transport boundary
//!
//! The SDK never talks to the network itself. Each API call is described as
//! an [`ApiRequest`] and handed to a [`Transport`], which resolves once with
//! the parsed JSON body or a [`TransportError`]. Transports must not retry
//! and do not interpret status codes; the body is returned as sent.
//!
//! [`HttpTransport`] (feature `http`) is the reqwest-backed implementation.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;

/// HTTP method of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `multipart/form-data`
    Form(Vec<FormField>),
}

/// One multipart form field
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

impl FormField {
    pub fn text(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: FormValue::Text(value.to_string()),
        }
    }
}

/// Value of a multipart form field
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// A fully described API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL including the query string
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    /// First header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Asynchronous request executor
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request` once and return the decoded JSON body
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use reqwest::multipart::{Form, Part};
    use reqwest::Url;

    /// [`Transport`] over reqwest
    #[derive(Debug, Clone, Default)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Use a preconfigured client (proxies, timeouts, ...)
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
            let url = Url::parse(&request.url)
                .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut builder = self.client.request(method, url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(&value),
                RequestBody::Form(fields) => builder.multipart(build_form(fields)?),
            };

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            tracing::debug!(%status, bytes = text.len(), "response received");

            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
        }
    }

    fn build_form(fields: Vec<FormField>) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for field in fields {
            form = match field.value {
                FormValue::Text(text) => form.text(field.name, text),
                FormValue::File {
                    file_name,
                    mime_type,
                    bytes,
                } => {
                    let mut part = Part::bytes(bytes).file_name(file_name);
                    if let Some(mime) = mime_type {
                        part = part
                            .mime_str(&mime)
                            .map_err(|e| TransportError::Request(e.to_string()))?;
                    }
                    form.part(field.name, part)
                }
            };
        }
        Ok(form)
    }
}
