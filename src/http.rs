//! HTTP request helper for polling the sensor endpoint.
//!
//! A URL property is either a plain string or an object carrying the request
//! method, body, basic auth, headers and TLS/timeout options.

use crate::error::{Result, SensorError};
use log::debug;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// A parsed, validated request description.
#[derive(Debug, Clone)]
pub struct UrlObject {
    pub url: Url,
    pub method: Method,
    pub body: Option<String>,
    pub auth: Option<BasicAuth>,
    pub headers: BTreeMap<String, String>,
    /// Reject invalid TLS certificates.
    pub strict_ssl: bool,
    pub request_timeout: Option<Duration>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUrlObject {
    url: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    auth: Option<BasicAuth>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default, rename = "strictSSL")]
    strict_ssl: bool,
    /// Milliseconds
    #[serde(default)]
    request_timeout: Option<u64>,
}

impl UrlObject {
    fn from_url(url: &str) -> Result<Self> {
        Ok(Self {
            url: parse_url(url)?,
            method: Method::GET,
            body: None,
            auth: None,
            headers: BTreeMap::new(),
            strict_ssl: false,
            request_timeout: None,
        })
    }
}

/// Parse a URL property given as a string or an object with a `url` key.
pub fn parse_url_property(property: &Value) -> Result<UrlObject> {
    match property {
        Value::String(url) => UrlObject::from_url(url),
        Value::Object(_) => {
            let raw: RawUrlObject = serde_json::from_value(property.clone())
                .map_err(|e| SensorError::InvalidUrl(e.to_string()))?;
            let url = raw.url.ok_or(SensorError::MissingProperty("url"))?;

            let mut object = UrlObject::from_url(&url)?;
            if let Some(method) = raw.method {
                object.method = Method::from_bytes(method.to_uppercase().as_bytes())
                    .map_err(|_| SensorError::InvalidUrl(format!("invalid method '{}'", method)))?;
            }
            object.body = match raw.body {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
            };
            object.auth = raw.auth;
            object.headers = raw.headers;
            object.strict_ssl = raw.strict_ssl;
            object.request_timeout = raw.request_timeout.map(Duration::from_millis);
            Ok(object)
        }
        _ => Err(SensorError::InvalidUrl(
            "property must be a string or an object".to_string(),
        )),
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| SensorError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(SensorError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}

/// Response status and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Whether `status` is in the 2xx range.
pub fn is_http_success_code(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Build a client honouring the TLS and timeout options of `url`.
pub fn build_client(url: &UrlObject) -> Result<Client> {
    let mut builder = Client::builder().danger_accept_invalid_certs(!url.strict_ssl);
    if let Some(timeout) = url.request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Issue the request described by `url` and read the full body.
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures are errors.
pub async fn http_request(client: &Client, url: &UrlObject) -> Result<HttpResponse> {
    debug!("{} {}", url.method, url.url);

    let mut request = client.request(url.method.clone(), url.url.clone());
    for (name, value) in &url.headers {
        request = request.header(name, value);
    }
    if let Some(auth) = &url.auth {
        request = request.basic_auth(&auth.username, auth.password.as_ref());
    }
    if let Some(body) = &url.body {
        request = request.body(body.clone());
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;

    Ok(HttpResponse { status, body })
}
