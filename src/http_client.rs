use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::FetchError;

const AUTH_HEADER: &str = "X-Auth-Token";
const BODY_EXCERPT_CHARS: usize = 300;

/// One outgoing GET, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub url: String,
    pub query: Vec<(&'static str, String)>,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_excerpt(&self) -> String {
        self.body.chars().take(BODY_EXCERPT_CHARS).collect()
    }
}

/// Issues a single request. Never retries.
pub trait Transport {
    fn get(&self, request: &ApiRequest) -> Result<RawResponse, FetchError>;
}

/// Blocking reqwest transport with a fixed per-request timeout.
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &ApiRequest) -> Result<RawResponse, FetchError> {
        let resp = self
            .client
            .get(&request.url)
            .query(&request.query)
            .header(AUTH_HEADER, &request.auth_token)
            .send()
            .map_err(|err| self.map_err(&request.path, err))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp
            .text()
            .map_err(|err| self.map_err(&request.path, err))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpTransport {
    fn map_err(&self, path: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                path: path.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Request {
                path: path.to_string(),
                source: err,
            }
        }
    }
}
