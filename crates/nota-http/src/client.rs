use std::time::Duration;

use nota_core::{Error, Reachability};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Shared HTTP plumbing: URL building, auth, and error classification.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

/// Error body of the notes API: `message` is a string, or a list of
/// validation messages.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: ErrorMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url,
            token: config.token,
        })
    }

    /// `base_url` with `segments` appended as path components.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal(format!("Base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// An authenticated request for `segments` under the base URL.
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, Error> {
        let request = self.http.request(method, self.url(segments)?);
        Ok(match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        })
    }

    pub(crate) fn get(&self, segments: &[&str]) -> Result<RequestBuilder, Error> {
        self.request(Method::GET, segments)
    }

    pub(crate) fn post(&self, segments: &[&str]) -> Result<RequestBuilder, Error> {
        self.request(Method::POST, segments)
    }

    pub(crate) fn patch(&self, segments: &[&str]) -> Result<RequestBuilder, Error> {
        self.request(Method::PATCH, segments)
    }

    pub(crate) fn delete(&self, segments: &[&str]) -> Result<RequestBuilder, Error> {
        self.request(Method::DELETE, segments)
    }

    /// Send a request and return the response if its status is a success.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), %status, "response");

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, Error> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to decode response: {}", e)))
    }
}

#[async_trait::async_trait(?Send)]
impl Reachability for ApiClient {
    /// Any HTTP answer from the base URL counts, whatever its status.
    async fn is_reachable(&self) -> bool {
        match self.http.get(self.base_url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "server unreachable");
                false
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_builder() {
        return Error::Internal(format!("Invalid request: {}", e));
    }
    Error::NetworkUnavailable(e.to_string())
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| match b.message {
            ErrorMessage::One(m) => m,
            ErrorMessage::Many(m) => m.join("; "),
        })
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    if status == StatusCode::NOT_FOUND {
        Error::NotFound(message)
    } else {
        Error::server(status.as_u16(), message)
    }
}
