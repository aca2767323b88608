//! Thin HTTP client over the REST backend.
//!
//! Every request is resolved against the configured base URL and carries
//! `Authorization: Bearer <token>` whenever the session holds a token. A 401
//! from any endpoint invalidates the session (clearing persisted state and
//! emitting [`Navigation::Login`](crate::session::Navigation::Login)) unless
//! a newer login replaced the token the request was sent with. Every other
//! failure is returned to the caller unchanged. Nothing is retried.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::errors::ApiError;
use crate::session::Session;

const USER_AGENT: &str = concat!("sprintboard/", env!("CARGO_PKG_VERSION"));

/// Error body shape used by the backend for 4xx/5xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpClient {
    pub fn new(base_url: &str, session: Arc<Session>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// A request carrying the current bearer token, tagged with the session
    /// generation the token belongs to.
    fn request(&self, method: Method, url: &str) -> (RequestBuilder, u64) {
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        let (token, generation) = self.session.credentials();
        let builder = match token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        };
        (builder, generation)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (builder, generation) = self.request(Method::GET, &self.url(path));
        self.send_json(builder, generation, path).await
    }

    pub async fn get_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, generation) = self.request(Method::GET, &self.url(path));
        let builder = builder.query(query);
        self.send_json(builder, generation, path).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, generation) = self.request(Method::POST, &self.url(path));
        let builder = builder.json(body);
        self.send_json(builder, generation, path).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, generation) = self.request(Method::PUT, &self.url(path));
        let builder = builder.json(body);
        self.send_json(builder, generation, path).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, generation) = self.request(Method::PATCH, &self.url(path));
        let builder = builder.json(body);
        self.send_json(builder, generation, path).await
    }

    /// POST whose response body (if any) is ignored.
    pub async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let (builder, generation) = self.request(Method::POST, &self.url(path));
        let builder = builder.json(body);
        self.execute(builder, generation, path).await.map(|_| ())
    }

    /// DELETE whose response body (if any) is ignored.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let (builder, generation) = self.request(Method::DELETE, &self.url(path));
        self.execute(builder, generation, path).await.map(|_| ())
    }

    /// Form POST to an absolute URL (used for channel authorization, which
    /// lives outside the API prefix).
    pub async fn post_form_absolute<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let (builder, generation) = self.request(Method::POST, url);
        let builder = builder.form(form);
        self.send_json(builder, generation, url).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        generation: u64,
        path: &str,
    ) -> Result<T, ApiError> {
        let body = self.execute(builder, generation, path).await?;
        // 204 / empty bodies decode as JSON null so `()` and `Option<_>` work.
        let bytes: &[u8] = if body.is_empty() { b"null" } else { &body };
        serde_json::from_slice(bytes).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn execute(&self, builder: RequestBuilder, generation: u64, path: &str) -> Result<Vec<u8>, ApiError> {
        let network = |source| ApiError::Network {
            path: path.to_string(),
            source,
        };
        let response = builder.send().await.map_err(network)?;
        let status = response.status();
        let body = response.bytes().await.map_err(network)?.to_vec();
        debug!(path, status = status.as_u16(), bytes = body.len(), "http response");

        if status.is_success() {
            return Ok(body);
        }
        Err(self.classify(status, &body, generation))
    }

    fn classify(&self, status: StatusCode, body: &[u8], generation: u64) -> ApiError {
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate_from(generation);
            return ApiError::Unauthorized;
        }
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        let message = parsed
            .message
            .or(parsed.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string()
            });
        if status.is_client_error() {
            ApiError::Rejected {
                status: status.as_u16(),
                message,
                errors: parsed.errors,
            }
        } else {
            ApiError::Server {
                status: status.as_u16(),
                message,
            }
        }
    }
}
