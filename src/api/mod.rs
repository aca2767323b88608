//! Request/response schemas for each REST endpoint.
//!
//! Wire types (`*Resource`) mirror what the backend actually sends and are
//! converted into the normalized models from `sprintboard-common` through
//! `TryFrom`, which is also where responses are validated. Request types
//! implement [`Validate`] and are checked before they leave the process.
//!
//! | Module     | Endpoints                                                   |
//! |------------|-------------------------------------------------------------|
//! | `auth`     | `POST /login`, `POST /register`, `POST /logout`, `GET /me`  |
//! | `projects` | `/projects`, `/projects/{id}`, `/projects/{id}/team-members` |
//! | `sprints`  | `/sprints`, `/sprints/{id}`                                 |
//! | `tasks`    | `/tasks`, `/tasks/{id}`, `PATCH /tasks/{id}/status`         |

pub mod auth;
pub mod projects;
pub mod sprints;
pub mod tasks;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sprintboard_common::Identified;

use crate::errors::ApiError;
use crate::http::HttpClient;

pub use auth::AuthApi;
pub use projects::ProjectsApi;
pub use sprints::SprintsApi;
pub use tasks::TasksApi;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"));

/// Boundary validation for outgoing requests.
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

/// The backend wraps some payloads in `{"data": ...}` and returns others bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

pub(crate) fn require_id(field: &str, id: i64) -> Result<(), ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(field, format!("expected a positive id, got {}", id)));
    }
    Ok(())
}

pub(crate) fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(ApiError::validation(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }
    Ok(())
}

pub(crate) fn require_email(field: &str, value: &str) -> Result<(), ApiError> {
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(ApiError::validation(field, "must be a valid email address"));
    }
    Ok(())
}

fn convert_all<W, E>(items: Vec<W>) -> Result<Vec<E>, ApiError>
where
    W: TryInto<E, Error = ApiError>,
{
    items.into_iter().map(TryInto::try_into).collect()
}

/// One canonical CRUD binding per resource.
///
/// Implementors only name their types, path and client; the request
/// plumbing, envelope handling, validation and normalization are shared.
#[async_trait]
pub trait CrudApi: Send + Sync + 'static {
    /// Normalized model held by the store.
    type Entity: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Raw response schema.
    type Wire: DeserializeOwned + TryInto<Self::Entity, Error = ApiError> + Send;
    type Filter: Serialize + Validate + Send + Sync;
    type Create: Serialize + Validate + Send + Sync;
    type Update: Serialize + Validate + Send + Sync;

    /// Collection path, e.g. `projects`.
    const PATH: &'static str;

    fn client(&self) -> &HttpClient;

    async fn list(&self, filter: Option<&Self::Filter>) -> Result<Vec<Self::Entity>, ApiError> {
        let response: Envelope<Vec<Self::Wire>> = match filter {
            Some(filter) => {
                filter.validate()?;
                self.client().get_with_query(Self::PATH, filter).await?
            }
            None => self.client().get(Self::PATH).await?,
        };
        convert_all(response.into_inner())
    }

    async fn get(&self, id: i64) -> Result<Self::Entity, ApiError> {
        require_id("id", id)?;
        let response: Envelope<Self::Wire> =
            self.client().get(&format!("{}/{}", Self::PATH, id)).await?;
        response.into_inner().try_into()
    }

    async fn create(&self, input: &Self::Create) -> Result<Self::Entity, ApiError> {
        input.validate()?;
        let response: Envelope<Self::Wire> = self.client().post(Self::PATH, input).await?;
        response.into_inner().try_into()
    }

    async fn update(&self, id: i64, patch: &Self::Update) -> Result<Self::Entity, ApiError> {
        require_id("id", id)?;
        patch.validate()?;
        let response: Envelope<Self::Wire> =
            self.client().put(&format!("{}/{}", Self::PATH, id), patch).await?;
        response.into_inner().try_into()
    }

    async fn delete(&self, id: i64) -> Result<(), ApiError> {
        require_id("id", id)?;
        self.client().delete(&format!("{}/{}", Self::PATH, id)).await
    }
}

/// Strings or `{ "name": ... }` objects, as the backend sends for tags and members.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NamedRef {
    Name(String),
    Object { name: String },
}

impl NamedRef {
    pub fn into_name(self) -> String {
        match self {
            NamedRef::Name(name) | NamedRef::Object { name } => name,
        }
    }
}

/// `{ "id": ... }` references to users embedded in other resources.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub id: i64,
}
