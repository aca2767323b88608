use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprintboard_common::{Priority, Task, TaskStatus};

use super::{CrudApi, Envelope, NamedRef, UserRef, Validate, require_id, require_text};
use crate::errors::ApiError;
use crate::http::HttpClient;

const TITLE_MAX: usize = 255;
const POINTS_MAX: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResource {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub story_points: Option<u32>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub assignee: Option<UserRef>,
    #[serde(default, alias = "created_by")]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub sprint_id: Option<i64>,
    pub project_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<NamedRef>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

impl TryFrom<TaskResource> for Task {
    type Error = ApiError;

    fn try_from(wire: TaskResource) -> Result<Self, Self::Error> {
        require_id("task.id", wire.id)?;
        require_id("task.project_id", wire.project_id)?;
        require_text("task.title", &wire.title, TITLE_MAX)?;
        Ok(Task {
            id: wire.id,
            title: wire.title,
            description: wire.description.unwrap_or_default(),
            status: wire.status,
            priority: wire.priority,
            story_points: wire.story_points.unwrap_or(0),
            assignee_id: wire.assignee_id.or(wire.assignee.map(|a| a.id)),
            creator_id: wire.creator_id,
            sprint_id: wire.sprint_id,
            project_id: wire.project_id,
            created_at: wire.created_at,
            updated_at: wire.updated_at.unwrap_or(wire.created_at),
            tags: wire.tags.into_iter().map(NamedRef::into_name).collect(),
        })
    }
}

fn check_points(points: Option<u32>) -> Result<(), ApiError> {
    match points {
        Some(p) if p > POINTS_MAX => Err(ApiError::validation(
            "story_points",
            format!("must be at most {}", POINTS_MAX),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub project_id: i64,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CreateTaskRequest {
    pub fn new(project_id: i64, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            project_id,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            story_points: None,
            assignee_id: None,
            sprint_id: None,
            tags: Vec::new(),
        }
    }
}

impl Validate for CreateTaskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_text("title", &self.title, TITLE_MAX)?;
        require_id("project_id", self.project_id)?;
        check_points(self.story_points)?;
        if let Some(sprint_id) = self.sprint_id {
            require_id("sprint_id", sprint_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateTaskRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Validate for UpdateTaskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(title) = &self.title {
            require_text("title", title, TITLE_MAX)?;
        }
        check_points(self.story_points)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
}

impl Validate for TaskFilter {
    fn validate(&self) -> Result<(), ApiError> {
        for (field, id) in [
            ("project_id", self.project_id),
            ("sprint_id", self.sprint_id),
            ("assignee_id", self.assignee_id),
        ] {
            if let Some(id) = id {
                require_id(field, id)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusUpdateRequest {
    status: TaskStatus,
}

#[derive(Clone)]
pub struct TasksApi {
    http: HttpClient,
}

impl TasksApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// `PATCH /tasks/{id}/status`; returns the server's task.
    pub async fn update_status(&self, id: i64, status: TaskStatus) -> Result<Task, ApiError> {
        require_id("id", id)?;
        let response: Envelope<TaskResource> = self
            .http
            .patch(
                &format!("{}/{}/status", Self::PATH, id),
                &StatusUpdateRequest { status },
            )
            .await?;
        response.into_inner().try_into()
    }
}

impl CrudApi for TasksApi {
    type Entity = Task;
    type Wire = TaskResource;
    type Filter = TaskFilter;
    type Create = CreateTaskRequest;
    type Update = UpdateTaskRequest;

    const PATH: &'static str = "tasks";

    fn client(&self) -> &HttpClient {
        &self.http
    }
}
