use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sprintboard_common::{Difficulty, Project, ProjectStatus, dates};

use super::{CrudApi, NamedRef, Validate, require_id, require_text};
use crate::errors::ApiError;
use crate::http::HttpClient;

const NAME_MAX: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectResource {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "dates::optional::deserialize")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "dates::optional::deserialize")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub sprints_count: Option<u32>,
    #[serde(default)]
    pub sprints: Option<Vec<Value>>,
    #[serde(default, alias = "team", alias = "members")]
    pub team_members: Vec<NamedRef>,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Active
}

impl TryFrom<ProjectResource> for Project {
    type Error = ApiError;

    fn try_from(wire: ProjectResource) -> Result<Self, Self::Error> {
        require_id("project.id", wire.id)?;
        require_text("project.name", &wire.name, NAME_MAX)?;
        let sprint_count = wire
            .sprints_count
            .or_else(|| wire.sprints.as_ref().map(|s| s.len() as u32))
            .unwrap_or(0);
        Ok(Project {
            id: wire.id,
            name: wire.name,
            description: wire.description.unwrap_or_default(),
            status: wire.status,
            difficulty: wire.difficulty,
            start_date: wire.start_date,
            end_date: wire.end_date,
            sprint_count,
            team_members: wire.team_members.into_iter().map(NamedRef::into_name).collect(),
        })
    }
}

fn check_date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ApiError> {
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(ApiError::validation("end_date", "must not be before start_date"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub end_date: Option<NaiveDate>,
}

impl Validate for CreateProjectRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_text("name", &self.name, NAME_MAX)?;
        check_date_order(self.start_date, self.end_date)
    }
}

/// Partial update; absent fields are left alone by the backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub end_date: Option<NaiveDate>,
}

impl Validate for UpdateProjectRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            require_text("name", name, NAME_MAX)?;
        }
        check_date_order(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Validate for ProjectFilter {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(search) = &self.search
            && search.chars().count() > NAME_MAX
        {
            return Err(ApiError::validation("search", "is too long"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct TeamMemberRequest {
    user_id: i64,
}

#[derive(Clone)]
pub struct ProjectsApi {
    http: HttpClient,
}

impl ProjectsApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn add_team_member(&self, project_id: i64, user_id: i64) -> Result<(), ApiError> {
        require_id("project_id", project_id)?;
        require_id("user_id", user_id)?;
        self.http
            .post_empty(
                &format!("{}/{}/team-members", Self::PATH, project_id),
                &TeamMemberRequest { user_id },
            )
            .await
    }

    pub async fn remove_team_member(&self, project_id: i64, user_id: i64) -> Result<(), ApiError> {
        require_id("project_id", project_id)?;
        require_id("user_id", user_id)?;
        self.http
            .delete(&format!("{}/{}/team-members/{}", Self::PATH, project_id, user_id))
            .await
    }
}

impl CrudApi for ProjectsApi {
    type Entity = Project;
    type Wire = ProjectResource;
    type Filter = ProjectFilter;
    type Create = CreateProjectRequest;
    type Update = UpdateProjectRequest;

    const PATH: &'static str = "projects";

    fn client(&self) -> &HttpClient {
        &self.http
    }
}
