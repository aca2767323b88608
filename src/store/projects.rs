use sprintboard_common::{Project, ProjectStatus};

use super::ResourceStore;
use crate::api::ProjectsApi;
use crate::errors::ApiError;

pub type ProjectStore = ResourceStore<ProjectsApi>;

impl ResourceStore<ProjectsApi> {
    /// Add a user to the project, then reload the project so its member list is current.
    pub async fn add_team_member(&self, project_id: i64, user_id: i64) -> Result<Project, ApiError> {
        self.api().add_team_member(project_id, user_id).await?;
        self.fetch_one(project_id).await
    }

    pub async fn remove_team_member(&self, project_id: i64, user_id: i64) -> Result<Project, ApiError> {
        self.api().remove_team_member(project_id, user_id).await?;
        self.fetch_one(project_id).await
    }

    pub fn with_status(&self, status: ProjectStatus) -> Vec<Project> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.status == status)
            .collect()
    }
}
