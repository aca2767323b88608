use sprintboard_common::{Sprint, SprintStatus};

use super::ResourceStore;
use crate::api::SprintsApi;

pub type SprintStore = ResourceStore<SprintsApi>;

impl ResourceStore<SprintsApi> {
    pub fn for_project(&self, project_id: i64) -> Vec<Sprint> {
        let mut sprints: Vec<Sprint> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.project_id == project_id)
            .collect();
        sprints.sort_by_key(|s| s.start_date);
        sprints
    }

    /// The project's running sprint; the earliest one if the backend reports several.
    pub fn active(&self, project_id: i64) -> Option<Sprint> {
        self.for_project(project_id)
            .into_iter()
            .find(|s| s.status == SprintStatus::Active)
    }
}
