use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sprintboard_common::{Sprint, SprintStatus, Task, TaskStatus, dates};

use super::tasks::TaskResource;
use super::{CrudApi, Validate, convert_all, require_id, require_text};
use crate::errors::ApiError;
use crate::http::HttpClient;

const NAME_MAX: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct SprintResource {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(deserialize_with = "dates::required::deserialize")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "dates::required::deserialize")]
    pub end_date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: SprintStatus,
    #[serde(default)]
    pub planned_points: Option<u32>,
    #[serde(default)]
    pub completed_points: Option<u32>,
    pub project_id: i64,
    #[serde(default)]
    pub tasks: Vec<TaskResource>,
}

fn default_status() -> SprintStatus {
    SprintStatus::Planned
}

impl TryFrom<SprintResource> for Sprint {
    type Error = ApiError;

    fn try_from(wire: SprintResource) -> Result<Self, Self::Error> {
        require_id("sprint.id", wire.id)?;
        require_id("sprint.project_id", wire.project_id)?;
        require_text("sprint.name", &wire.name, NAME_MAX)?;
        let tasks: Vec<Task> = convert_all(wire.tasks)?;
        // Older endpoints omit the point totals; derive them from the embedded tasks.
        let planned_points = wire
            .planned_points
            .unwrap_or_else(|| tasks.iter().map(|t| t.story_points).sum());
        let completed_points = wire.completed_points.unwrap_or_else(|| {
            tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Done)
                .map(|t| t.story_points)
                .sum()
        });
        Ok(Sprint {
            id: wire.id,
            name: wire.name,
            goal: wire.goal.unwrap_or_default(),
            start_date: wire.start_date,
            end_date: wire.end_date,
            status: wire.status,
            planned_points,
            completed_points,
            project_id: wire.project_id,
            tasks,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSprintRequest {
    pub name: String,
    pub goal: String,
    pub project_id: i64,
    #[serde(serialize_with = "dates::required::serialize")]
    pub start_date: NaiveDate,
    #[serde(serialize_with = "dates::required::serialize")]
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SprintStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_points: Option<u32>,
}

impl Validate for CreateSprintRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_text("name", &self.name, NAME_MAX)?;
        require_id("project_id", self.project_id)?;
        if self.end_date < self.start_date {
            return Err(ApiError::validation("end_date", "must not be before start_date"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSprintRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "dates::optional::serialize")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SprintStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_points: Option<u32>,
}

impl Validate for UpdateSprintRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            require_text("name", name, NAME_MAX)?;
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && end < start
        {
            return Err(ApiError::validation("end_date", "must not be before start_date"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SprintFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SprintStatus>,
}

impl Validate for SprintFilter {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(id) = self.project_id {
            require_id("project_id", id)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SprintsApi {
    http: HttpClient,
}

impl SprintsApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl CrudApi for SprintsApi {
    type Entity = Sprint;
    type Wire = SprintResource;
    type Filter = SprintFilter;
    type Create = CreateSprintRequest;
    type Update = UpdateSprintRequest;

    const PATH: &'static str = "sprints";

    fn client(&self) -> &HttpClient {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: i64, points: u32, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": format!("task {}", id),
            "status": status,
            "story_points": points,
            "project_id": 1,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_points_derived_from_tasks_when_absent() {
        let wire: SprintResource = serde_json::from_value(json!({
            "id": 1,
            "name": "Sprint 1",
            "start_date": "2024-05-01",
            "end_date": "2024-05-14T00:00:00Z",
            "status": "active",
            "project_id": 1,
            "tasks": [task(1, 3, "done"), task(2, 5, "todo"), task(3, 2, "done")]
        }))
        .unwrap();
        let sprint = Sprint::try_from(wire).unwrap();
        assert_eq!(sprint.planned_points, 10);
        assert_eq!(sprint.completed_points, 5);
        assert_eq!(sprint.tasks.len(), 3);
        assert_eq!(sprint.goal, "");
    }

    #[test]
    fn test_explicit_points_are_kept() {
        let wire: SprintResource = serde_json::from_value(json!({
            "id": 1,
            "name": "Sprint 1",
            "start_date": "2024-05-01",
            "end_date": "2024-05-14",
            "planned_points": 21,
            "completed_points": 0,
            "project_id": 1,
            "tasks": [task(1, 3, "done")]
        }))
        .unwrap();
        let sprint = Sprint::try_from(wire).unwrap();
        assert_eq!(sprint.planned_points, 21);
        assert_eq!(sprint.completed_points, 0);
        assert_eq!(sprint.status, SprintStatus::Planned);
    }

    #[test]
    fn test_invalid_embedded_task_rejects_sprint() {
        let mut bad = task(0, 1, "todo");
        bad["id"] = json!(0);
        let wire: SprintResource = serde_json::from_value(json!({
            "id": 1,
            "name": "Sprint 1",
            "start_date": "2024-05-01",
            "end_date": "2024-05-14",
            "project_id": 1,
            "tasks": [bad]
        }))
        .unwrap();
        assert!(Sprint::try_from(wire).is_err());
    }

    #[test]
    fn test_create_request_rejects_inverted_dates() {
        let req = CreateSprintRequest {
            name: "Sprint 2".into(),
            goal: String::new(),
            project_id: 1,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status: None,
            planned_points: None,
        };
        match req.validate().unwrap_err() {
            ApiError::Validation { field, .. } => assert_eq!(field, "end_date"),
            other => panic!("Expected Validation, got {:?}", other),
        }
    }
}
