use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Entities held in a store are matched by server-assigned identifier.
pub trait Identified {
    fn id(&self) -> i64;
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "project_manager", alias = "project-manager")]
    Manager,
    #[serde(alias = "member", alias = "team_member")]
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Developer => "developer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" | "project_manager" | "project-manager" => Ok(Self::Manager),
            "developer" | "member" | "team_member" => Ok(Self::Developer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Identified for User {
    fn id(&self) -> i64 {
        self.id
    }
}

// ── Projects ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    #[serde(alias = "on-hold", alias = "onhold")]
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "on_hold" | "on-hold" | "onhold" => Ok(Self::OnHold),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(format!("Invalid difficulty: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub difficulty: Option<Difficulty>,
    #[serde(default, with = "crate::dates::optional")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "crate::dates::optional")]
    pub end_date: Option<NaiveDate>,
    pub sprint_count: u32,
    pub team_members: Vec<String>,
}

impl Identified for Project {
    fn id(&self) -> i64 {
        self.id
    }
}

// ── Sprints ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SprintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid sprint status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprint {
    pub id: i64,
    pub name: String,
    pub goal: String,
    #[serde(with = "crate::dates::required")]
    pub start_date: NaiveDate,
    #[serde(with = "crate::dates::required")]
    pub end_date: NaiveDate,
    pub status: SprintStatus,
    pub planned_points: u32,
    pub completed_points: u32,
    pub project_id: i64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Sprint {
    /// Share of planned story points already completed, 0.0 when nothing is planned.
    pub fn completion_ratio(&self) -> f64 {
        if self.planned_points == 0 {
            return 0.0;
        }
        f64::from(self.completed_points) / f64::from(self.planned_points)
    }
}

impl Identified for Sprint {
    fn id(&self) -> i64 {
        self.id
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Declaration order is board column order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "to-do", alias = "to_do")]
    Todo,
    #[serde(alias = "in-progress")]
    InProgress,
    #[serde(alias = "in_review", alias = "in-review")]
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" | "to-do" | "to_do" => Ok(Self::Todo),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "review" | "in_review" | "in-review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    #[serde(alias = "urgent")]
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" | "urgent" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub story_points: u32,
    pub assignee_id: Option<i64>,
    pub creator_id: Option<i64>,
    pub sprint_id: Option<i64>,
    pub project_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Identified for Task {
    fn id(&self) -> i64 {
        self.id
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// A push notification delivered on a user's private channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_accepts_backend_spellings() {
        for (raw, expected) in [
            ("\"todo\"", TaskStatus::Todo),
            ("\"to-do\"", TaskStatus::Todo),
            ("\"in-progress\"", TaskStatus::InProgress),
            ("\"in_progress\"", TaskStatus::InProgress),
            ("\"in_review\"", TaskStatus::Review),
            ("\"done\"", TaskStatus::Done),
        ] {
            let status: TaskStatus = serde_json::from_str(raw).unwrap();
            assert_eq!(status, expected, "parsing {}", raw);
        }
    }

    #[test]
    fn test_task_status_serializes_canonically() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(serde_json::to_string(&TaskStatus::Done).unwrap(), "\"done\"");
    }

    #[test]
    fn test_task_status_from_str_matches_as_str() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("blocked".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_project_status_on_hold_variants() {
        let a: ProjectStatus = serde_json::from_str("\"on-hold\"").unwrap();
        let b: ProjectStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(a, ProjectStatus::OnHold);
        assert_eq!(b, ProjectStatus::OnHold);
        assert_eq!("on-hold".parse::<ProjectStatus>().unwrap(), ProjectStatus::OnHold);
    }

    #[test]
    fn test_priority_urgent_alias() {
        let p: Priority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(p, Priority::Critical);
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Critical);
    }

    #[test]
    fn test_role_aliases() {
        let r: Role = serde_json::from_str("\"project_manager\"").unwrap();
        assert_eq!(r, Role::Manager);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_from_str_accepts_every_wire_alias() {
        for (raw, role) in [
            ("project_manager", Role::Manager),
            ("project-manager", Role::Manager),
            ("member", Role::Developer),
            ("team_member", Role::Developer),
        ] {
            assert_eq!(raw.parse::<Role>().unwrap(), role);
            assert_eq!(serde_json::from_value::<Role>(serde_json::json!(raw)).unwrap(), role);
        }
        for raw in ["review", "in_review", "in-review"] {
            assert_eq!(raw.parse::<TaskStatus>().unwrap(), TaskStatus::Review);
            assert_eq!(
                serde_json::from_value::<TaskStatus>(serde_json::json!(raw)).unwrap(),
                TaskStatus::Review
            );
        }
        assert_eq!("onhold".parse::<ProjectStatus>().unwrap(), ProjectStatus::OnHold);
    }

    #[test]
    fn test_difficulty_display_matches_from_str() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(difficulty.to_string().parse::<Difficulty>().unwrap(), difficulty);
        }
        assert_eq!(Difficulty::Hard.to_string(), "hard");
    }

    #[test]
    fn test_sprint_completion_ratio() {
        let mut sprint = Sprint {
            id: 1,
            name: "Sprint 1".into(),
            goal: "Ship login".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
            status: SprintStatus::Active,
            planned_points: 0,
            completed_points: 0,
            project_id: 1,
            tasks: vec![],
        };
        assert_eq!(sprint.completion_ratio(), 0.0);
        sprint.planned_points = 20;
        sprint.completed_points = 5;
        assert!((sprint.completion_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_project_cache_shape_roundtrips_dates() {
        let project = Project {
            id: 3,
            name: "Apollo".into(),
            description: String::new(),
            status: ProjectStatus::OnHold,
            difficulty: Some(Difficulty::Hard),
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            end_date: None,
            sprint_count: 2,
            team_members: vec!["Ada".into()],
        };
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["start_date"], "2024-02-01");
        assert_eq!(json["status"], "on_hold");
        let back: Project = serde_json::from_value(json).unwrap();
        assert_eq!(back, project);
    }
}
