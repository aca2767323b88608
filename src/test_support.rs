//! In-process mock backend and canned payloads shared by unit tests.

use axum::Router;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// An axum router served on an ephemeral localhost port for the test's lifetime.
pub struct MockBackend {
    addr: std::net::SocketAddr,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { addr, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn user_json(id: i64) -> Value {
    json!({
        "id": id,
        "email": format!("user{}@example.com", id),
        "name": format!("User {}", id),
        "role": "developer"
    })
}

pub fn project_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "",
        "status": "active",
        "sprints_count": 0,
        "team_members": []
    })
}

pub fn task_json(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Task {}", id),
        "description": "",
        "status": status,
        "priority": "medium",
        "story_points": 3,
        "project_id": 1,
        "sprint_id": 1,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-02T10:00:00Z",
        "tags": []
    })
}

pub fn sprint_json(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Sprint {}", id),
        "goal": "",
        "start_date": "2024-05-01",
        "end_date": "2024-05-14",
        "status": status,
        "planned_points": 8,
        "completed_points": 3,
        "project_id": 1,
        "tasks": []
    })
}
