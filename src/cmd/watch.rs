//! Realtime event stream: `sprintboard watch`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use sprintboard::realtime::sync::{sync_notifications, sync_project};
use sprintboard::realtime::{
    Broadcaster, NOTIFICATION_NEW, SPRINT_UPDATED, Scope, Subscription, TASK_UPDATED, subscribe,
};

use super::{open_context, require_user, spinner};
use crate::Cli;

fn summarize(payload: &Value, key: &str) -> String {
    let body = payload.get(key).unwrap_or(payload);
    let id = match body.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(id) => id.to_string(),
        None => "?".to_string(),
    };
    let label = body
        .get("title")
        .or_else(|| body.get("name"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let status = body.get("status").and_then(Value::as_str);
    match (payload.get("action").and_then(Value::as_str), status) {
        (Some("deleted"), _) => format!("#{} deleted", id),
        (_, Some(status)) => format!("#{} [{}] {}", id, status, label),
        _ => format!("#{} {}", id, label),
    }
}

fn printer(broadcaster: Arc<dyn Broadcaster>, scope: Scope, events: &[&str]) -> Subscription {
    subscribe(broadcaster, scope, events, move |event, payload| {
        let line = match event {
            TASK_UPDATED => summarize(payload, "task"),
            SPRINT_UPDATED => summarize(payload, "sprint"),
            _ => summarize(payload, "notification"),
        };
        println!(
            "{} {} {}",
            console::style(chrono::Local::now().format("%H:%M:%S")).dim(),
            console::style(event).cyan(),
            line
        );
    })
}

pub async fn cmd_watch(cli: &Cli, project: Option<i64>, notifications: bool) -> Result<()> {
    if project.is_none() && !notifications {
        bail!("Nothing to watch. Pass --project <id> and/or --notifications.");
    }
    let ctx = open_context(cli)?;
    let user = require_user(&ctx).await?;

    let spin = spinner("Connecting to realtime service...");
    let result = ctx.connect_realtime().await;
    spin.finish_and_clear();
    let connection = Arc::new(result.context("Failed to connect to realtime service")?);
    let broadcaster: Arc<dyn Broadcaster> = connection.clone();

    let mut subscriptions = Vec::new();
    if let Some(project_id) = project {
        subscriptions.push(sync_project(
            broadcaster.clone(),
            project_id,
            ctx.tasks.clone(),
            ctx.sprints.clone(),
        ));
        subscriptions.push(printer(
            broadcaster.clone(),
            Scope::Project(project_id),
            &[TASK_UPDATED, SPRINT_UPDATED],
        ));
    }
    if notifications {
        subscriptions.push(sync_notifications(
            broadcaster.clone(),
            user.id,
            ctx.notifications.clone(),
        ));
        subscriptions.push(printer(
            broadcaster.clone(),
            Scope::User(user.id),
            &[NOTIFICATION_NEW],
        ));
    }

    let channels: Vec<&str> = subscriptions.iter().map(Subscription::channel).collect();
    println!(
        "Watching {} (socket {}). Press Ctrl-C to stop.",
        channels.join(", "),
        connection.socket_id()
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!(
                "{} notification(s) received, {} unread.",
                ctx.notifications.items().len(),
                ctx.notifications.unread()
            );
        }
        _ = connection.closed() => {
            println!("{}", console::style("Connection closed by server.").yellow());
        }
    }

    drop(subscriptions);
    connection.disconnect().await;
    Ok(())
}
