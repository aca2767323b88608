//! Task commands: `sprintboard tasks ...`.

use anyhow::{Context, Result};
use sprintboard::api::tasks::{CreateTaskRequest, TaskFilter, UpdateTaskRequest};
use sprintboard::models::{Priority, Task, TaskStatus};

use super::super::TaskCommands;
use super::{confirm, open_context, parse_choice, parse_opt, require_user, spinner};
use crate::Cli;

fn styled_priority(priority: Priority) -> String {
    match priority {
        Priority::Critical => console::style(priority).red().bold().to_string(),
        Priority::High => console::style(priority).yellow().to_string(),
        _ => console::style(priority).dim().to_string(),
    }
}

fn print_task_row(task: &Task) {
    let assignee = task
        .assignee_id
        .map(|id| format!("@{}", id))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  #{:<5} {:<11} {:<8} {:>2} pts  {:<6} {}",
        task.id,
        task.status,
        styled_priority(task.priority),
        task.story_points,
        assignee,
        task.title
    );
}

fn print_task(task: &Task) {
    println!();
    println!("{}", console::style(&task.title).bold().cyan());
    println!("  id:        {}", task.id);
    println!("  project:   {}", task.project_id);
    if let Some(sprint) = task.sprint_id {
        println!("  sprint:    {}", sprint);
    }
    println!("  status:    {}", task.status);
    println!("  priority:  {}", styled_priority(task.priority));
    println!("  points:    {}", task.story_points);
    if let Some(assignee) = task.assignee_id {
        println!("  assignee:  {}", assignee);
    }
    if !task.tags.is_empty() {
        println!("  tags:      {}", task.tags.join(", "));
    }
    println!(
        "  updated:   {}",
        task.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    if !task.description.is_empty() {
        println!();
        println!("{}", task.description);
    }
    println!();
}

pub async fn cmd_tasks(cli: &Cli, command: TaskCommands) -> Result<()> {
    let ctx = open_context(cli)?;
    require_user(&ctx).await?;
    let tasks = &ctx.tasks;

    match command {
        TaskCommands::List {
            project,
            sprint,
            status,
            assignee,
        } => {
            let filter = TaskFilter {
                project_id: project,
                sprint_id: sprint,
                status: parse_opt(status.as_deref())?,
                assignee_id: assignee,
            };
            let spin = spinner("Fetching tasks...");
            let result = tasks.fetch_all(Some(&filter)).await;
            spin.finish_and_clear();
            let list = result.context("Failed to fetch tasks")?;

            if list.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }
            println!();
            for task in &list {
                print_task_row(task);
            }
            println!();
            println!("{} task(s)", list.len());
        }
        TaskCommands::Board { project, sprint } => {
            let filter = TaskFilter {
                project_id: project,
                sprint_id: sprint,
                ..Default::default()
            };
            let spin = spinner("Fetching tasks...");
            let result = tasks.fetch_all(Some(&filter)).await;
            spin.finish_and_clear();
            result.context("Failed to fetch tasks")?;

            let board = tasks.board();
            for status in [
                TaskStatus::Todo,
                TaskStatus::InProgress,
                TaskStatus::Review,
                TaskStatus::Done,
            ] {
                let column = board.get(&status).map(Vec::as_slice).unwrap_or_default();
                let points: u32 = column.iter().map(|t| t.story_points).sum();
                println!();
                println!(
                    "{} ({} task(s), {} pts)",
                    console::style(status.as_str().to_uppercase()).bold(),
                    column.len(),
                    points
                );
                for task in column {
                    println!("  #{:<5} {} {}", task.id, styled_priority(task.priority), task.title);
                }
            }
            println!();
        }
        TaskCommands::Show { id } => {
            let task = tasks
                .fetch_one(id)
                .await
                .with_context(|| format!("Failed to fetch task {}", id))?;
            print_task(&task);
        }
        TaskCommands::Create {
            project_id,
            title,
            description,
            priority,
            points,
            assignee,
            sprint,
            tags,
        } => {
            let mut request = CreateTaskRequest::new(project_id, title);
            request.description = description;
            if let Some(priority) = parse_opt(priority.as_deref())? {
                request.priority = priority;
            }
            request.story_points = points;
            request.assignee_id = assignee;
            request.sprint_id = sprint;
            request.tags = tags;
            let task = tasks
                .create(&request)
                .await
                .context("Failed to create task")?;
            println!("Created task #{} ({})", task.id, task.title);
        }
        TaskCommands::Update {
            id,
            title,
            description,
            priority,
            points,
            assignee,
            sprint,
        } => {
            let patch = UpdateTaskRequest {
                title,
                description,
                priority: parse_opt(priority.as_deref())?,
                story_points: points,
                assignee_id: assignee,
                sprint_id: sprint,
                ..Default::default()
            };
            let task = tasks
                .update(id, &patch)
                .await
                .with_context(|| format!("Failed to update task {}", id))?;
            print_task(&task);
        }
        TaskCommands::Status { id, status } => {
            let status: TaskStatus = parse_choice(&status)?;
            let before = tasks
                .fetch_one(id)
                .await
                .with_context(|| format!("Failed to fetch task {}", id))?;
            tasks
                .update_status(id, status)
                .await
                .with_context(|| format!("Failed to move task {} to {}", id, status))?;
            println!("Task #{}: {} -> {}", id, before.status, status);
        }
        TaskCommands::Delete { id, force } => {
            if !confirm(&format!("Delete task #{}?", id), force) {
                println!("Cancelled.");
                return Ok(());
            }
            tasks
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete task {}", id))?;
            println!("Deleted task #{}", id);
        }
    }

    Ok(())
}
