//! Sprint commands: `sprintboard sprints ...`.

use anyhow::{Context, Result};
use sprintboard::api::sprints::{CreateSprintRequest, SprintFilter, UpdateSprintRequest};
use sprintboard::models::{Sprint, SprintStatus};

use super::super::SprintCommands;
use super::{confirm, open_context, parse_day, parse_opt, require_user, spinner};
use crate::Cli;

fn print_sprint_row(sprint: &Sprint) {
    let name = if sprint.status == SprintStatus::Active {
        console::style(&sprint.name).green().bold().to_string()
    } else {
        sprint.name.clone()
    };
    println!(
        "  {:>5}  {:<28}  {:<9}  {} .. {}  {:>3}/{:<3} pts",
        sprint.id,
        name,
        sprint.status,
        sprint.start_date,
        sprint.end_date,
        sprint.completed_points,
        sprint.planned_points
    );
}

fn print_sprint(sprint: &Sprint) {
    println!();
    println!("{}", console::style(&sprint.name).bold().cyan());
    println!("  id:        {}", sprint.id);
    println!("  project:   {}", sprint.project_id);
    println!("  status:    {}", sprint.status);
    println!("  dates:     {} .. {}", sprint.start_date, sprint.end_date);
    println!(
        "  points:    {}/{} ({:.0}%)",
        sprint.completed_points,
        sprint.planned_points,
        sprint.completion_ratio() * 100.0
    );
    if !sprint.goal.is_empty() {
        println!("  goal:      {}", sprint.goal);
    }
    if !sprint.tasks.is_empty() {
        println!();
        for task in &sprint.tasks {
            println!("    #{:<5} [{}] {}", task.id, task.status, task.title);
        }
    }
    println!();
}

pub async fn cmd_sprints(cli: &Cli, command: SprintCommands) -> Result<()> {
    let ctx = open_context(cli)?;
    require_user(&ctx).await?;
    let sprints = &ctx.sprints;

    match command {
        SprintCommands::List { project, status } => {
            let filter = SprintFilter {
                project_id: project,
                status: parse_opt(status.as_deref())?,
            };
            let spin = spinner("Fetching sprints...");
            let result = sprints.fetch_all(Some(&filter)).await;
            spin.finish_and_clear();
            let mut list = result.context("Failed to fetch sprints")?;
            list.sort_by_key(|s| (s.project_id, s.start_date));

            if list.is_empty() {
                println!("No sprints found.");
                return Ok(());
            }
            println!();
            for sprint in &list {
                print_sprint_row(sprint);
            }
            println!();
            println!("{} sprint(s)", list.len());
        }
        SprintCommands::Show { id } => {
            let sprint = sprints
                .fetch_one(id)
                .await
                .with_context(|| format!("Failed to fetch sprint {}", id))?;
            print_sprint(&sprint);
        }
        SprintCommands::Create {
            project_id,
            name,
            goal,
            start,
            end,
            points,
        } => {
            let request = CreateSprintRequest {
                name,
                goal,
                project_id,
                start_date: parse_day(&start)?,
                end_date: parse_day(&end)?,
                status: None,
                planned_points: points,
            };
            let sprint = sprints
                .create(&request)
                .await
                .context("Failed to create sprint")?;
            println!("Created sprint {} ({})", sprint.id, sprint.name);
        }
        SprintCommands::Update {
            id,
            name,
            goal,
            status,
            completed_points,
        } => {
            let patch = UpdateSprintRequest {
                name,
                goal,
                status: parse_opt(status.as_deref())?,
                completed_points,
                ..Default::default()
            };
            let sprint = sprints
                .update(id, &patch)
                .await
                .with_context(|| format!("Failed to update sprint {}", id))?;
            print_sprint(&sprint);
        }
        SprintCommands::Delete { id, force } => {
            if !confirm(&format!("Delete sprint {}?", id), force) {
                println!("Cancelled.");
                return Ok(());
            }
            sprints
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete sprint {}", id))?;
            println!("Deleted sprint {}", id);
        }
    }

    Ok(())
}
