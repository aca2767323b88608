//! Project commands: `sprintboard projects ...`.

use anyhow::{Context, Result};
use sprintboard::api::projects::{CreateProjectRequest, ProjectFilter, UpdateProjectRequest};
use sprintboard::models::Project;

use super::super::ProjectCommands;
use super::{confirm, open_context, parse_day, parse_opt, require_user, spinner};
use crate::Cli;

fn print_project_row(project: &Project) {
    println!(
        "  {:>5}  {:<32}  {:<10}  {:>2} sprint(s)  {} member(s)",
        project.id,
        project.name,
        project.status,
        project.sprint_count,
        project.team_members.len()
    );
}

fn print_project(project: &Project) {
    println!();
    println!("{}", console::style(&project.name).bold().cyan());
    println!("  id:          {}", project.id);
    println!("  status:      {}", project.status);
    if let Some(difficulty) = project.difficulty {
        println!("  difficulty:  {}", difficulty.as_str());
    }
    match (project.start_date, project.end_date) {
        (Some(start), Some(end)) => println!("  dates:       {} .. {}", start, end),
        (Some(start), None) => println!("  starts:      {}", start),
        (None, Some(end)) => println!("  ends:        {}", end),
        (None, None) => {}
    }
    println!("  sprints:     {}", project.sprint_count);
    if project.team_members.is_empty() {
        println!("  team:        (none)");
    } else {
        println!("  team:        {}", project.team_members.join(", "));
    }
    if !project.description.is_empty() {
        println!();
        println!("{}", project.description);
    }
    println!();
}

pub async fn cmd_projects(cli: &Cli, command: ProjectCommands) -> Result<()> {
    let ctx = open_context(cli)?;
    require_user(&ctx).await?;
    let projects = &ctx.projects;

    match command {
        ProjectCommands::List { status, search } => {
            let filter = ProjectFilter {
                status: parse_opt(status.as_deref())?,
                search,
            };
            let spin = spinner("Fetching projects...");
            let result = projects.fetch_all(Some(&filter)).await;
            spin.finish_and_clear();
            let list = result.context("Failed to fetch projects")?;

            if list.is_empty() {
                println!("No projects found.");
                return Ok(());
            }
            println!();
            for project in &list {
                print_project_row(project);
            }
            println!();
            println!("{} project(s)", list.len());
        }
        ProjectCommands::Show { id } => {
            let project = projects
                .fetch_one(id)
                .await
                .with_context(|| format!("Failed to fetch project {}", id))?;
            print_project(&project);
        }
        ProjectCommands::Create {
            name,
            description,
            status,
            difficulty,
            start,
            end,
        } => {
            let request = CreateProjectRequest {
                name,
                description,
                status: parse_opt(status.as_deref())?,
                difficulty: parse_opt(difficulty.as_deref())?,
                start_date: start.as_deref().map(parse_day).transpose()?,
                end_date: end.as_deref().map(parse_day).transpose()?,
            };
            let project = projects
                .create(&request)
                .await
                .context("Failed to create project")?;
            println!("Created project {} ({})", project.id, project.name);
        }
        ProjectCommands::Update {
            id,
            name,
            description,
            status,
            difficulty,
        } => {
            let patch = UpdateProjectRequest {
                name,
                description,
                status: parse_opt(status.as_deref())?,
                difficulty: parse_opt(difficulty.as_deref())?,
                ..Default::default()
            };
            let project = projects
                .update(id, &patch)
                .await
                .with_context(|| format!("Failed to update project {}", id))?;
            print_project(&project);
        }
        ProjectCommands::Delete { id, force } => {
            if !confirm(&format!("Delete project {}?", id), force) {
                println!("Cancelled.");
                return Ok(());
            }
            projects
                .delete(id)
                .await
                .with_context(|| format!("Failed to delete project {}", id))?;
            println!("Deleted project {}", id);
        }
        ProjectCommands::AddMember {
            project_id,
            user_id,
        } => {
            let project = projects
                .add_team_member(project_id, user_id)
                .await
                .context("Failed to add team member")?;
            println!(
                "Added user {} to {} ({} member(s))",
                user_id,
                project.name,
                project.team_members.len()
            );
        }
        ProjectCommands::RemoveMember {
            project_id,
            user_id,
        } => {
            let project = projects
                .remove_team_member(project_id, user_id)
                .await
                .context("Failed to remove team member")?;
            println!(
                "Removed user {} from {} ({} member(s))",
                user_id,
                project.name,
                project.team_members.len()
            );
        }
    }

    Ok(())
}
