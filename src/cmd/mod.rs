//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                |
//! |------------|-------------------------------------------------|
//! | `auth`     | `Login`, `Register`, `Logout`, `Whoami`         |
//! | `projects` | `Projects`                                      |
//! | `sprints`  | `Sprints`                                       |
//! | `tasks`    | `Tasks`                                         |
//! | `watch`    | `Watch`                                         |
//! | `storage`  | `Storage`                                       |
//! | `config`   | `Config`                                        |

pub mod auth;
pub mod config;
pub mod projects;
pub mod sprints;
pub mod storage;
pub mod tasks;
pub mod watch;

pub use auth::{cmd_login, cmd_logout, cmd_register, cmd_whoami};
pub use config::cmd_config;
pub use projects::cmd_projects;
pub use sprints::cmd_sprints;
pub use storage::cmd_storage;
pub use tasks::cmd_tasks;
pub use watch::cmd_watch;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use sprintboard::config::ClientConfig;
use sprintboard::context::SessionContext;
use sprintboard::models::User;
use sprintboard::models::dates::parse_date;
use sprintboard::session::AuthStatus;

use crate::Cli;

/// Effective configuration: file and environment, then CLI flags.
pub(crate) fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

pub(crate) fn open_context(cli: &Cli) -> Result<SessionContext> {
    let config = load_config(cli)?;
    SessionContext::init(config).context("Failed to open local storage")
}

/// Run the session bootstrap and return the confirmed user.
pub(crate) async fn require_user(ctx: &SessionContext) -> Result<User> {
    let spin = spinner("Checking session...");
    let status = ctx.bootstrap().await;
    spin.finish_and_clear();
    match (status, ctx.session.user()) {
        (AuthStatus::Authenticated, Some(user)) => Ok(user),
        _ => bail!("Not logged in. Run 'sprintboard login' first."),
    }
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("progress bar template is a valid static string"),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Ask before a destructive action. Non-interactive sessions answer no.
pub(crate) fn confirm(prompt: &str, force: bool) -> bool {
    if force {
        return true;
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

pub(crate) fn parse_choice<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(anyhow::Error::msg)
}

pub(crate) fn parse_opt<T: FromStr<Err = String>>(raw: Option<&str>) -> Result<Option<T>> {
    raw.map(parse_choice).transpose()
}

pub(crate) fn parse_day(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprintboard::models::TaskStatus;

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_choice::<TaskStatus>("in-progress").unwrap(), TaskStatus::InProgress);
        assert!(parse_choice::<TaskStatus>("later").is_err());
        assert_eq!(parse_opt::<TaskStatus>(None).unwrap(), None);
        assert_eq!(
            parse_day("2024-05-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(parse_day("May 1st").is_err());
    }

    #[test]
    fn test_confirm_force_skips_prompt() {
        assert!(confirm("Delete?", true));
    }
}
