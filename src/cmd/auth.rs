//! Session commands: `sprintboard login`, `register`, `logout`, `whoami`.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use sprintboard::api::auth::RegisterRequest;
use sprintboard::models::User;

use super::{open_context, require_user, spinner};
use crate::Cli;

fn print_user(user: &User) {
    println!(
        "{} <{}> ({})",
        console::style(&user.name).bold(),
        user.email,
        user.role
    );
}

pub async fn cmd_login(cli: &Cli, email: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = open_context(cli)?;
    let email = match email {
        Some(email) => email,
        None => Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };
    let password = match password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Password")
            .interact()
            .context("Failed to read password")?,
    };

    let spin = spinner("Logging in...");
    let result = ctx.auth.login(&email, &password).await;
    spin.finish_and_clear();
    let user = result.context("Login failed")?;

    print!("Logged in as ");
    print_user(&user);
    Ok(())
}

pub async fn cmd_register(cli: &Cli, name: Option<String>, email: Option<String>) -> Result<()> {
    let ctx = open_context(cli)?;
    let name = match name {
        Some(name) => name,
        None => Input::<String>::new()
            .with_prompt("Name")
            .interact_text()
            .context("Failed to read name")?,
    };
    let email = match email {
        Some(email) => email,
        None => Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("Failed to read password")?;

    let request = RegisterRequest {
        name,
        email,
        password_confirmation: password.clone(),
        password,
    };
    let spin = spinner("Creating account...");
    let result = ctx.auth.register(&request).await;
    spin.finish_and_clear();
    let user = result.context("Registration failed")?;

    print!("Registered and logged in as ");
    print_user(&user);
    Ok(())
}

pub async fn cmd_logout(cli: &Cli) -> Result<()> {
    let ctx = open_context(cli)?;
    let had_session = ctx.session.token().is_some();
    ctx.auth.logout().await;
    if had_session {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn cmd_whoami(cli: &Cli) -> Result<()> {
    let ctx = open_context(cli)?;
    let user = require_user(&ctx).await?;
    print_user(&user);
    Ok(())
}
