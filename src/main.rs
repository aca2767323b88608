use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "sprintboard")]
#[command(version, about = "Project-management client for tasks, sprints and projects")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL. Overrides config.toml and SPRINTBOARD_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the session
    Login {
        /// Account email (prompted when omitted)
        email: Option<String>,
        #[arg(long, env = "SPRINTBOARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// End the session on the server and locally
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Manage projects and their team members
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage sprints
    Sprints {
        #[command(subcommand)]
        command: SprintCommands,
    },
    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Stream realtime updates for a project and/or your notifications
    Watch {
        /// Project whose task and sprint events to follow
        #[arg(short, long)]
        project: Option<i64>,
        /// Also follow your notification channel
        #[arg(long)]
        notifications: bool,
    },
    /// Inspect or clear local storage
    Storage {
        #[command(subcommand)]
        command: StorageCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProjectCommands {
    /// List projects
    List {
        /// active, on_hold, completed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one project
    Show { id: i64 },
    /// Create a project
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(long)]
        status: Option<String>,
        /// easy, medium, hard
        #[arg(long)]
        difficulty: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
    },
    /// Update fields of a project
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
    },
    /// Delete a project
    Delete {
        id: i64,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Add a user to a project's team
    AddMember { project_id: i64, user_id: i64 },
    /// Remove a user from a project's team
    RemoveMember { project_id: i64, user_id: i64 },
}

#[derive(Subcommand, Clone)]
pub enum SprintCommands {
    /// List sprints
    List {
        #[arg(short, long)]
        project: Option<i64>,
        /// planned, active, completed
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one sprint
    Show { id: i64 },
    /// Create a sprint
    Create {
        project_id: i64,
        name: String,
        #[arg(long, default_value = "")]
        goal: String,
        /// YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// YYYY-MM-DD
        #[arg(long)]
        end: String,
        #[arg(long)]
        points: Option<u32>,
    },
    /// Update fields of a sprint
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        completed_points: Option<u32>,
    },
    /// Delete a sprint
    Delete {
        id: i64,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// List tasks
    List {
        #[arg(short, long)]
        project: Option<i64>,
        #[arg(short, long)]
        sprint: Option<i64>,
        /// todo, in_progress, review, done
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assignee: Option<i64>,
    },
    /// Show tasks grouped into board columns
    Board {
        #[arg(short, long)]
        project: Option<i64>,
        #[arg(short, long)]
        sprint: Option<i64>,
    },
    /// Show one task
    Show { id: i64 },
    /// Create a task
    Create {
        project_id: i64,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// low, medium, high, critical
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        points: Option<u32>,
        #[arg(long)]
        assignee: Option<i64>,
        #[arg(long)]
        sprint: Option<i64>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Update fields of a task
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        points: Option<u32>,
        #[arg(long)]
        assignee: Option<i64>,
        #[arg(long)]
        sprint: Option<i64>,
    },
    /// Move a task to another board column
    Status { id: i64, status: String },
    /// Delete a task
    Delete {
        id: i64,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum StorageCommands {
    /// Show where local state lives and which keys are stored
    Show,
    /// Remove every stored key, the session and namespaced cache entries
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the common case.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match &cli.command {
        Commands::Login { email, password } => {
            cmd::cmd_login(&cli, email.clone(), password.clone()).await?
        }
        Commands::Register { name, email } => {
            cmd::cmd_register(&cli, name.clone(), email.clone()).await?
        }
        Commands::Logout => cmd::cmd_logout(&cli).await?,
        Commands::Whoami => cmd::cmd_whoami(&cli).await?,
        Commands::Projects { command } => cmd::cmd_projects(&cli, command.clone()).await?,
        Commands::Sprints { command } => cmd::cmd_sprints(&cli, command.clone()).await?,
        Commands::Tasks { command } => cmd::cmd_tasks(&cli, command.clone()).await?,
        Commands::Watch {
            project,
            notifications,
        } => cmd::cmd_watch(&cli, *project, *notifications).await?,
        Commands::Storage { command } => cmd::cmd_storage(&cli, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
