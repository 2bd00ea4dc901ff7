use clap::{Parser, Subcommand};
use taskify_shared::domain::AccountStatus;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/taskify.db)
  PORT        (default: 5151 or config.listen_port)
  RUST_LOG    (default: info)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "taskify-server",
    version,
    about = "Taskify server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending database migrations and exit
    Migrate,
    /// Delete used, invalidated and expired email verification tokens, then exit
    SweepTokens,
    /// Set a parent's account status (active, locked or suspended) and exit
    SetStatus {
        parent_id: String,
        status: AccountStatus,
    },
}
