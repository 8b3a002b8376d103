use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "egw")]
#[command(about = "Event Gateway deployment CLI — register functions, subscriptions and event types")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Service declaration file (JSON or TOML)
    #[arg(short, long, global = true, env = "EGW_SERVICE_FILE", default_value = "service.json")]
    pub service_file: String,

    /// Stack outputs file: a JSON map of output name to value
    #[arg(short, long, global = true, env = "EGW_OUTPUTS_FILE")]
    pub outputs_file: Option<String>,

    /// Override the stage declared in the service file
    #[arg(long, global = true, env = "EGW_STAGE")]
    pub stage: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge the remote gateway onto the declared service
    Deploy,
    /// Delete every gateway resource owned by the declared service/stage
    Remove,
    /// Print the IAM statements and stack outputs connector targets require
    Package,
    /// List the functions, subscriptions and CORS rules owned by the service
    Dashboard,
    /// Emit a CloudEvent into the gateway
    Emit(EmitArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct EmitArgs {
    /// Event type to emit (e.g. user.created)
    pub event_type: String,
    /// Inline JSON payload (reads from --file or stdin if omitted)
    #[arg(long)]
    pub data: Option<String>,
    /// Path to a JSON payload file
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the resolved gateway configuration
    Show,
}
