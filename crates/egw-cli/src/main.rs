mod cli;
mod commands;
mod input;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use egw_plugin::{EventGatewayPlugin, package_requirements};

use cli::{Cli, Commands, ConfigCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut declaration = input::load_declaration(&cli.service_file)?;
    if let Some(stage) = &cli.stage {
        declaration.stage = stage.clone();
    }

    match &cli.command {
        Commands::Deploy => {
            let plugin = EventGatewayPlugin::from_declaration(&declaration)?;
            let outputs = input::load_outputs(cli.outputs_file.as_deref())?;
            commands::deploy::deploy(&plugin, &declaration, &outputs).await?;
        }
        Commands::Remove => {
            let plugin = EventGatewayPlugin::from_declaration(&declaration)?;
            commands::deploy::remove(&plugin, &declaration).await?;
        }
        Commands::Package => {
            let requirements = package_requirements(&declaration)?;
            let iam: Vec<_> = requirements
                .iam_statements
                .iter()
                .map(|s| serde_json::json!({"Action": s.action, "Resource": s.resource}))
                .collect();
            let outputs: Vec<_> = requirements
                .output_requests
                .iter()
                .map(|o| serde_json::json!({"Key": o.key, "Value": o.value}))
                .collect();
            let rendered = serde_json::json!({"iamStatements": iam, "outputs": outputs});
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Commands::Dashboard => {
            let plugin = EventGatewayPlugin::from_declaration(&declaration)?;
            commands::dashboard::show(plugin.client()).await?;
        }
        Commands::Emit(args) => {
            let plugin = EventGatewayPlugin::from_declaration(&declaration)?;
            commands::emit::emit(plugin.client(), args).await?;
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => {
                let config = EventGatewayPlugin::from_declaration(&declaration)?
                    .config()
                    .clone();
                println!("{}: {}", "Service".cyan(), config.service);
                println!("{}: {}", "Stage".cyan(), config.stage);
                println!("{}: {}", "Space".cyan(), config.space);
                println!("{}: {}", "Events URL".cyan(), config.events_url);
                println!("{}: {}", "Config URL".cyan(), config.configuration_url);
                println!(
                    "{}: {}",
                    "API key".cyan(),
                    if config.api_key.is_some() { "(set)" } else { "(not set)" }
                );
                for event_type in &config.event_types {
                    match &event_type.authorizer {
                        Some(authorizer) => println!(
                            "{}: {} (authorizer: {authorizer})",
                            "Event type".cyan(),
                            event_type.name
                        ),
                        None => println!("{}: {}", "Event type".cyan(), event_type.name),
                    }
                }
            }
        },
    }

    Ok(())
}
