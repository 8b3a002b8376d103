use std::io::Read;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use egw_client::EventGatewayClient;

use crate::cli::EmitArgs;
use crate::output::print_success;

pub async fn emit(client: &EventGatewayClient, args: &EmitArgs) -> Result<()> {
    let data = load_payload(args)?;
    let event = json!({
        "eventType": args.event_type,
        "cloudEventsVersion": "0.1",
        "source": "/egw/cli",
        "contentType": "application/json",
        "data": data
    });
    client.emit(event).await?;
    print_success(&format!("Emitted {}", args.event_type));
    Ok(())
}

fn load_payload(args: &EmitArgs) -> Result<Value> {
    let raw = match (&args.data, &args.file) {
        (Some(_), Some(_)) => bail!("Pass either --data or --file, not both"),
        (Some(data), None) => data.clone(),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read payload file {file}"))?,
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read payload from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}
