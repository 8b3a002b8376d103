use anyhow::Result;
use colored::Colorize;

use egw_client::EventGatewayClient;

use crate::output::{print_cors, print_functions, print_subscriptions};

/// Print the service's slice of the remote gateway state.
pub async fn show(client: &EventGatewayClient) -> Result<()> {
    let functions = client.list_service_functions().await;
    let subscriptions = client.list_service_subscriptions().await;
    let cors = client.list_service_cors().await;

    println!(
        "{}: {} ({})",
        "Endpoint".cyan(),
        client.events_url(),
        client.space()
    );
    print_functions(&functions);
    print_subscriptions(&subscriptions);
    print_cors(&cors);
    Ok(())
}
