//! Node health CLI commands

use anyhow::Result;
use colored::Colorize;
use edge_lib::health::{HealthResponse, ReadinessResponse};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show node health and readiness
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!(
                "{} {}",
                "Node health:".bold(),
                color_status(health.status.as_str())
            );
            match &readiness.reason {
                None => println!("{} {}", "Ready:".bold(), "yes".green()),
                Some(reason) => print_warning(&format!("Not ready: {}", reason)),
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(component.status.as_str()),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(&rows);
        }
    }

    if !health.status.is_operational() {
        anyhow::bail!("Node reports an unhealthy component");
    }
    Ok(())
}
