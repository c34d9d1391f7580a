//! Mission-related CLI commands

use anyhow::Result;
use colored::Colorize;
use edge_lib::mission::MissionState;
use edge_lib::models::MissionReason;
use reqwest::StatusCode;

use crate::client::ApiClient;
use crate::output::{color_as, color_status, print_error, print_json, print_success, print_warning, OutputFormat};

/// Trigger one cleaning mission on the node
pub async fn start(client: &ApiClient, reason: MissionReason, format: OutputFormat) -> Result<()> {
    let (status, response) = client.start_mission(reason).await?;

    if let OutputFormat::Json = format {
        print_json(&response)?;
    } else {
        match status {
            StatusCode::OK => print_success(&format!("Mission completed ({})", reason)),
            StatusCode::CONFLICT => print_warning("Another mission is already in flight"),
            _ => print_error(&format!("{}: {}", response.status, response.message)),
        }

        if let Some(outcome) = &response.outcome {
            println!("Reason:        {}", outcome.reason);
            println!("Status:        {}", color_status(outcome.status.as_str()));
            println!("Phase reached: {}", outcome.phase_reached);
            println!("Duration:      {:.1}s", outcome.duration_ms as f64 / 1000.0);
            if let Some(detail) = &outcome.detail {
                println!("Detail:        {}", detail.dimmed());
            }
        }
    }

    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Mission request failed with {} ({})", response.status, status)
    }
}

/// Show the node's current mission state
pub async fn state(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, state): (_, MissionState) = client.get("mission/state").await?;

    match format {
        OutputFormat::Json => print_json(&state)?,
        OutputFormat::Table => {
            let label = match state {
                MissionState::Idle => "idle".to_string(),
                MissionState::EnteringCommandMode => "entering command mode".to_string(),
                MissionState::TakingOff => "taking off".to_string(),
                MissionState::Cleaning => "cleaning".to_string(),
                MissionState::Landing => "landing".to_string(),
                MissionState::Completed => "completed".to_string(),
                MissionState::Failed(phase) => format!("failed during {}", phase),
            };
            println!(
                "{} {}",
                "Mission state:".bold(),
                color_as(&label, status_key(state))
            );
        }
    }

    Ok(())
}

/// Status string whose coloring a mission state shares
fn status_key(state: MissionState) -> &'static str {
    match state {
        MissionState::Idle => "idle",
        MissionState::Completed => "completed",
        MissionState::Failed(phase) => phase.failure_status().as_str(),
        _ => "in_progress",
    }
}
