//! API client for communicating with an edge node

use anyhow::{Context, Result};
use edge_lib::models::{MissionOutcome, MissionReason};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the edge node
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            // Missions hold the connection for the whole flight
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// GET a JSON document; error statuses are returned alongside the body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Ask the node to run one cleaning mission
    pub async fn start_mission(
        &self,
        reason: MissionReason,
    ) -> Result<(StatusCode, MissionResponse)> {
        let url = self
            .base_url
            .join("start_mission")
            .context("Invalid path")?;

        let mut request = self
            .client
            .post(url)
            .json(&StartMissionRequest { reason });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<(StatusCode, T)> {
        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        let parsed = serde_json::from_str(&body)
            .with_context(|| format!("Unexpected response ({}): {}", status, body))?;
        Ok((status, parsed))
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMissionRequest {
    pub reason: MissionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MissionOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_lib::health::{ComponentStatus, HealthResponse};
    use mockito::Matcher;

    #[tokio::test]
    async fn test_start_mission_sends_token_and_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/start_mission")
            .match_header("authorization", "Bearer s3cret")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({"reason": "manual"})))
            .with_status(200)
            .with_body(
                r#"{"status":"MISSION_COMPLETE","message":"mission_success","outcome":{
                    "reason":"manual","phase_reached":"landing","status":"mission_success",
                    "duration_ms":12000}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), Some("s3cret".to_string())).unwrap();
        let (status, response) = client.start_mission(MissionReason::Manual).await.unwrap();

        mock.assert_async().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "MISSION_COMPLETE");
        assert_eq!(response.outcome.unwrap().duration_ms, 12000);
    }

    #[tokio::test]
    async fn test_conflict_body_is_returned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/start_mission")
            .with_status(409)
            .with_body(r#"{"status":"MISSION_IN_PROGRESS","message":"busy"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let (status, response) = client.start_mission(MissionReason::Manual).await.unwrap();

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(response.status, "MISSION_IN_PROGRESS");
        assert!(response.outcome.is_none());
    }

    #[tokio::test]
    async fn test_unhealthy_node_still_parses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status":"unhealthy","components":{"sensor":{
                    "status":"unhealthy","message":"bus down","last_check_timestamp":0}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let (status, health): (_, HealthResponse) = client.get("healthz").await.unwrap();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_non_json_response_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let result: Result<(StatusCode, HealthResponse)> = client.get("healthz").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_url() {
        assert!(ApiClient::new("not a url", None).is_err());
    }
}
