//! HTTP client for a realtime broadcast endpoint
//!
//! Events are posted to `{server_url}/realtime/v1/api/broadcast` as
//! `{"messages": [{"topic", "event", "payload"}]}`, authenticated with the
//! configured API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use crate::config::BroadcastConfig;
use crate::error::{Error, Result};
use crate::types::ActivityEvent;

use super::sink::BroadcastSink;

const BROADCAST_PATH: &str = "/realtime/v1/api/broadcast";

/// Sink posting events to a realtime broadcast channel
pub struct RealtimeSink {
    http_client: reqwest::Client,
    base_url: String,
    channel: String,
    event_name: String,
}

impl RealtimeSink {
    /// Create a new sink from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &BroadcastConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .server_url
            .as_deref()
            .ok_or_else(|| Error::Config("broadcast.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("broadcast.api_key is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(api_key)
            .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?;
        headers.insert("apikey", key_value);

        let auth_value = format!("Bearer {}", api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            channel: config.channel.clone(),
            event_name: config.event_name.clone(),
        })
    }

    fn broadcast_url(&self) -> String {
        format!("{}{}", self.base_url, BROADCAST_PATH)
    }
}

#[async_trait]
impl BroadcastSink for RealtimeSink {
    fn name(&self) -> &'static str {
        "realtime"
    }

    /// Any HTTP response from the server counts as reachable.
    async fn connect(&self) -> Result<()> {
        let response = self
            .http_client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| Error::Broadcast(format!("HTTP request failed: {}", e)))?;

        tracing::debug!(status = %response.status(), "Realtime server reachable");
        Ok(())
    }

    async fn publish(&self, event: &ActivityEvent) -> Result<()> {
        let request = BroadcastRequest {
            messages: [BroadcastMessage {
                topic: &self.channel,
                event: &self.event_name,
                payload: event,
            }],
        };

        let response = self
            .http_client
            .post(self.broadcast_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Broadcast(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Broadcast(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

/// Request body for POST /realtime/v1/api/broadcast
#[derive(Serialize)]
struct BroadcastRequest<'a> {
    messages: [BroadcastMessage<'a>; 1],
}

#[derive(Serialize)]
struct BroadcastMessage<'a> {
    topic: &'a str,
    event: &'a str,
    payload: &'a ActivityEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> BroadcastConfig {
        BroadcastConfig {
            enabled: true,
            server_url: Some("https://fleet.example.com/".to_string()),
            api_key: Some("anon-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sink_requires_valid_config() {
        let config = BroadcastConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(RealtimeSink::new(&config).is_err());
    }

    #[test]
    fn test_sink_with_valid_config() {
        let sink = RealtimeSink::new(&ready_config()).unwrap();
        assert_eq!(
            sink.broadcast_url(),
            "https://fleet.example.com/realtime/v1/api/broadcast"
        );
    }

    #[test]
    fn test_rejects_unprintable_api_key() {
        let config = BroadcastConfig {
            api_key: Some("bad\nkey".to_string()),
            ..ready_config()
        };
        assert!(RealtimeSink::new(&config).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let event = ActivityEvent::streamer_online();
        let request = BroadcastRequest {
            messages: [BroadcastMessage {
                topic: "fleet-stream",
                event: "fleet-event",
                payload: &event,
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["topic"], "fleet-stream");
        assert_eq!(json["messages"][0]["event"], "fleet-event");
        assert_eq!(json["messages"][0]["payload"]["type"], "streamer_online");
    }
}
