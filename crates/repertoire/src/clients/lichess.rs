use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use super::build_client;
use crate::error::{RepertoireError, Result};

const BASE_URL: &str = "https://lichess.org/api";

pub struct LichessClient {
    client: Client,
}

impl LichessClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(120))?,
        })
    }

    /// All games of a player as Lichess JSON objects.
    /// `since` is an epoch-millisecond lower bound on game start.
    pub async fn fetch_games(&self, username: &str, since: Option<i64>) -> Result<Vec<Value>> {
        let url = format!("{BASE_URL}/games/user/{username}");

        let mut params = vec![
            ("pgnInJson", "true".to_string()),
            ("opening", "true".to_string()),
        ];
        if let Some(since_ms) = since {
            params.push(("since", since_ms.to_string()));
        }

        // Rate limit
        tokio::time::sleep(Duration::from_secs(1)).await;

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .header("Accept", "application/x-ndjson")
            .send()
            .await
            .map_err(|e| RepertoireError::Http(format!("Request error: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RepertoireError::Http(format!("Lichess user {username} not found")));
        }
        if !resp.status().is_success() {
            return Err(RepertoireError::Http(format!("HTTP {}", resp.status())));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RepertoireError::Http(format!("Body read error: {e}")))?;

        Ok(parse_ndjson(&text))
    }
}

/// One JSON object per non-blank line. Unparsable lines are skipped.
pub fn parse_ndjson(text: &str) -> Vec<Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(game) => Some(game),
            Err(e) => {
                warn!("Failed to parse Lichess game JSON: {e}");
                None
            }
        })
        .collect()
}
