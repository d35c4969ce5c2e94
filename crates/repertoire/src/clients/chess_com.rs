use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use super::build_client;
use crate::error::{RepertoireError, Result};

const BASE_URL: &str = "https://api.chess.com/pub/player";

pub struct ChessComClient {
    client: Client,
}

impl ChessComClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(30))?,
        })
    }

    /// Monthly archive URLs for a player, oldest first as the API lists them.
    pub async fn fetch_archives(&self, username: &str) -> Result<Vec<String>> {
        let url = format!("{BASE_URL}/{}/games/archives", username.to_lowercase());
        let data = self.get_json(&url, "Archives").await?;

        Ok(data["archives"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Raw JSON of one monthly archive (`{"games": [...]}`).
    pub async fn fetch_month(&self, archive_url: &str) -> Result<Value> {
        self.get_json(archive_url, "Archive").await
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<Value> {
        // Rate limit
        tokio::time::sleep(Duration::from_millis(100)).await;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RepertoireError::Http(format!("{what} request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(RepertoireError::Http(format!("{what} HTTP {}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| RepertoireError::Http(format!("{what} JSON parse error: {e}")))
    }
}
