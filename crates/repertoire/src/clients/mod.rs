pub mod chess_com;
pub mod lichess;

use std::time::Duration;

use reqwest::Client;

use crate::error::{RepertoireError, Result};

const USER_AGENT: &str = "repertoire/1.0";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| RepertoireError::Http(format!("Client build error: {e}")))
}
