//! The HTTP surface: authentication and matchmaking.
//!
//! Matchmaking is a POST to enqueue followed by polling GETs until the
//! server has paired the player; the response carries the UDP endpoint and
//! the RSA public key of the assigned game server.

use std::time::Duration;

use base64::Engine;
use labrys_core::now_millis;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

const MATCH_DEADLINE: Duration = Duration::from_secs(60);
const MATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// HTTP surface errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level HTTP failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Server-provided message, if any
        message: String,
    },

    /// No match was assigned within the deadline
    #[error("matchmaking timed out")]
    MatchTimeout,

    /// The match response carried an undecodable server key
    #[error("malformed server public key: {0}")]
    BadPublicKey(base64::DecodeError),
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// The authenticated player as the API sees it
#[derive(Debug, Deserialize)]
pub struct PlayerProfile {
    /// Player identity, reused on the game plane
    pub id: Uuid,
    /// Display name
    pub username: String,
    /// Matchmaking rating
    pub rating: i32,
    /// Bearer token for matchmaking and the UDP handshake
    #[serde(rename = "auth_token")]
    pub token: String,
}

#[derive(Debug, Serialize)]
struct MatchRequest {
    id: Uuid,
    sent_at: i64,
}

#[derive(Debug, Deserialize)]
struct MatchInfoResponse {
    socket_pubkey: String,
    socket_addr: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// A match assignment
#[derive(Debug)]
pub struct MatchInfo {
    /// RSA public key of the assigned game server, PKCS#1 PEM bytes
    pub server_public_key: Vec<u8>,
    /// UDP endpoint of the assigned game server, host:port
    pub server_addr: String,
}

/// JSON client for the game API
pub struct ApiClient {
    http: reqwest::Client,
    config: Config,
}

impl ApiClient {
    /// Build a client for the configured API
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Create an account
    ///
    /// # Errors
    ///
    /// Propagates HTTP failures and API error statuses.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(&self.config.register_path))
            .json(&AuthRequest { username, password })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Authenticate and fetch the player profile plus bearer token
    ///
    /// # Errors
    ///
    /// Propagates HTTP failures and API error statuses.
    pub async fn login(&self, username: &str, password: &str) -> Result<PlayerProfile, ApiError> {
        let response = self
            .http
            .post(self.url(&self.config.login_path))
            .json(&AuthRequest { username, password })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Enqueue for a match and poll until one is assigned.
    ///
    /// # Errors
    ///
    /// Fails with [`ApiError::MatchTimeout`] if no match is assigned within
    /// a minute; otherwise propagates HTTP and decoding failures.
    pub async fn request_match(&self, player_id: Uuid, token: &str) -> Result<MatchInfo, ApiError> {
        let request = MatchRequest {
            id: player_id,
            sent_at: now_millis(),
        };
        let response = self
            .http
            .post(self.url(&self.config.match_path))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        check(response).await?;

        let info_url = format!("{}/{}", self.url(&self.config.match_path), player_id);
        let deadline = tokio::time::Instant::now() + MATCH_DEADLINE;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ApiError::MatchTimeout);
            }

            let poll = self
                .http
                .get(&info_url)
                .bearer_auth(token)
                .send()
                .await;

            match poll {
                Ok(response) if response.status().is_success() => {
                    let info: MatchInfoResponse = response.json().await?;
                    let server_public_key = base64::engine::general_purpose::STANDARD
                        .decode(&info.socket_pubkey)
                        .map_err(ApiError::BadPublicKey)?;
                    return Ok(MatchInfo {
                        server_public_key,
                        server_addr: info.socket_addr,
                    });
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "match not ready yet");
                    tokio::time::sleep(MATCH_POLL_INTERVAL).await;
                }
                Err(e) => {
                    tracing::debug!("match poll failed: {e}");
                    tokio::time::sleep(MATCH_POLL_INTERVAL).await;
                }
            }
        }
    }
}

/// Map error statuses to [`ApiError::Api`], pulling the server's JSON
/// message out of the body when there is one.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ApiMessage>()
        .await
        .map(|m| m.message)
        .unwrap_or_else(|_| status.to_string());
    Err(ApiError::Api {
        status: status.as_u16(),
        message,
    })
}
