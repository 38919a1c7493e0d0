use super::{ScrobbleClient, ScrobbleError};
use crate::audio::Track;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Submits listens to a ListenBrainz-compatible API with a user token.
pub struct ListenBrainzClient {
    http: Client,
    api_url: String,
    token: String,
}

impl ListenBrainzClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/').to_string();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "scrobble api_url must start with http:// or https://, got \"{api_url}\""
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("deck/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Scrobble(e.to_string()))?;

        Ok(Self {
            http,
            api_url,
            token: token.to_string(),
        })
    }

    async fn submit(&self, body: Value) -> std::result::Result<(), ScrobbleError> {
        let url = format!("{}/1/submit-listens", self.api_url);
        debug!(url = %url, "Submitting listen");

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ScrobbleError::Transient(e.to_string())
                } else {
                    ScrobbleError::Fatal(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(classify_status(status, message))
    }
}

fn classify_status(status: StatusCode, message: String) -> ScrobbleError {
    let text = format!("{} {}", status.as_u16(), message.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ScrobbleError::Transient(text)
    } else {
        ScrobbleError::Fatal(text)
    }
}

/// Body of a `submit-listens` request. `listened_at` is only sent for finished plays.
pub fn listen_payload(track: &Track, listened_at: Option<f64>) -> Value {
    let mut additional_info = json!({
        "media_player": "deck",
        "submission_client": "deck",
        "submission_client_version": env!("CARGO_PKG_VERSION"),
    });
    if let Some(number) = track.tags.track.as_deref() {
        additional_info["tracknumber"] = json!(number);
    }
    if let Some(duration) = track.duration() {
        additional_info["duration_ms"] = json!(duration.as_millis() as u64);
    }

    let mut metadata = json!({
        "artist_name": track.display_artist(),
        "track_name": track.display_title(),
        "additional_info": additional_info,
    });
    if let Some(album) = track.tags.album.as_deref() {
        metadata["release_name"] = json!(album);
    }

    let mut listen = json!({ "track_metadata": metadata });
    let listen_type = match listened_at {
        Some(started) => {
            listen["listened_at"] = json!(started as i64);
            "single"
        }
        None => "playing_now",
    };

    json!({
        "listen_type": listen_type,
        "payload": [listen],
    })
}

#[async_trait]
impl ScrobbleClient for ListenBrainzClient {
    async fn update_now_playing(&self, track: &Track) -> std::result::Result<(), ScrobbleError> {
        self.submit(listen_payload(track, None)).await
    }

    async fn scrobble(&self, track: &Track, started: f64) -> std::result::Result<(), ScrobbleError> {
        self.submit(listen_payload(track, Some(started))).await
    }
}
