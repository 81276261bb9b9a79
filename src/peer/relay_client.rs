use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Result, SignalError};
use crate::session::{CandidatePayload, SessionStatus, SignalMessage};

/// HTTP client for the relay boundary. One instance per (relay, session)
/// pair; the drivers on both roles share this as their only transport.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SignalsResponse {
    signals: Vec<SignalMessage>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: SessionStatus,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn start_session(&self) -> Result<()> {
        let response = self.http.post(self.url("start")).send().await?;
        self.check_status(response).await?;
        Ok(())
    }

    /// Fire-and-forget safe: ending an unknown or already-ended session
    /// succeeds on the relay side.
    pub async fn end_session(&self) -> Result<()> {
        let response = self.http.post(self.url("end")).send().await?;
        self.check_status(response).await?;
        Ok(())
    }

    /// Lifecycle probe. `None` means the session was never started.
    pub async fn session_status(&self) -> Result<Option<SessionStatus>> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check_status(response).await?;
        let body: SessionResponse = response.json().await?;
        Ok(Some(body.status))
    }

    /// Starts the session only when it is not already active, so a second
    /// role joining does not wipe the first role's in-flight backlog.
    pub async fn ensure_started(&self) -> Result<()> {
        match self.session_status().await? {
            Some(SessionStatus::Active) => Ok(()),
            _ => self.start_session().await,
        }
    }

    pub async fn send_offer(&self, sdp: &str) -> Result<()> {
        self.post_json("offer", &serde_json::json!({ "sdp": sdp }))
            .await
    }

    pub async fn send_answer(&self, sdp: &str) -> Result<()> {
        self.post_json("answer", &serde_json::json!({ "sdp": sdp }))
            .await
    }

    pub async fn send_candidate(&self, candidate: &CandidatePayload) -> Result<()> {
        self.post_json("candidate", candidate).await
    }

    pub async fn fetch_signals(&self, since: u64) -> Result<Vec<SignalMessage>> {
        let url = format!("{}?since={}", self.url("signals"), since);
        let response = self.http.get(url).send().await?;
        let response = self.check_status(response).await?;
        let body: SignalsResponse = response.json().await?;
        Ok(body.signals)
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, tail)
    }

    async fn post_json<T: serde::Serialize>(&self, tail: &str, body: &T) -> Result<()> {
        let response = self.http.post(self.url(tail)).json(body).send().await?;
        self.check_status(response).await?;
        Ok(())
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::CONFLICT => Err(SignalError::SessionNotActive(self.session_id.clone())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SignalError::RelayStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = RelayClient::new("http://127.0.0.1:8080/", "invite-1");
        assert_eq!(
            client.url("signals"),
            "http://127.0.0.1:8080/session/invite-1/signals"
        );
    }
}
