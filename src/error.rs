use thiserror::Error;

/// Custom error types for the signaling subsystem
#[derive(Debug, Error)]
pub enum SignalError {
    /// Session-state errors
    #[error("Session {0} is not active")]
    SessionNotActive(String),

    /// Capability errors (camera/microphone unavailable or denied)
    #[error("Media capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// WebRTC related errors
    #[error("Failed to create peer connection: {0}")]
    PeerConnectionCreation(String),

    #[error("Failed to create offer: {0}")]
    CreateOfferFailed(String),

    #[error("Failed to create answer: {0}")]
    CreateAnswerFailed(String),

    #[error("Invalid SDP format: {0}")]
    InvalidSdp(String),

    #[error("Failed to set local description: {0}")]
    SetLocalDescriptionFailed(String),

    #[error("Failed to set remote description: {0}")]
    SetRemoteDescriptionFailed(String),

    #[error("Failed to add ICE candidate: {0}")]
    AddIceCandidateFailed(String),

    #[error("Failed to add track: {0}")]
    AddTrackFailed(String),

    #[error("Negotiation failed for session {0}")]
    NegotiationFailed(String),

    /// Relay transport errors
    #[error("Relay request failed: {0}")]
    RelayRequest(String),

    #[error("Relay returned status {status}: {body}")]
    RelayStatus { status: u16, body: String },

    /// Signaling errors
    #[error("Invalid signal payload: {0}")]
    InvalidSignalPayload(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// WebRTC API errors
    #[error("WebRTC API error: {0}")]
    WebRtcApi(String),

    #[error("Failed to create media engine: {0}")]
    MediaEngineCreation(String),

    #[error("Failed to register codec: {0}")]
    CodecRegistrationFailed(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type alias for Results using SignalError
pub type Result<T> = std::result::Result<T, SignalError>;

impl SignalError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        SignalError::Internal(msg.into())
    }

    /// Helper to create relay transport errors
    pub fn relay(msg: impl Into<String>) -> Self {
        SignalError::RelayRequest(msg.into())
    }

    /// Helper to create capability errors
    pub fn capture(msg: impl Into<String>) -> Self {
        SignalError::CaptureUnavailable(msg.into())
    }
}

/// Convert webrtc::Error to SignalError
impl From<webrtc::Error> for SignalError {
    fn from(err: webrtc::Error) -> Self {
        SignalError::WebRtcApi(err.to_string())
    }
}

/// Convert reqwest::Error to SignalError
impl From<reqwest::Error> for SignalError {
    fn from(err: reqwest::Error) -> Self {
        SignalError::RelayRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SignalError::SessionNotActive("invite-42".to_string());
        assert_eq!(err.to_string(), "Session invite-42 is not active");
    }

    #[test]
    fn test_error_helpers() {
        let err = SignalError::internal("Something went wrong");
        assert!(matches!(err, SignalError::Internal(_)));

        let err = SignalError::capture("camera denied");
        assert!(matches!(err, SignalError::CaptureUnavailable(_)));
    }
}
