use serde::{Deserialize, Serialize};

/// One unit of negotiation data exchanged between peers through the relay.
///
/// The relay stores the payload as an opaque blob; only the drivers on
/// either side interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub session_id: String,
    pub kind: SignalKind,
    pub payload: serde_json::Value,
    /// Per-session insertion order, assigned by the store. Insertion order
    /// is the only ordering guarantee.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Structured ICE candidate descriptor carried inside an `ice_candidate`
/// signal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl SignalMessage {
    /// SDP text of an offer/answer signal.
    pub fn sdp(&self) -> Option<&str> {
        self.payload.as_str()
    }

    /// Candidate descriptor of an `ice_candidate` signal.
    pub fn candidate(&self) -> Option<CandidatePayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

impl CandidatePayload {
    /// Stable key for exactly-once application guards. Candidates are
    /// deduplicated by content, not by sequence, because the same candidate
    /// can surface in overlapping poll batches.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.candidate,
            self.sdp_mid.as_deref().unwrap_or(""),
            self.sdp_mline_index.map(i64::from).unwrap_or(-1)
        )
    }
}
