use std::collections::HashSet;

use crate::session::{CandidatePayload, SignalKind, SignalMessage};

/// Which half of the negotiation this driver plays. The applicant side
/// offers its capture; the admin side answers and receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Offerer,
    Answerer,
}

impl PeerRole {
    /// The description kind this role consumes from its counterpart.
    fn wants(self) -> SignalKind {
        match self {
            PeerRole::Offerer => SignalKind::Answer,
            PeerRole::Answerer => SignalKind::Offer,
        }
    }
}

/// What the driver must do with a consumed signal.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeEvent {
    /// First unseen counterpart description (offer for the answerer, answer
    /// for the offerer). Emitted at most once per negotiation.
    RemoteDescription(String),
    /// A counterpart candidate that is safe to apply (the remote
    /// description has been set).
    RemoteCandidate(CandidatePayload),
}

/// Poll-consumption state shared by both roles.
///
/// Both peers append into the same per-session log, so a poller reads its
/// own signals back. Descriptions are filtered by kind; candidates are
/// suppressed through the seen-set, which is pre-loaded with every locally
/// generated candidate. Candidates that arrive before the remote
/// description can accept them are buffered and retry-applied after it is
/// set — arrival order is not dependency order.
#[derive(Debug)]
pub struct SignalIntake {
    role: PeerRole,
    cursor: u64,
    description_taken: bool,
    remote_ready: bool,
    seen_candidates: HashSet<String>,
    pending_candidates: Vec<CandidatePayload>,
}

impl SignalIntake {
    pub fn new(role: PeerRole) -> Self {
        Self {
            role,
            cursor: 0,
            description_taken: false,
            remote_ready: false,
            seen_candidates: HashSet::new(),
            pending_candidates: Vec::new(),
        }
    }

    /// Read cursor for the next poll (`since` parameter).
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn has_remote_description(&self) -> bool {
        self.description_taken
    }

    /// Records a locally generated candidate so the poll loop skips its
    /// echo when the shared log hands it back.
    pub fn note_local_candidate(&mut self, candidate: &CandidatePayload) {
        self.seen_candidates.insert(candidate.dedupe_key());
    }

    /// Consumes one poll batch in sequence order. Malformed payloads are
    /// logged and skipped; nothing in the signaling path should take the
    /// negotiation down.
    pub fn absorb(&mut self, batch: Vec<SignalMessage>) -> Vec<IntakeEvent> {
        let mut events = Vec::new();

        for message in batch {
            // Overlapping poll responses can re-deliver earlier sequences
            if message.sequence <= self.cursor {
                continue;
            }
            self.cursor = message.sequence;

            match message.kind {
                kind if kind == self.role.wants() => {
                    if self.description_taken {
                        continue;
                    }
                    let Some(sdp) = message.sdp() else {
                        tracing::warn!(
                            session_id = %message.session_id,
                            sequence = message.sequence,
                            "Description signal without SDP payload, skipping"
                        );
                        continue;
                    };
                    self.description_taken = true;
                    events.push(IntakeEvent::RemoteDescription(sdp.to_owned()));
                }
                SignalKind::IceCandidate => {
                    let Some(candidate) = message.candidate() else {
                        tracing::warn!(
                            session_id = %message.session_id,
                            sequence = message.sequence,
                            "Malformed candidate payload, skipping"
                        );
                        continue;
                    };
                    if !self.seen_candidates.insert(candidate.dedupe_key()) {
                        continue;
                    }
                    if self.remote_ready {
                        events.push(IntakeEvent::RemoteCandidate(candidate));
                    } else {
                        self.pending_candidates.push(candidate);
                    }
                }
                // This role's own description echoed back from the log
                _ => {}
            }
        }

        events
    }

    /// Marks the remote description applied and drains the candidates that
    /// beat it to the log, in arrival order, for retry-application.
    pub fn mark_remote_ready(&mut self) -> Vec<CandidatePayload> {
        self.remote_ready = true;
        std::mem::take(&mut self.pending_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdp(kind: SignalKind, sdp: &str, sequence: u64) -> SignalMessage {
        SignalMessage {
            session_id: "invite-1".to_string(),
            kind,
            payload: serde_json::Value::String(sdp.to_string()),
            sequence,
        }
    }

    fn candidate(name: &str, sequence: u64) -> SignalMessage {
        SignalMessage {
            session_id: "invite-1".to_string(),
            kind: SignalKind::IceCandidate,
            payload: serde_json::to_value(payload(name)).unwrap(),
            sequence,
        }
    }

    fn payload(name: &str) -> CandidatePayload {
        CandidatePayload {
            candidate: format!("candidate:{name}"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn test_offerer_ignores_own_offer_echo() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);
        let events = intake.absorb(vec![sdp(SignalKind::Offer, "my-offer", 1)]);
        assert!(events.is_empty());
        assert_eq!(intake.cursor(), 1);
    }

    #[test]
    fn test_offerer_takes_answer_exactly_once() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);

        let events = intake.absorb(vec![sdp(SignalKind::Answer, "answer-sdp", 2)]);
        assert_eq!(
            events,
            vec![IntakeEvent::RemoteDescription("answer-sdp".to_string())]
        );

        // A duplicate answer in a later batch must not be re-applied
        let events = intake.absorb(vec![sdp(SignalKind::Answer, "answer-sdp", 3)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_answerer_takes_first_offer_and_ignores_answers() {
        let mut intake = SignalIntake::new(PeerRole::Answerer);

        let events = intake.absorb(vec![
            sdp(SignalKind::Offer, "offer-sdp", 1),
            sdp(SignalKind::Answer, "my-own-answer", 2),
        ]);
        assert_eq!(
            events,
            vec![IntakeEvent::RemoteDescription("offer-sdp".to_string())]
        );
    }

    #[test]
    fn test_candidates_buffered_until_remote_ready() {
        let mut intake = SignalIntake::new(PeerRole::Answerer);

        // Candidates beat the offer to the log
        let events = intake.absorb(vec![candidate("early-a", 1), candidate("early-b", 2)]);
        assert!(events.is_empty());

        let events = intake.absorb(vec![sdp(SignalKind::Offer, "offer-sdp", 3)]);
        assert_eq!(events.len(), 1);

        let flushed = intake.mark_remote_ready();
        assert_eq!(flushed, vec![payload("early-a"), payload("early-b")]);

        // Later candidates now pass straight through
        let events = intake.absorb(vec![candidate("late", 4)]);
        assert_eq!(events, vec![IntakeEvent::RemoteCandidate(payload("late"))]);
    }

    #[test]
    fn test_candidates_interleaved_with_description_in_one_batch() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);

        let events = intake.absorb(vec![
            candidate("before", 1),
            sdp(SignalKind::Answer, "answer-sdp", 2),
            candidate("after", 3),
        ]);
        // Only the description surfaces; both candidates wait for the flush
        assert_eq!(
            events,
            vec![IntakeEvent::RemoteDescription("answer-sdp".to_string())]
        );

        let flushed = intake.mark_remote_ready();
        assert_eq!(flushed, vec![payload("before"), payload("after")]);
    }

    #[test]
    fn test_own_candidates_suppressed() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);
        intake.mark_remote_ready();

        intake.note_local_candidate(&payload("mine"));

        let events = intake.absorb(vec![candidate("mine", 1), candidate("theirs", 2)]);
        assert_eq!(events, vec![IntakeEvent::RemoteCandidate(payload("theirs"))]);
    }

    #[test]
    fn test_duplicate_candidates_applied_once() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);
        intake.mark_remote_ready();

        let events = intake.absorb(vec![candidate("dup", 1)]);
        assert_eq!(events.len(), 1);

        let events = intake.absorb(vec![candidate("dup", 2)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_overlapping_batches_not_reprocessed() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);
        intake.mark_remote_ready();

        let events = intake.absorb(vec![candidate("a", 1), candidate("b", 2)]);
        assert_eq!(events.len(), 2);

        // The relay re-delivers the full backlog to a stale cursor
        let events = intake.absorb(vec![
            candidate("a", 1),
            candidate("b", 2),
            candidate("c", 3),
        ]);
        assert_eq!(events, vec![IntakeEvent::RemoteCandidate(payload("c"))]);
        assert_eq!(intake.cursor(), 3);
    }

    #[test]
    fn test_malformed_candidate_skipped() {
        let mut intake = SignalIntake::new(PeerRole::Offerer);
        intake.mark_remote_ready();

        let malformed = SignalMessage {
            session_id: "invite-1".to_string(),
            kind: SignalKind::IceCandidate,
            payload: serde_json::Value::String("not a candidate object".to_string()),
            sequence: 1,
        };
        let events = intake.absorb(vec![malformed, candidate("good", 2)]);
        assert_eq!(events, vec![IntakeEvent::RemoteCandidate(payload("good"))]);
    }
}
