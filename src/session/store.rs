use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, SignalError};

use super::signal::{SignalKind, SignalMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// Snapshot of a session's lifecycle state for status probes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at_unix: u64,
}

#[derive(Debug)]
struct SessionEntry {
    status: SessionStatus,
    created_at: SystemTime,
    last_activity: Instant,
    next_sequence: u64,
    signals: Vec<SignalMessage>,
}

impl SessionEntry {
    fn fresh() -> Self {
        Self {
            status: SessionStatus::Active,
            created_at: SystemTime::now(),
            last_activity: Instant::now(),
            next_sequence: 0,
            signals: Vec::new(),
        }
    }
}

/// Single source of truth for session existence, lifecycle status, and the
/// per-session signal log. Injected into request handlers as an `Arc`;
/// entries for ended sessions are kept so "started then ended" stays
/// distinguishable from "never started".
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Starts (or restarts) a session. Idempotent: restarting an already
    /// active session replaces its backlog rather than accumulating across
    /// repeated start clicks, and resets the sequence counter so a fresh
    /// driver pair always begins from cursor zero.
    pub async fn start_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), SessionEntry::fresh());
        tracing::info!(session_id = %session_id, "Session started");
    }

    /// Ends a session and purges its backlog. No-op when the session does
    /// not exist: explicit stop, unmount cleanup, and the page-unload beacon
    /// may all race into this path.
    pub async fn end_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.status = SessionStatus::Ended;
            entry.signals.clear();
            entry.last_activity = Instant::now();
            tracing::info!(session_id = %session_id, "Session ended");
        }
    }

    /// Appends a signal and returns its assigned sequence. Sequence
    /// assignment happens under the write lock, so two concurrent appends
    /// can never share a number. Never creates a session as a side effect.
    pub async fn append_signal(
        &self,
        session_id: &str,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SignalError::SessionNotActive(session_id.to_string()))?;

        if entry.status != SessionStatus::Active {
            return Err(SignalError::SessionNotActive(session_id.to_string()));
        }

        entry.next_sequence += 1;
        let sequence = entry.next_sequence;
        entry.signals.push(SignalMessage {
            session_id: session_id.to_string(),
            kind,
            payload,
            sequence,
        });
        entry.last_activity = Instant::now();

        tracing::debug!(
            session_id = %session_id,
            kind = ?kind,
            sequence = sequence,
            "Signal appended"
        );
        Ok(sequence)
    }

    /// Returns all signals with `sequence > since_sequence` in insertion
    /// order. A started-but-empty session yields an empty vec; only a
    /// never-started session is an error.
    pub async fn read_signals(
        &self,
        session_id: &str,
        since_sequence: u64,
    ) -> Result<Vec<SignalMessage>> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| SignalError::SessionNotActive(session_id.to_string()))?;

        Ok(entry
            .signals
            .iter()
            .filter(|message| message.sequence > since_sequence)
            .cloned()
            .collect())
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|entry| SessionInfo {
            session_id: session_id.to_string(),
            status: entry.status,
            created_at_unix: entry
                .created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        })
    }

    pub async fn active_sessions(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|entry| entry.status == SessionStatus::Active)
            .count()
    }

    /// Ends every active session idle longer than `ttl` and returns the
    /// reclaimed ids. Orphaned sessions are expected: the unload beacon is
    /// best-effort and a closed tab never confirms delivery.
    pub async fn sweep_idle(&self, ttl: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let mut reclaimed = Vec::new();

        for (session_id, entry) in sessions.iter_mut() {
            if entry.status == SessionStatus::Active
                && now.duration_since(entry.last_activity) >= ttl
            {
                entry.status = SessionStatus::Ended;
                entry.signals.clear();
                reclaimed.push(session_id.clone());
            }
        }

        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdp_payload(text: &str) -> serde_json::Value {
        serde_json::Value::String(text.to_string())
    }

    #[tokio::test]
    async fn test_start_session() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        let info = store.session_info("invite-1").await.unwrap();
        assert_eq!(info.status, SessionStatus::Active);
        assert_eq!(store.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_append_and_read_in_order() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        let s1 = store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("offer-sdp"))
            .await
            .unwrap();
        let s2 = store
            .append_signal("invite-1", SignalKind::Answer, sdp_payload("answer-sdp"))
            .await
            .unwrap();
        assert_eq!((s1, s2), (1, 2));

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].kind, SignalKind::Offer);
        assert_eq!(signals[1].kind, SignalKind::Answer);
    }

    #[tokio::test]
    async fn test_read_window_excludes_seen() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        for i in 0..5 {
            store
                .append_signal(
                    "invite-1",
                    SignalKind::IceCandidate,
                    sdp_payload(&format!("candidate-{i}")),
                )
                .await
                .unwrap();
        }

        let signals = store.read_signals("invite-1", 3).await.unwrap();
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|m| m.sequence > 3));
        assert_eq!(signals[0].sequence, 4);
        assert_eq!(signals[1].sequence, 5);
    }

    #[tokio::test]
    async fn test_read_started_but_empty_is_ok() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_read_never_started_fails() {
        let store = SessionStore::new();
        let err = store.read_signals("ghost", 0).await.unwrap_err();
        assert!(matches!(err, SignalError::SessionNotActive(_)));
    }

    #[tokio::test]
    async fn test_append_never_started_fails_without_side_effect() {
        let store = SessionStore::new();
        let err = store
            .append_signal("ghost", SignalKind::Offer, sdp_payload("sdp"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::SessionNotActive(_)));

        // The failed append must not have created the session
        assert!(store.session_info("ghost").await.is_none());
        assert!(store.read_signals("ghost", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_append_after_end_fails() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;
        store.end_session("invite-1").await;

        let err = store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("sdp"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::SessionNotActive(_)));
    }

    #[tokio::test]
    async fn test_end_purges_backlog() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;
        store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("sdp"))
            .await
            .unwrap();

        store.end_session("invite-1").await;

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_end_session_twice_is_idempotent() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        store.end_session("invite-1").await;
        store.end_session("invite-1").await;

        let info = store.session_info("invite-1").await.unwrap();
        assert_eq!(info.status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn test_end_unknown_session_is_noop() {
        let store = SessionStore::new();
        store.end_session("ghost").await;
        assert!(store.session_info("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_restart_clears_backlog() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;
        store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("stale-offer"))
            .await
            .unwrap();

        // Second start for an already-active id replaces rather than
        // accumulates
        store.start_session("invite-1").await;

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert!(signals.is_empty());

        let sequence = store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("fresh-offer"))
            .await
            .unwrap();
        assert_eq!(sequence, 1);
    }

    #[tokio::test]
    async fn test_sequences_unique_under_concurrent_appends() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        let mut tasks = Vec::new();
        for role in 0..2 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    store
                        .append_signal(
                            "invite-1",
                            SignalKind::IceCandidate,
                            serde_json::Value::String(format!("role{role}-candidate{i}")),
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert_eq!(signals.len(), 100);

        let mut sequences: Vec<u64> = signals.iter().map(|m| m.sequence).collect();
        let sorted = {
            let mut s = sequences.clone();
            s.sort_unstable();
            s
        };
        // Strictly increasing in insertion order, unique, and gapless
        assert_eq!(sequences, sorted);
        sequences.dedup();
        assert_eq!(sequences.len(), 100);
        assert_eq!(sequences.first(), Some(&1));
        assert_eq!(sequences.last(), Some(&100));
    }

    /// Offerer appends one offer; answerer polls, sees it, appends one
    /// answer; offerer's next poll sees exactly the answer at sequence 2.
    #[tokio::test]
    async fn test_offer_answer_round_trip() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        store
            .append_signal("invite-1", SignalKind::Offer, sdp_payload("offer-sdp"))
            .await
            .unwrap();

        let seen = store.read_signals("invite-1", 0).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, SignalKind::Offer);

        store
            .append_signal("invite-1", SignalKind::Answer, sdp_payload("answer-sdp"))
            .await
            .unwrap();

        let new = store.read_signals("invite-1", seen[0].sequence).await.unwrap();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].sequence, 2);
        assert_eq!(new[0].kind, SignalKind::Answer);
    }

    /// Both roles append 3 candidates each interleaved; a fresh poller
    /// receives all 6 in exact insertion order.
    #[tokio::test]
    async fn test_interleaved_candidates_preserve_insertion_order() {
        let store = SessionStore::new();
        store.start_session("invite-1").await;

        let mut expected = Vec::new();
        for i in 0..3 {
            for role in ["applicant", "admin"] {
                let text = format!("{role}-candidate-{i}");
                store
                    .append_signal(
                        "invite-1",
                        SignalKind::IceCandidate,
                        serde_json::Value::String(text.clone()),
                    )
                    .await
                    .unwrap();
                expected.push(text);
            }
        }

        let signals = store.read_signals("invite-1", 0).await.unwrap();
        assert_eq!(signals.len(), 6);
        let order: Vec<&str> = signals.iter().filter_map(|m| m.payload.as_str()).collect();
        assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_sweep_reclaims_idle_sessions() {
        let store = SessionStore::new();
        store.start_session("stale").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.start_session("busy").await;

        let reclaimed = store.sweep_idle(Duration::from_millis(10)).await;
        assert_eq!(reclaimed, vec!["stale".to_string()]);

        assert_eq!(
            store.session_info("stale").await.unwrap().status,
            SessionStatus::Ended
        );
        assert_eq!(
            store.session_info("busy").await.unwrap().status,
            SessionStatus::Active
        );
    }
}
