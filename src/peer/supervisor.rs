use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// User-visible connection status derived from the native peer-connection
/// state machine. The raw state never leaves the local process; only this
/// projection (and the teardown it triggers) is observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl From<RTCPeerConnectionState> for ConnectionStatus {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionStatus::Connecting,
            RTCPeerConnectionState::Connected => ConnectionStatus::Connected,
            RTCPeerConnectionState::Failed => ConnectionStatus::Failed,
            RTCPeerConnectionState::New
            | RTCPeerConnectionState::Disconnected
            | RTCPeerConnectionState::Closed
            | RTCPeerConnectionState::Unspecified => ConnectionStatus::Disconnected,
        }
    }
}

/// Observes native peer-connection state transitions, publishes the
/// user-visible status, and reports terminal states so the driver can tear
/// down. It never retries negotiation; retry is an explicit user re-start.
pub struct ConnectionSupervisor {
    status_tx: watch::Sender<ConnectionStatus>,
    terminal_tx: mpsc::UnboundedSender<RTCPeerConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new() -> (
        Self,
        watch::Receiver<ConnectionStatus>,
        mpsc::UnboundedReceiver<RTCPeerConnectionState>,
    ) {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
        (
            Self {
                status_tx,
                terminal_tx,
            },
            status_rx,
            terminal_rx,
        )
    }

    /// Registers the state-change callback on a peer connection.
    pub fn observe(&self, session_id: &str, peer_connection: &Arc<RTCPeerConnection>) {
        let status_tx = self.status_tx.clone();
        let terminal_tx = self.terminal_tx.clone();
        let session_id = session_id.to_string();

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let status = ConnectionStatus::from(state);
                tracing::info!(
                    session_id = %session_id,
                    state = ?state,
                    status = ?status,
                    "Peer connection state changed"
                );

                let _ = status_tx.send(status);
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    let _ = terminal_tx.send(state);
                }

                Box::pin(async {})
            },
        ));
    }
}
