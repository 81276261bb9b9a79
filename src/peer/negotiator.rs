use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::error::{Result, SignalError};
use crate::session::CandidatePayload;

use super::intake::{IntakeEvent, PeerRole, SignalIntake};
use super::media::{CaptureConfig, MediaCapture};
use super::relay_client::RelayClient;
use super::supervisor::{ConnectionStatus, ConnectionSupervisor};
use super::webrtc_utils;

/// Driver tuning knobs.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Fixed delay between relay polls. Coarse on purpose: the relay is a
    /// bounded-latency channel, not a real-time one.
    pub poll_interval: Duration,
    pub capture: CaptureConfig,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            capture: CaptureConfig::default(),
        }
    }
}

/// An incoming media track surfaced to the embedding view (the admin's
/// video sink).
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: String,
}

/// The negotiation state machine, instantiated once per peer in one of two
/// roles. Both roles share the relay transport, the intake guards, and the
/// supervisor; only offer/answer direction and media attachment differ.
pub struct PeerNegotiator {
    role: PeerRole,
    relay: RelayClient,
    config: NegotiatorConfig,
    peer_connection: Arc<RTCPeerConnection>,
    intake: Arc<Mutex<SignalIntake>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    terminal_rx: Option<mpsc::UnboundedReceiver<RTCPeerConnectionState>>,
    remote_tracks: Option<mpsc::UnboundedReceiver<RemoteTrack>>,
}

impl PeerNegotiator {
    /// Builds the applicant-side driver: local capture attached, ready to
    /// publish an offer. Capture acquisition runs first and its failure is
    /// surfaced as a capability error before the relay is ever touched.
    pub async fn offerer(relay: RelayClient, config: NegotiatorConfig) -> Result<Self> {
        let capture = MediaCapture::acquire(&config.capture)?;

        let negotiator = Self::build(PeerRole::Offerer, relay, config).await?;
        for track in capture.tracks() {
            negotiator
                .peer_connection
                .add_track(track)
                .await
                .map_err(|e| SignalError::AddTrackFailed(e.to_string()))?;
        }

        Ok(negotiator)
    }

    /// Builds the admin-side driver: receive-only, with incoming tracks
    /// delivered through [`PeerNegotiator::take_remote_tracks`].
    pub async fn answerer(relay: RelayClient, config: NegotiatorConfig) -> Result<Self> {
        let mut negotiator = Self::build(PeerRole::Answerer, relay, config).await?;

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            negotiator
                .peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        let (track_tx, track_rx) = mpsc::unbounded_channel();
        negotiator
            .peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let track_tx = track_tx.clone();
                Box::pin(async move {
                    let remote = RemoteTrack {
                        id: track.id(),
                        kind: track.kind().to_string(),
                    };
                    tracing::info!(
                        track_id = %remote.id,
                        kind = %remote.kind,
                        "Remote track received"
                    );
                    let _ = track_tx.send(remote);
                })
            }));
        negotiator.remote_tracks = Some(track_rx);

        Ok(negotiator)
    }

    async fn build(role: PeerRole, relay: RelayClient, config: NegotiatorConfig) -> Result<Self> {
        let api = webrtc_utils::create_webrtc_api()?;
        let ice = webrtc_utils::IceConfig::default();
        let peer_connection = Arc::new(
            api.new_peer_connection(webrtc_utils::rtc_configuration(&ice))
                .await
                .map_err(|e| SignalError::PeerConnectionCreation(e.to_string()))?,
        );

        let intake = Arc::new(Mutex::new(SignalIntake::new(role)));

        let (supervisor, status_rx, terminal_rx) = ConnectionSupervisor::new();
        supervisor.observe(relay.session_id(), &peer_connection);

        // Local candidates go to the relay one by one as discovery reports
        // them, and into the seen-set so the poll loop skips the echo.
        let candidate_relay = relay.clone();
        let candidate_intake = intake.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let relay = candidate_relay.clone();
            let intake = candidate_intake.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize local ICE candidate");
                        return;
                    }
                };
                let payload = CandidatePayload {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                };

                intake.lock().await.note_local_candidate(&payload);
                if let Err(e) = relay.send_candidate(&payload).await {
                    tracing::warn!(
                        session_id = %relay.session_id(),
                        error = %e,
                        "Failed to push local ICE candidate to relay"
                    );
                }
            })
        }));

        Ok(Self {
            role,
            relay,
            config,
            peer_connection,
            intake,
            status_rx,
            terminal_rx: Some(terminal_rx),
            remote_tracks: None,
        })
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Current user-visible connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch handle for status updates (UI binding).
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Incoming track channel; answerer role only, and only once.
    pub fn take_remote_tracks(&mut self) -> Option<mpsc::UnboundedReceiver<RemoteTrack>> {
        self.remote_tracks.take()
    }

    /// Handle on the native connection, mainly for observing negotiation
    /// progress from the embedding code.
    pub fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        self.peer_connection.clone()
    }

    /// Drives the negotiation until the media path is connected or the
    /// attempt fails. One-shot: a retry is a fresh driver, never an
    /// automatic loop.
    pub async fn run(&mut self) -> Result<ConnectionStatus> {
        let result = self.drive().await;
        if result.is_err() {
            self.shutdown().await;
        }
        result
    }

    async fn drive(&mut self) -> Result<ConnectionStatus> {
        self.relay.ensure_started().await?;

        if self.role == PeerRole::Offerer {
            self.publish_offer().await?;
        }

        self.poll_until_settled().await
    }

    /// Tears down local resources and best-effort notifies the relay. Safe
    /// to call repeatedly: stop actions, unmount cleanup, and unload paths
    /// may all race here.
    pub async fn shutdown(&self) {
        if let Err(e) = self.peer_connection.close().await {
            tracing::warn!(
                session_id = %self.relay.session_id(),
                error = %e,
                "Error closing peer connection"
            );
        }
        if let Err(e) = self.relay.end_session().await {
            // Delivery is not guaranteed from teardown paths; the sweeper
            // (when enabled) reclaims what this misses
            tracing::debug!(
                session_id = %self.relay.session_id(),
                error = %e,
                "End-session notification not delivered"
            );
        }
    }

    async fn publish_offer(&self) -> Result<()> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| SignalError::CreateOfferFailed(e.to_string()))?;
        let sdp = offer.sdp.clone();
        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| SignalError::SetLocalDescriptionFailed(e.to_string()))?;
        self.relay.send_offer(&sdp).await?;

        tracing::info!(session_id = %self.relay.session_id(), "Offer published to relay");
        Ok(())
    }

    async fn poll_until_settled(&mut self) -> Result<ConnectionStatus> {
        let mut status_rx = self.status_rx.clone();
        let mut terminal_rx = self
            .terminal_rx
            .take()
            .ok_or_else(|| SignalError::internal("negotiation driver already ran"))?;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(()) => {}
                        Err(e @ SignalError::SessionNotActive(_)) => {
                            // Fatal for this attempt: surface "session
                            // expired / not started" instead of retrying
                            // into a loop
                            return Err(e);
                        }
                        Err(e) => {
                            // Transient relay error; the next tick retries
                            tracing::warn!(
                                session_id = %self.relay.session_id(),
                                error = %e,
                                "Relay poll failed, retrying next tick"
                            );
                        }
                    }
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return Err(SignalError::internal("connection supervisor went away"));
                    }
                    match *status_rx.borrow() {
                        ConnectionStatus::Connected => {
                            tracing::info!(
                                session_id = %self.relay.session_id(),
                                "Media connected, polling stopped"
                            );
                            return Ok(ConnectionStatus::Connected);
                        }
                        ConnectionStatus::Failed => {
                            return Err(SignalError::NegotiationFailed(
                                self.relay.session_id().to_string(),
                            ));
                        }
                        _ => {}
                    }
                }
                Some(state) = terminal_rx.recv() => {
                    tracing::warn!(
                        session_id = %self.relay.session_id(),
                        state = ?state,
                        "Terminal peer connection state"
                    );
                    return Err(SignalError::NegotiationFailed(
                        self.relay.session_id().to_string(),
                    ));
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<()> {
        let since = self.intake.lock().await.cursor();
        let batch = self.relay.fetch_signals(since).await?;
        if batch.is_empty() {
            // No counterpart activity yet: a normal, retryable outcome
            return Ok(());
        }

        let events = self.intake.lock().await.absorb(batch);
        for event in events {
            match event {
                IntakeEvent::RemoteDescription(sdp) => {
                    self.apply_remote_description(sdp).await?;
                }
                IntakeEvent::RemoteCandidate(candidate) => {
                    if let Err(e) = self.apply_candidate(&candidate).await {
                        tracing::error!(
                            session_id = %self.relay.session_id(),
                            error = %e,
                            "Failed to apply counterpart ICE candidate"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn apply_remote_description(&self, sdp: String) -> Result<()> {
        let description = match self.role {
            PeerRole::Offerer => RTCSessionDescription::answer(sdp)
                .map_err(|e| SignalError::InvalidSdp(e.to_string()))?,
            PeerRole::Answerer => RTCSessionDescription::offer(sdp)
                .map_err(|e| SignalError::InvalidSdp(e.to_string()))?,
        };

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| SignalError::SetRemoteDescriptionFailed(e.to_string()))?;
        tracing::info!(
            session_id = %self.relay.session_id(),
            role = ?self.role,
            "Remote description applied"
        );

        // Retry-apply the candidates that beat the description to the log
        let buffered = self.intake.lock().await.mark_remote_ready();
        if !buffered.is_empty() {
            tracing::info!(
                session_id = %self.relay.session_id(),
                count = buffered.len(),
                "Flushing buffered ICE candidates"
            );
        }
        for candidate in buffered {
            if let Err(e) = self.apply_candidate(&candidate).await {
                tracing::error!(
                    session_id = %self.relay.session_id(),
                    error = %e,
                    "Failed to apply buffered ICE candidate"
                );
            }
        }

        if self.role == PeerRole::Answerer {
            let answer = self
                .peer_connection
                .create_answer(None)
                .await
                .map_err(|e| SignalError::CreateAnswerFailed(e.to_string()))?;
            let sdp = answer.sdp.clone();
            self.peer_connection
                .set_local_description(answer)
                .await
                .map_err(|e| SignalError::SetLocalDescriptionFailed(e.to_string()))?;
            self.relay.send_answer(&sdp).await?;

            tracing::info!(session_id = %self.relay.session_id(), "Answer published to relay");
        }

        Ok(())
    }

    async fn apply_candidate(&self, candidate: &CandidatePayload) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| SignalError::AddIceCandidateFailed(e.to_string()))?;
        tracing::debug!(
            session_id = %self.relay.session_id(),
            "Applied counterpart ICE candidate"
        );
        Ok(())
    }
}
