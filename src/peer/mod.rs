pub mod intake;
pub mod media;
pub mod negotiator;
pub mod relay_client;
pub mod supervisor;
pub mod webrtc_utils;

pub use intake::{IntakeEvent, PeerRole, SignalIntake};
pub use media::{CaptureConfig, MediaCapture};
pub use negotiator::{NegotiatorConfig, PeerNegotiator, RemoteTrack};
pub use relay_client::RelayClient;
pub use supervisor::{ConnectionStatus, ConnectionSupervisor};
