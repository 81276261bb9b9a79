use std::sync::Arc;

use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::{Result, SignalError};

/// Which local devices the applicant side publishes.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub video: bool,
    pub audio: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Local camera and microphone tracks for the offerer's peer connection.
/// Frames are fed by the capture pipeline outside this subsystem; the
/// driver only needs the tracks to negotiate the media sections.
#[derive(Debug)]
pub struct MediaCapture {
    pub video: Option<Arc<TrackLocalStaticSample>>,
    pub audio: Option<Arc<TrackLocalStaticSample>>,
}

impl MediaCapture {
    /// Acquires local capture. Failure here is a capability error, terminal
    /// for the current attempt and never retried automatically — it must not
    /// be conflated with relay or session failures.
    pub fn acquire(config: &CaptureConfig) -> Result<Self> {
        if !config.video && !config.audio {
            return Err(SignalError::capture("no capture devices enabled"));
        }

        let video = config.video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                "applicant-capture".to_owned(),
            ))
        });

        let audio = config.audio.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                "applicant-capture".to_owned(),
            ))
        });

        Ok(Self { video, audio })
    }

    pub fn tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_default_has_both_tracks() {
        let capture = MediaCapture::acquire(&CaptureConfig::default()).unwrap();
        assert_eq!(capture.tracks().len(), 2);
    }

    #[test]
    fn test_acquire_video_only() {
        let capture = MediaCapture::acquire(&CaptureConfig {
            video: true,
            audio: false,
        })
        .unwrap();
        assert!(capture.video.is_some());
        assert!(capture.audio.is_none());
    }

    #[test]
    fn test_acquire_nothing_is_a_capability_error() {
        let err = MediaCapture::acquire(&CaptureConfig {
            video: false,
            audio: false,
        })
        .unwrap_err();
        assert!(matches!(err, SignalError::CaptureUnavailable(_)));
    }
}
