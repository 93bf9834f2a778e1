//! WebRTC media backend
//!
//! Peers are `webrtc` peer connections configured with the default codecs
//! and interceptors. The local audio source is an Opus track that sends
//! silence frames; remote audio is read and discarded, which keeps RTCP
//! flowing so the connection stays healthy.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use dialtone_proto::{IceCandidate, SdpType, SessionDescription};

use crate::backend::{CandidateSink, LocalMedia, MediaBackend, PeerConnection};
use crate::error::{CallError, Result};

/// Opus packet for one 20ms frame of silence
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const OPUS_FRAME: Duration = Duration::from_millis(20);

fn negotiation_error(e: webrtc::Error) -> CallError {
    CallError::Negotiation(e.to_string())
}

fn media_error(e: webrtc::Error) -> CallError {
    CallError::Media(e.to_string())
}

pub struct WebRtcBackend {
    api: API,
    config: RTCConfiguration,
}

impl WebRtcBackend {
    /// Build a backend using the given STUN/TURN server URLs
    pub fn new(ice_servers: &[String]) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(media_error)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(media_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl MediaBackend for WebRtcBackend {
    type Peer = RtcPeer;
    type Media = SilentAudio;

    async fn create_peer(&self, sink: CandidateSink) -> Result<RtcPeer> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.config.clone())
                .await
                .map_err(negotiation_error)?,
        );
        let generation = sink.generation();

        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(generation, "Candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => sink.emit(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => warn!(error = %e, "Failed to serialize local candidate"),
                }
            })
        }));

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!(generation, state = %state, "Peer connection state changed");
            Box::pin(async {})
        }));

        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            Box::pin(async move {
                info!(generation, "Receiving remote audio");
                tokio::spawn(async move {
                    while track.read_rtp().await.is_ok() {}
                });
            })
        }));

        Ok(RtcPeer { pc })
    }

    async fn acquire_audio(&self) -> Result<SilentAudio> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "dialtone".to_owned(),
        ));
        let cancel = CancellationToken::new();

        let writer = Arc::clone(&track);
        let stopped = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(OPUS_FRAME);
            loop {
                tokio::select! {
                    () = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = Sample {
                            data: Bytes::from_static(&OPUS_SILENCE),
                            duration: OPUS_FRAME,
                            ..Default::default()
                        };
                        if let Err(e) = writer.write_sample(&sample).await {
                            debug!(error = %e, "Failed to write audio sample");
                        }
                    }
                }
            }
        });

        Ok(SilentAudio { track, cancel })
    }

    async fn attach(&self, peer: &RtcPeer, media: &SilentAudio) -> Result<()> {
        let sender = peer
            .pc
            .add_track(Arc::clone(&media.track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(media_error)?;

        // Drain RTCP so interceptors keep working
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }
}

pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerConnection for RtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(negotiation_error)?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(negotiation_error)?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(negotiation_error)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(negotiation_error)
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(negotiation_error)
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(negotiation_error)
    }
}

/// Local Opus track fed with silence until stopped
pub struct SilentAudio {
    track: Arc<TrackLocalStaticSample>,
    cancel: CancellationToken,
}

impl LocalMedia for SilentAudio {
    fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SilentAudio {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let sdp = description.sdp;
    match description.sdp_type {
        Some(SdpType::Offer) => RTCSessionDescription::offer(sdp),
        Some(SdpType::Answer) => RTCSessionDescription::answer(sdp),
        Some(SdpType::Pranswer) => RTCSessionDescription::pranswer(sdp),
        Some(SdpType::Rollback) | None => {
            return Err(CallError::Negotiation(
                "session description must be an offer or answer".to_string(),
            ))
        }
    }
    .map_err(negotiation_error)
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(CallError::Negotiation("unspecified SDP type".to_string()))
        }
    };

    Ok(SessionDescription {
        sdp_type: Some(sdp_type),
        sdp: description.sdp,
    })
}
