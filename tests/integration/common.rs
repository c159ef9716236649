use crate::fake_worker::{FakeWorker, FakeWorkerEnds};
use sfu_control::data_structures::TransportListenIp;
use sfu_control::producer::ProducerOptions;
use sfu_control::router::{Router, RouterOptions};
use sfu_control::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtcpParameters,
    RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpCodecParametersParameters,
    RtpEncodingParameters, RtpParameters,
};
use sfu_control::webrtc_transport::{TransportListenIps, WebRtcTransport, WebRtcTransportOptions};
use sfu_control::worker::{Worker, WorkerConnection, WorkerSettings};
use sfu_control::worker_manager::WorkerManager;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::num::{NonZeroU32, NonZeroU8};
use std::time::Duration;

pub fn init_logging() {
    let mut builder = env_logger::builder();
    if env::var(env_logger::DEFAULT_FILTER_ENV).is_err() {
        builder.filter_level(log::LevelFilter::Off);
    }
    let _ = builder.is_test(true).try_init();
}

pub fn connection(ends: FakeWorkerEnds) -> WorkerConnection {
    WorkerConnection {
        pid: ends.pid,
        sender: ends.sender,
        receiver: ends.receiver,
        exit: ends.exit,
    }
}

pub async fn start_worker(worker_manager: &WorkerManager, pid: u32) -> (FakeWorker, Worker) {
    let (fake_worker, ends) = FakeWorker::spawn(pid);

    let worker = worker_manager
        .create_worker(connection(ends), WorkerSettings::default())
        .await
        .expect("Failed to create worker");

    (fake_worker, worker)
}

pub fn opus() -> RtpCodecCapability {
    RtpCodecCapability::audio(
        MimeTypeAudio::Opus,
        NonZeroU32::new(48000).unwrap(),
        NonZeroU8::new(2).unwrap(),
    )
}

pub fn vp8() -> RtpCodecCapability {
    RtpCodecCapability::video(MimeTypeVideo::Vp8, NonZeroU32::new(90000).unwrap())
}

pub async fn create_router(worker: &Worker, media_codecs: Vec<RtpCodecCapability>) -> Router {
    worker
        .create_router(RouterOptions::new(media_codecs))
        .await
        .expect("Failed to create router")
}

pub async fn create_webrtc_transport(router: &Router, enable_sctp: bool) -> WebRtcTransport {
    router
        .create_webrtc_transport({
            let mut transport_options =
                WebRtcTransportOptions::new(TransportListenIps::new(TransportListenIp {
                    ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    announced_ip: None,
                }));
            transport_options.enable_sctp = enable_sctp;
            transport_options
        })
        .await
        .expect("Failed to create transport")
}

pub fn audio_producer_options(mime_type: MimeTypeAudio, payload_type: u8) -> ProducerOptions {
    ProducerOptions::new(
        MediaKind::Audio,
        RtpParameters {
            mid: Some("AUDIO".to_string()),
            codecs: vec![RtpCodecParameters {
                mime_type: MimeType::Audio(mime_type),
                payload_type,
                clock_rate: NonZeroU32::new(48000).unwrap(),
                channels: NonZeroU8::new(2),
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![],
            }],
            encodings: vec![RtpEncodingParameters {
                ssrc: Some(11111111),
                ..RtpEncodingParameters::default()
            }],
            rtcp: RtcpParameters {
                cname: Some("audio-1".to_string()),
                ..RtcpParameters::default()
            },
            ..RtpParameters::default()
        },
    )
}

pub fn video_producer_options() -> ProducerOptions {
    ProducerOptions::new(
        MediaKind::Video,
        RtpParameters {
            mid: Some("VIDEO".to_string()),
            codecs: vec![RtpCodecParameters {
                mime_type: MimeType::Video(MimeTypeVideo::Vp8),
                payload_type: 96,
                clock_rate: NonZeroU32::new(90000).unwrap(),
                channels: None,
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![RtcpFeedback::Nack, RtcpFeedback::NackPli],
            }],
            encodings: vec![RtpEncodingParameters {
                ssrc: Some(22222222),
                ..RtpEncodingParameters::default()
            }],
            rtcp: RtcpParameters {
                cname: Some("video-1".to_string()),
                ..RtcpParameters::default()
            },
            ..RtpParameters::default()
        },
    )
}

/// Capabilities of a receiving endpoint that supports everything the router offers.
pub fn device_capabilities(router: &Router) -> RtpCapabilities {
    RtpCapabilities::from(router.rtp_capabilities().clone())
}

pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        async_io::Timer::after(Duration::from_millis(5)).await;
    }
    panic!("Condition not met in time");
}
