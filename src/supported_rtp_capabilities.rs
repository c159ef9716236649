//! Codecs and header extensions the media worker can handle.
//!
//! Router RTP capabilities are always a subset of this table, see
//! [`generate_router_rtp_capabilities`](crate::ortc::generate_router_rtp_capabilities).

use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCapabilities,
    RtpCodecCapability,
    RtpCodecParametersParameters, RtpHeaderExtension, RtpHeaderExtensionDirection,
    RtpHeaderExtensionUri,
};
use std::num::{NonZeroU32, NonZeroU8};

const VIDEO_FEEDBACK: [RtcpFeedback; 5] = [
    RtcpFeedback::Nack,
    RtcpFeedback::NackPli,
    RtcpFeedback::CcmFir,
    RtcpFeedback::GoogRemb,
    RtcpFeedback::TransportCc,
];

fn audio(
    mime_type: MimeTypeAudio,
    preferred_payload_type: Option<u8>,
    clock_rate: u32,
    channels: u8,
    rtcp_feedback: &[RtcpFeedback],
) -> RtpCodecCapability {
    RtpCodecCapability {
        kind: MediaKind::Audio,
        mime_type: MimeType::Audio(mime_type),
        preferred_payload_type,
        clock_rate: NonZeroU32::new(clock_rate).unwrap_or(NonZeroU32::MIN),
        channels: NonZeroU8::new(channels),
        parameters: RtpCodecParametersParameters::default(),
        rtcp_feedback: rtcp_feedback.to_vec(),
    }
}

fn video(
    mime_type: MimeTypeVideo,
    parameters: RtpCodecParametersParameters,
) -> RtpCodecCapability {
    RtpCodecCapability {
        kind: MediaKind::Video,
        mime_type: MimeType::Video(mime_type),
        preferred_payload_type: None,
        clock_rate: NonZeroU32::new(90000).unwrap_or(NonZeroU32::MIN),
        channels: None,
        parameters,
        rtcp_feedback: VIDEO_FEEDBACK.to_vec(),
    }
}

fn header_extension(
    kind: MediaKind,
    uri: RtpHeaderExtensionUri,
    preferred_id: u16,
    direction: RtpHeaderExtensionDirection,
) -> RtpHeaderExtension {
    RtpHeaderExtension {
        kind,
        uri,
        preferred_id,
        preferred_encrypt: false,
        direction,
    }
}

/// Full table of supported codecs and header extensions.
#[must_use]
pub fn get_supported_rtp_capabilities() -> RtpCapabilities {
    use MediaKind::{Audio, Video};
    use MimeTypeAudio as A;
    use RtpHeaderExtensionDirection::{RecvOnly, SendRecv};
    use RtpHeaderExtensionUri as Uri;

    let transport_cc = &[RtcpFeedback::TransportCc];

    let mut codecs = vec![
        audio(A::Opus, None, 48000, 2, transport_cc),
        audio(A::MultiChannelOpus, None, 48000, 4, transport_cc),
        audio(A::MultiChannelOpus, None, 48000, 6, transport_cc),
        audio(A::MultiChannelOpus, None, 48000, 8, transport_cc),
        audio(A::Pcmu, Some(0), 8000, 1, transport_cc),
        audio(A::Pcma, Some(8), 8000, 1, transport_cc),
        audio(A::Isac, None, 32000, 1, transport_cc),
        audio(A::Isac, None, 16000, 1, transport_cc),
        audio(A::G722, Some(9), 8000, 1, transport_cc),
        audio(A::Ilbc, None, 8000, 1, transport_cc),
        audio(A::Silk, None, 24000, 1, transport_cc),
        audio(A::Silk, None, 16000, 1, transport_cc),
        audio(A::Silk, None, 12000, 1, transport_cc),
        audio(A::Silk, None, 8000, 1, transport_cc),
        audio(A::Cn, Some(13), 32000, 1, &[]),
        audio(A::Cn, Some(13), 16000, 1, &[]),
        audio(A::Cn, Some(13), 8000, 1, &[]),
        audio(A::TelephoneEvent, None, 48000, 1, &[]),
        audio(A::TelephoneEvent, None, 32000, 1, &[]),
        audio(A::TelephoneEvent, None, 16000, 1, &[]),
        audio(A::TelephoneEvent, None, 8000, 1, &[]),
    ];

    codecs.extend([
        video(MimeTypeVideo::Vp8, RtpCodecParametersParameters::default()),
        video(MimeTypeVideo::Vp9, RtpCodecParametersParameters::default()),
        video(
            MimeTypeVideo::H264,
            RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32),
                ("level-asymmetry-allowed", 1_u32),
            ]),
        ),
        video(
            MimeTypeVideo::H264,
            RtpCodecParametersParameters::from([
                ("packetization-mode", 0_u32),
                ("level-asymmetry-allowed", 1_u32),
            ]),
        ),
        video(
            MimeTypeVideo::H265,
            RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32),
                ("level-asymmetry-allowed", 1_u32),
            ]),
        ),
        video(
            MimeTypeVideo::H265,
            RtpCodecParametersParameters::from([
                ("packetization-mode", 0_u32),
                ("level-asymmetry-allowed", 1_u32),
            ]),
        ),
    ]);

    let header_extensions = vec![
        header_extension(Audio, Uri::Mid, 1, SendRecv),
        header_extension(Video, Uri::Mid, 1, SendRecv),
        header_extension(Video, Uri::RtpStreamId, 2, RecvOnly),
        header_extension(Video, Uri::RepairRtpStreamId, 3, RecvOnly),
        header_extension(Audio, Uri::AbsSendTime, 4, SendRecv),
        header_extension(Video, Uri::AbsSendTime, 4, SendRecv),
        header_extension(Audio, Uri::TransportWideCcDraft01, 5, RecvOnly),
        header_extension(Video, Uri::TransportWideCcDraft01, 5, SendRecv),
        header_extension(Video, Uri::FrameMarkingDraft07, 6, SendRecv),
        header_extension(Video, Uri::FrameMarking, 7, SendRecv),
        header_extension(Audio, Uri::AudioLevel, 10, SendRecv),
        header_extension(Video, Uri::VideoOrientation, 11, SendRecv),
        header_extension(Video, Uri::TimeOffset, 12, SendRecv),
    ];

    RtpCapabilities {
        codecs,
        header_extensions,
    }
}
