//! RTP capability negotiation.
//!
//! Everything here is a pure function over RTP parameters and capabilities: computing router
//! capabilities from desired codecs, mapping producer parameters into router space and deriving
//! what a given consumer will receive.


use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtcpParameters,
    RtpCapabilities, RtpCapabilitiesFinalized, RtpCodecCapability, RtpCodecCapabilityFinalized,
    RtpCodecParameters, RtpCodecParametersParameters, RtpEncodingParameters,
    RtpEncodingParametersRtx, RtpHeaderExtensionDirection, RtpHeaderExtensionParameters,
    RtpHeaderExtensionUri, RtpParameters,
};
use crate::scalability_modes::ScalabilityMode;
use crate::supported_rtp_capabilities::get_supported_rtp_capabilities;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::num::{NonZeroU32, NonZeroU8};
use thiserror::Error;

/// Dynamic payload types in allocation order.
const DYNAMIC_PAYLOAD_TYPES: [std::ops::RangeInclusive<u8>; 2] = [100..=127, 96..=99];

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMappingCodec {
    pub(crate) payload_type: u8,
    pub(crate) mapped_payload_type: u8,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMappingHeaderExtension {
    pub(crate) id: u16,
    pub(crate) mapped_id: u16,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMappingEncoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ssrc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) scalability_mode: Option<ScalabilityMode>,
    pub(crate) mapped_ssrc: u32,
}

/// How producer payload types, header extension ids and SSRCs translate into router space.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMapping {
    pub(crate) codecs: Vec<RtpMappingCodec>,
    pub(crate) header_extensions: Vec<RtpMappingHeaderExtension>,
    pub(crate) encodings: Vec<RtpMappingEncoding>,
}

/// Malformed RTP parameters or capabilities.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersError {
    #[error("MIME type {mime_type} doesn't belong to {kind:?} media")]
    KindMismatch { kind: MediaKind, mime_type: MimeType },
    #[error("RTX codec with payload type {payload_type} has no valid apt parameter")]
    InvalidAptParameter { payload_type: u8 },
    #[error("duplicated payload type {payload_type}")]
    DuplicatePayloadType { payload_type: u8 },
    #[error("no media codecs")]
    NoMediaCodecs,
    #[error("header extension id {id} used more than once")]
    DuplicateHeaderExtensionId { id: u16 },
    #[error("encoding references unknown codec payload type {payload_type}")]
    UnknownEncodingPayloadType { payload_type: u8 },
}

/// Error that caused [`generate_router_rtp_capabilities`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpCapabilitiesError {
    #[error("media codec not supported [mime_type:{mime_type}]")]
    UnsupportedCodec { mime_type: MimeType },
    #[error("cannot allocate more dynamic codec payload types")]
    CannotAllocate,
    #[error("preferred payload type {preferred_payload_type} is used by more than one codec")]
    DuplicatePreferredPayloadType { preferred_payload_type: u8 },
    #[error("invalid codec: {0}")]
    InvalidCodec(#[from] RtpParametersError),
}

/// Error that caused [`get_producer_rtp_parameters_mapping`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersMappingError {
    #[error("unsupported codec [mime_type:{mime_type}, payload_type:{payload_type}]")]
    UnsupportedCodec { mime_type: MimeType, payload_type: u8 },
    #[error("no RTX codec for capability codec PT {preferred_payload_type}")]
    UnsupportedRtxCodec { preferred_payload_type: u8 },
    #[error("missing media codec found for RTX PT {payload_type}")]
    MissingMediaCodecForRtx { payload_type: u8 },
}

/// Error that caused [`get_consumer_rtp_parameters`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsumerRtpParametersError {
    #[error("no compatible media codecs")]
    NoCompatibleMediaCodecs,
}

/// Validates RTP capabilities of a remote endpoint.
pub(crate) fn validate_rtp_capabilities(
    rtp_capabilities: &RtpCapabilities,
) -> Result<(), RtpParametersError> {
    for codec in &rtp_capabilities.codecs {
        validate_codec_kind(codec.kind, codec.mime_type)?;

        if codec.mime_type.is_rtx() && codec.parameters.get_u32("apt").is_none() {
            return Err(RtpParametersError::InvalidAptParameter {
                payload_type: codec.preferred_payload_type.unwrap_or_default(),
            });
        }
    }

    Ok(())
}

/// Validates RTP parameters sent by an endpoint for a producer of `kind`.
pub(crate) fn validate_rtp_parameters(
    kind: MediaKind,
    rtp_parameters: &RtpParameters,
) -> Result<(), RtpParametersError> {
    let mut payload_types = HashSet::new();

    for codec in &rtp_parameters.codecs {
        validate_codec_kind(kind, codec.mime_type)?;

        if !payload_types.insert(codec.payload_type) {
            return Err(RtpParametersError::DuplicatePayloadType {
                payload_type: codec.payload_type,
            });
        }
    }

    if !rtp_parameters.codecs.iter().any(|codec| !codec.is_rtx()) {
        return Err(RtpParametersError::NoMediaCodecs);
    }

    for codec in rtp_parameters.codecs.iter().filter(|codec| codec.is_rtx()) {
        let valid_apt = codec
            .apt()
            .and_then(|apt| u8::try_from(apt).ok())
            .map_or(false, |apt| payload_types.contains(&apt));

        if !valid_apt {
            return Err(RtpParametersError::InvalidAptParameter {
                payload_type: codec.payload_type,
            });
        }
    }

    let mut ids = HashSet::new();
    for extension in &rtp_parameters.header_extensions {
        if !ids.insert(extension.id) {
            return Err(RtpParametersError::DuplicateHeaderExtensionId { id: extension.id });
        }
    }

    for encoding in &rtp_parameters.encodings {
        if let Some(payload_type) = encoding.codec_payload_type {
            if !payload_types.contains(&payload_type) {
                return Err(RtpParametersError::UnknownEncodingPayloadType { payload_type });
            }
        }
    }

    Ok(())
}

fn validate_codec_kind(kind: MediaKind, mime_type: MimeType) -> Result<(), RtpParametersError> {
    if mime_type.kind() == kind {
        Ok(())
    } else {
        Err(RtpParametersError::KindMismatch { kind, mime_type })
    }
}

/// Generate RTP capabilities for the Router based on the given media codecs and the table of
/// supported ones.
///
/// Explicit `preferred_payload_type`s are honored as long as no two codecs ask for the same one.
/// Everything else gets the first free dynamic payload type from 100-127 and then 96-99, and each
/// video codec is immediately followed by its RTX codec.
pub fn generate_router_rtp_capabilities(
    media_codecs: Vec<RtpCodecCapability>,
) -> Result<RtpCapabilitiesFinalized, RtpCapabilitiesError> {
    let supported_rtp_capabilities = get_supported_rtp_capabilities();

    let mut used_payload_types = HashSet::<u8>::new();
    for media_codec in &media_codecs {
        validate_codec_kind(media_codec.kind, media_codec.mime_type)?;

        if let Some(preferred_payload_type) = media_codec.preferred_payload_type {
            if !used_payload_types.insert(preferred_payload_type) {
                return Err(RtpCapabilitiesError::DuplicatePreferredPayloadType {
                    preferred_payload_type,
                });
            }
        }
    }

    let mut dynamic_payload_types = DYNAMIC_PAYLOAD_TYPES
        .iter()
        .cloned()
        .flatten()
        .filter(|payload_type| !used_payload_types.contains(payload_type))
        .collect::<Vec<u8>>()
        .into_iter();

    let mut codecs = Vec::<RtpCodecCapabilityFinalized>::new();

    for media_codec in media_codecs {
        let matched_supported_codec = supported_rtp_capabilities
            .codecs
            .iter()
            .filter(|supported_codec| !supported_codec.mime_type.is_rtx())
            .find(|supported_codec| {
                match_codecs(
                    CodecToMatch::from(&media_codec),
                    CodecToMatch::from(*supported_codec),
                    false,
                )
            })
            .ok_or(RtpCapabilitiesError::UnsupportedCodec {
                mime_type: media_codec.mime_type,
            })?;

        let preferred_payload_type = match media_codec.preferred_payload_type {
            Some(preferred_payload_type) => preferred_payload_type,
            None => match matched_supported_codec.preferred_payload_type {
                // Static payload type like PCMU's 0, unless another codec already took it.
                Some(preferred_payload_type) if used_payload_types.insert(preferred_payload_type) => {
                    preferred_payload_type
                }
                _ => {
                    let payload_type = dynamic_payload_types
                        .next()
                        .ok_or(RtpCapabilitiesError::CannotAllocate)?;
                    used_payload_types.insert(payload_type);
                    payload_type
                }
            },
        };

        let channels = match matched_supported_codec.kind {
            MediaKind::Audio => Some(
                media_codec
                    .channels
                    .or(matched_supported_codec.channels)
                    .unwrap_or(NonZeroU8::MIN),
            ),
            MediaKind::Video => None,
        };

        let codec = RtpCodecCapabilityFinalized {
            kind: matched_supported_codec.kind,
            mime_type: matched_supported_codec.mime_type,
            preferred_payload_type,
            clock_rate: matched_supported_codec.clock_rate,
            channels,
            parameters: media_codec.parameters,
            rtcp_feedback: matched_supported_codec.rtcp_feedback.clone(),
        };
        let needs_rtx = codec.kind == MediaKind::Video;
        let clock_rate = codec.clock_rate;

        codecs.push(codec);

        if needs_rtx {
            let payload_type = dynamic_payload_types
                .next()
                .ok_or(RtpCapabilitiesError::CannotAllocate)?;
            used_payload_types.insert(payload_type);

            codecs.push(RtpCodecCapabilityFinalized {
                kind: MediaKind::Video,
                mime_type: MimeType::Video(MimeTypeVideo::Rtx),
                preferred_payload_type: payload_type,
                clock_rate,
                channels: None,
                parameters: RtpCodecParametersParameters::from([(
                    "apt",
                    u32::from(preferred_payload_type),
                )]),
                rtcp_feedback: vec![],
            });
        }
    }

    Ok(RtpCapabilitiesFinalized {
        codecs,
        header_extensions: supported_rtp_capabilities.header_extensions,
    })
}

fn random_ssrc() -> u32 {
    rand::thread_rng().gen_range(100_000_000..999_999_999)
}

/// Get a mapping of codec payloads and encodings of the given Producer RTP parameters as values
/// expected by the Router.
///
/// Returns `Err()` if the producer uses any codec the router can't route.
pub(crate) fn get_producer_rtp_parameters_mapping(
    rtp_parameters: &RtpParameters,
    rtp_capabilities: &RtpCapabilitiesFinalized,
) -> Result<RtpMapping, RtpParametersMappingError> {
    // Router codec for every producer codec, in the producer's order.
    let mut matched = vec![None::<&RtpCodecCapabilityFinalized>; rtp_parameters.codecs.len()];

    for (codec, slot) in rtp_parameters.codecs.iter().zip(matched.iter_mut()) {
        if codec.is_rtx() {
            continue;
        }

        let cap_codec = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| {
                match_codecs(
                    CodecToMatch::from(codec),
                    CodecToMatch::from(*cap_codec),
                    true,
                )
            })
            .ok_or(RtpParametersMappingError::UnsupportedCodec {
                mime_type: codec.mime_type,
                payload_type: codec.payload_type,
            })?;

        *slot = Some(cap_codec);
    }

    for index in 0..rtp_parameters.codecs.len() {
        let codec = &rtp_parameters.codecs[index];
        if !codec.is_rtx() {
            continue;
        }

        let media_index = rtp_parameters
            .codecs
            .iter()
            .position(|media_codec| {
                !media_codec.is_rtx() && Some(u32::from(media_codec.payload_type)) == codec.apt()
            })
            .ok_or(RtpParametersMappingError::MissingMediaCodecForRtx {
                payload_type: codec.payload_type,
            })?;

        let cap_media_codec = matched[media_index].ok_or(
            RtpParametersMappingError::MissingMediaCodecForRtx {
                payload_type: codec.payload_type,
            },
        )?;

        let cap_rtx_codec = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| {
                cap_codec.mime_type.is_rtx()
                    && cap_codec.apt() == Some(u32::from(cap_media_codec.preferred_payload_type))
            })
            .ok_or(RtpParametersMappingError::UnsupportedRtxCodec {
                preferred_payload_type: cap_media_codec.preferred_payload_type,
            })?;

        matched[index] = Some(cap_rtx_codec);
    }

    let codecs = rtp_parameters
        .codecs
        .iter()
        .zip(matched)
        .filter_map(|(codec, cap_codec)| {
            cap_codec.map(|cap_codec| RtpMappingCodec {
                payload_type: codec.payload_type,
                mapped_payload_type: cap_codec.preferred_payload_type,
            })
        })
        .collect();

    let kind = rtp_parameters
        .codecs
        .first()
        .map_or(MediaKind::Audio, RtpCodecParameters::kind);

    let header_extensions = rtp_parameters
        .header_extensions
        .iter()
        .filter_map(|extension| {
            rtp_capabilities
                .header_extensions
                .iter()
                .find(|cap_extension| cap_extension.kind == kind && cap_extension.uri == extension.uri)
                .map(|cap_extension| RtpMappingHeaderExtension {
                    id: extension.id,
                    mapped_id: cap_extension.preferred_id,
                })
        })
        .collect();

    let first_mapped_ssrc = random_ssrc();
    let encodings = rtp_parameters
        .encodings
        .iter()
        .zip(first_mapped_ssrc..)
        .map(|(encoding, mapped_ssrc)| RtpMappingEncoding {
            ssrc: encoding.ssrc,
            rid: encoding.rid.clone(),
            scalability_mode: encoding.scalability_mode,
            mapped_ssrc,
        })
        .collect();

    Ok(RtpMapping {
        codecs,
        header_extensions,
        encodings,
    })
}

fn codec_from_capability(
    cap_codec: &RtpCodecCapabilityFinalized,
    parameters: RtpCodecParametersParameters,
) -> RtpCodecParameters {
    RtpCodecParameters {
        mime_type: cap_codec.mime_type,
        payload_type: cap_codec.preferred_payload_type,
        clock_rate: cap_codec.clock_rate,
        channels: cap_codec.channels,
        parameters,
        rtcp_feedback: cap_codec.rtcp_feedback.clone(),
    }
}

/// Generate RTP parameters to be internally used by Consumers given the RTP parameters of a
/// Producer and the RTP capabilities of the Router.
pub(crate) fn get_consumable_rtp_parameters(
    kind: MediaKind,
    params: &RtpParameters,
    caps: &RtpCapabilitiesFinalized,
    rtp_mapping: &RtpMapping,
) -> RtpParameters {
    let mut consumable_params = RtpParameters::default();

    for codec in params.codecs.iter().filter(|codec| !codec.is_rtx()) {
        let cap_codec = rtp_mapping
            .codecs
            .iter()
            .find(|entry| entry.payload_type == codec.payload_type)
            .and_then(|entry| {
                caps.codecs
                    .iter()
                    .find(|cap_codec| cap_codec.preferred_payload_type == entry.mapped_payload_type)
            });

        let cap_codec = match cap_codec {
            Some(cap_codec) => cap_codec,
            None => continue,
        };

        // Keep the Producer codec parameters.
        let consumable_codec = codec_from_capability(cap_codec, codec.parameters.clone());

        let cap_rtx_codec = caps.codecs.iter().find(|cap_rtx_codec| {
            cap_rtx_codec.mime_type.is_rtx()
                && cap_rtx_codec.apt() == Some(u32::from(consumable_codec.payload_type))
        });

        consumable_params.codecs.push(consumable_codec);

        if let Some(cap_rtx_codec) = cap_rtx_codec {
            consumable_params.codecs.push(codec_from_capability(
                cap_rtx_codec,
                cap_rtx_codec.parameters.clone(),
            ));
        }
    }

    consumable_params.header_extensions = caps
        .header_extensions
        .iter()
        .filter(|cap_extension| {
            cap_extension.kind == kind
                && matches!(
                    cap_extension.direction,
                    RtpHeaderExtensionDirection::SendRecv | RtpHeaderExtensionDirection::SendOnly
                )
        })
        .map(|cap_extension| RtpHeaderExtensionParameters {
            uri: cap_extension.uri,
            id: cap_extension.preferred_id,
            encrypt: cap_extension.preferred_encrypt,
        })
        .collect();

    for (encoding, mapped_encoding) in params.encodings.iter().zip(&rtp_mapping.encodings) {
        let mut consumable_encoding = encoding.clone();
        consumable_encoding.rid = None;
        consumable_encoding.rtx = None;
        consumable_encoding.codec_payload_type = None;
        consumable_encoding.ssrc = Some(mapped_encoding.mapped_ssrc);

        consumable_params.encodings.push(consumable_encoding);
    }

    consumable_params.rtcp = RtcpParameters {
        cname: params.rtcp.cname.clone(),
        reduced_size: true,
        mux: Some(true),
    };

    consumable_params
}

/// Check whether the given RTP capabilities can consume the given Producer.
pub(crate) fn can_consume(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
) -> Result<bool, RtpParametersError> {
    validate_rtp_capabilities(caps)?;

    Ok(consumable_params
        .codecs
        .iter()
        .filter(|codec| !codec.is_rtx())
        .any(|codec| {
            caps.codecs.iter().any(|cap_codec| {
                match_codecs(CodecToMatch::from(cap_codec), CodecToMatch::from(codec), true)
            })
        }))
}

/// Generate RTP parameters for a specific Consumer.
///
/// Only codecs the remote endpoint supports are kept, in the consumable order, and an RTX codec
/// survives only together with its media codec. The result has a single encoding carrying every
/// spatial and temporal layer of the producer.
pub(crate) fn get_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
) -> Result<RtpParameters, ConsumerRtpParametersError> {
    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for codec in &consumable_params.codecs {
        let matched_cap_codec = caps.codecs.iter().find(|cap_codec| {
            match_codecs(CodecToMatch::from(*cap_codec), CodecToMatch::from(codec), true)
        });

        if let Some(matched_cap_codec) = matched_cap_codec {
            let mut codec = codec.clone();
            codec.rtcp_feedback = matched_cap_codec
                .rtcp_feedback
                .iter()
                .copied()
                .filter(|feedback| *feedback != RtcpFeedback::Unsupported)
                .collect();
            consumer_params.codecs.push(codec);
        }
    }

    // Drop RTX codecs whose media codec didn't make it.
    let media_payload_types = consumer_params
        .codecs
        .iter()
        .filter(|codec| !codec.is_rtx())
        .map(|codec| u32::from(codec.payload_type))
        .collect::<HashSet<_>>();
    consumer_params.codecs.retain(|codec| {
        !codec.is_rtx()
            || codec
                .apt()
                .map_or(false, |apt| media_payload_types.contains(&apt))
    });

    match consumer_params.codecs.first() {
        Some(codec) if !codec.is_rtx() => {}
        _ => return Err(ConsumerRtpParametersError::NoCompatibleMediaCodecs),
    }

    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|extension| {
            caps.header_extensions.iter().any(|cap_extension| {
                cap_extension.preferred_id == extension.id && cap_extension.uri == extension.uri
            })
        })
        .cloned()
        .collect();

    // Prefer transport-cc for bandwidth estimation, then REMB, depending on extensions in use.
    let has_extension = |uri: RtpHeaderExtensionUri| {
        consumer_params
            .header_extensions
            .iter()
            .any(|extension| extension.uri == uri)
    };
    let keep_transport_cc = has_extension(RtpHeaderExtensionUri::TransportWideCcDraft01);
    let keep_remb = !keep_transport_cc && has_extension(RtpHeaderExtensionUri::AbsSendTime);
    for codec in &mut consumer_params.codecs {
        codec.rtcp_feedback.retain(|feedback| match feedback {
            RtcpFeedback::TransportCc => keep_transport_cc,
            RtcpFeedback::GoogRemb => keep_remb,
            _ => true,
        });
    }

    let rtx_supported = consumer_params.codecs.iter().any(RtpCodecParameters::is_rtx);

    let ssrc = random_ssrc();
    let mut consumer_encoding = RtpEncodingParameters {
        ssrc: Some(ssrc),
        rtx: rtx_supported.then(|| RtpEncodingParametersRtx { ssrc: ssrc + 1 }),
        ..RtpEncodingParameters::default()
    };

    // All encodings are assumed to share the same scalability mode.
    let scalability_mode = consumable_params
        .encodings
        .iter()
        .find_map(|encoding| encoding.scalability_mode);

    consumer_encoding.scalability_mode = match u8::try_from(consumable_params.encodings.len()) {
        Ok(spatial_layers) if spatial_layers > 1 => {
            let temporal_layers = scalability_mode
                .map_or(NonZeroU8::MIN, |scalability_mode| scalability_mode.temporal_layers());
            NonZeroU8::new(spatial_layers).map(|spatial_layers| {
                ScalabilityMode::simulcast(spatial_layers, temporal_layers)
            })
        }
        _ => scalability_mode,
    };

    consumer_encoding.max_bitrate = consumable_params
        .encodings
        .iter()
        .filter_map(|encoding| encoding.max_bitrate)
        .max();

    consumer_params.encodings.push(consumer_encoding);

    Ok(consumer_params)
}

/// Generate RTP parameters for a pipe Consumer.
///
/// Every producer stream is forwarded verbatim with fresh SSRCs. Header extensions tied to the
/// transport (MID and bandwidth estimation) and their feedback are removed.
pub(crate) fn get_pipe_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    enable_rtx: bool,
) -> RtpParameters {
    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for codec in &consumable_params.codecs {
        if !enable_rtx && codec.is_rtx() {
            continue;
        }

        let mut codec = codec.clone();
        codec.rtcp_feedback.retain(|feedback| match feedback {
            RtcpFeedback::NackPli | RtcpFeedback::CcmFir => true,
            RtcpFeedback::Nack => enable_rtx,
            _ => false,
        });
        consumer_params.codecs.push(codec);
    }

    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|extension| {
            !matches!(
                extension.uri,
                RtpHeaderExtensionUri::Mid
                    | RtpHeaderExtensionUri::AbsSendTime
                    | RtpHeaderExtensionUri::TransportWideCcDraft01
            )
        })
        .cloned()
        .collect();

    let base_ssrc = random_ssrc();
    let base_rtx_ssrc = random_ssrc();

    for (offset, encoding) in (0_u32..).zip(&consumable_params.encodings) {
        let mut encoding = encoding.clone();
        encoding.ssrc = Some(base_ssrc + offset);
        encoding.rtx = enable_rtx.then(|| RtpEncodingParametersRtx {
            ssrc: base_rtx_ssrc + offset,
        });

        consumer_params.encodings.push(encoding);
    }

    consumer_params
}

struct CodecToMatch<'a> {
    mime_type: MimeType,
    clock_rate: NonZeroU32,
    channels: Option<NonZeroU8>,
    parameters: &'a RtpCodecParametersParameters,
}

impl<'a> From<&'a RtpCodecCapability> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecCapability) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

impl<'a> From<&'a RtpCodecCapabilityFinalized> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecCapabilityFinalized) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

impl<'a> From<&'a RtpCodecParameters> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecParameters) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: &codec.parameters,
        }
    }
}

/// Whether two codecs are the same codec. `strict` additionally requires matching profiles where
/// the codec has them.
fn match_codecs(codec_a: CodecToMatch<'_>, codec_b: CodecToMatch<'_>, strict: bool) -> bool {
    if codec_a.mime_type != codec_b.mime_type || codec_a.clock_rate != codec_b.clock_rate {
        return false;
    }

    if codec_a.mime_type.kind() == MediaKind::Audio
        && codec_a.channels.unwrap_or(NonZeroU8::MIN) != codec_b.channels.unwrap_or(NonZeroU8::MIN)
    {
        return false;
    }

    codec_parameters_match(
        codec_a.mime_type,
        codec_a.parameters,
        codec_b.parameters,
        strict,
    )
}

/// Codec-specific part of codec matching. Parameters not listed here never prevent a match.
fn codec_parameters_match(
    mime_type: MimeType,
    a: &RtpCodecParametersParameters,
    b: &RtpCodecParametersParameters,
    strict: bool,
) -> bool {
    match mime_type {
        MimeType::Audio(MimeTypeAudio::MultiChannelOpus) => {
            a.get_u32("num_streams") == b.get_u32("num_streams")
                && a.get_u32("coupled_streams") == b.get_u32("coupled_streams")
        }
        MimeType::Video(MimeTypeVideo::H264 | MimeTypeVideo::H264Svc) => {
            let packetization_mode_a = a.get_u32("packetization-mode").unwrap_or(0);
            let packetization_mode_b = b.get_u32("packetization-mode").unwrap_or(0);

            packetization_mode_a == packetization_mode_b
                && (!strict
                    || matches!(
                        (h264::profile(a), h264::profile(b)),
                        (Some(profile_a), Some(profile_b)) if profile_a == profile_b
                    ))
        }
        MimeType::Video(MimeTypeVideo::Vp9) => {
            !strict || a.get_u32("profile-id").unwrap_or(0) == b.get_u32("profile-id").unwrap_or(0)
        }
        _ => true,
    }
}

/// Just enough of RFC 6184 `profile-level-id` to tell profiles apart.
mod h264 {
    use crate::rtp_parameters::RtpCodecParametersParameters;

    const DEFAULT_PROFILE_LEVEL_ID: &str = "42e01f";

    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub(super) enum Profile {
        ConstrainedBaseline,
        Baseline,
        Main,
        ConstrainedHigh,
        High,
    }

    /// `profile_idc`, bit pattern over `profile_iop` (`x` is "don't care") and resulting profile.
    const PROFILE_PATTERNS: &[(u8, &str, Profile)] = &[
        (0x42, "x1xx0000", Profile::ConstrainedBaseline),
        (0x4d, "1xxx0000", Profile::ConstrainedBaseline),
        (0x58, "11xx0000", Profile::ConstrainedBaseline),
        (0x42, "x0xx0000", Profile::Baseline),
        (0x58, "10xx0000", Profile::Baseline),
        (0x4d, "0x0x0000", Profile::Main),
        (0x64, "00000000", Profile::High),
        (0x64, "00001100", Profile::ConstrainedHigh),
    ];

    fn matches_pattern(pattern: &str, value: u8) -> bool {
        pattern.bytes().enumerate().all(|(index, bit)| {
            let actual = (value >> (7 - index)) & 1;
            match bit {
                b'0' => actual == 0,
                b'1' => actual == 1,
                _ => true,
            }
        })
    }

    pub(super) fn profile(parameters: &RtpCodecParametersParameters) -> Option<Profile> {
        let profile_level_id = parameters
            .get_str("profile-level-id")
            .unwrap_or_else(|| DEFAULT_PROFILE_LEVEL_ID.into());

        if profile_level_id.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(&profile_level_id, 16).ok()?;
        let profile_idc = (value >> 16) as u8;
        let profile_iop = (value >> 8) as u8;

        PROFILE_PATTERNS
            .iter()
            .find(|(idc, pattern, _)| *idc == profile_idc && matches_pattern(pattern, profile_iop))
            .map(|(_, _, profile)| *profile)
    }
}
