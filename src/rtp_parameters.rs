//! RTP codec parameters and capabilities exchanged between endpoints and the router.
//!
//! Codecs are described by a single struct per role (capability, finalized capability and
//! parameters) and carry their [`MimeType`] explicitly, so the negotiator can work with any of
//! them the same way regardless of media kind.


use crate::scalability_modes::ScalabilityMode;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::FromIterator;
use std::num::{NonZeroU32, NonZeroU8};
use std::str::FromStr;
use thiserror::Error;

/// Codec specific parameters. Some of them (`packetization-mode` and `profile-level-id` in H264,
/// `profile-id` in VP9, `num_streams` and `coupled_streams` in multiopus) are critical for codec
/// matching.
///
/// Values are kept as JSON values: strings and numbers are both common on the wire.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RtpCodecParametersParameters(BTreeMap<Cow<'static, str>, Value>);

impl RtpCodecParametersParameters {
    /// Insert another parameter into collection.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<Value>,
    {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get specific parameter from collection.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric parameter, also accepting numbers sent as strings.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String parameter, numbers are rendered as decimal strings.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.0.get(key)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cow<'static, str>, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
    V: Into<Value>,
{
    fn from(array: [(K, V); N]) -> Self {
        IntoIterator::into_iter(array).collect()
    }
}

impl<K, V> FromIterator<(K, V)> for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K, V> Extend<(K, V)> for RtpCodecParametersParameters
where
    K: Into<Cow<'static, str>>,
    V: Into<Value>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// Media kind
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio
    Audio,
    /// Video
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Known audio codec subtypes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MimeTypeAudio {
    Opus,
    /// Multi-channel Opus (surround sound in Chromium)
    MultiChannelOpus,
    Pcmu,
    Pcma,
    Isac,
    G722,
    Ilbc,
    Silk,
    Cn,
    TelephoneEvent,
    Rtx,
    Red,
}

/// Known video codec subtypes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MimeTypeVideo {
    Vp8,
    Vp9,
    H264,
    H264Svc,
    H265,
    Rtx,
    Red,
    Ulpfec,
}

const AUDIO_SUBTYPES: &[(MimeTypeAudio, &str)] = &[
    (MimeTypeAudio::Opus, "opus"),
    (MimeTypeAudio::MultiChannelOpus, "multiopus"),
    (MimeTypeAudio::Pcmu, "PCMU"),
    (MimeTypeAudio::Pcma, "PCMA"),
    (MimeTypeAudio::Isac, "ISAC"),
    (MimeTypeAudio::G722, "G722"),
    (MimeTypeAudio::Ilbc, "iLBC"),
    (MimeTypeAudio::Silk, "SILK"),
    (MimeTypeAudio::Cn, "CN"),
    (MimeTypeAudio::TelephoneEvent, "telephone-event"),
    (MimeTypeAudio::Rtx, "rtx"),
    (MimeTypeAudio::Red, "red"),
];

const VIDEO_SUBTYPES: &[(MimeTypeVideo, &str)] = &[
    (MimeTypeVideo::Vp8, "VP8"),
    (MimeTypeVideo::Vp9, "VP9"),
    (MimeTypeVideo::H264, "H264"),
    (MimeTypeVideo::H264Svc, "H264-SVC"),
    (MimeTypeVideo::H265, "H265"),
    (MimeTypeVideo::Rtx, "rtx"),
    (MimeTypeVideo::Red, "red"),
    (MimeTypeVideo::Ulpfec, "ulpfec"),
];

/// Audio or video MIME type like `audio/opus` or `video/VP8`.
///
/// Parsing is case-insensitive, formatting always uses the canonical spelling.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MimeType {
    Audio(MimeTypeAudio),
    Video(MimeTypeVideo),
}

impl MimeType {
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }

    #[must_use]
    pub fn is_rtx(self) -> bool {
        matches!(
            self,
            Self::Audio(MimeTypeAudio::Rtx) | Self::Video(MimeTypeVideo::Rtx)
        )
    }

    /// RTX MIME type of the same media kind.
    #[must_use]
    pub fn rtx(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => Self::Audio(MimeTypeAudio::Rtx),
            MediaKind::Video => Self::Video(MimeTypeVideo::Rtx),
        }
    }

    fn subtype(self) -> &'static str {
        match self {
            Self::Audio(audio) => AUDIO_SUBTYPES
                .iter()
                .find(|(known, _)| *known == audio)
                .map_or("", |(_, name)| name),
            Self::Video(video) => VIDEO_SUBTYPES
                .iter()
                .find(|(known, _)| *known == video)
                .map_or("", |(_, name)| name),
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind().as_str(), self.subtype())
    }
}

/// Error that caused [`MimeType`] parsing error.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseMimeTypeError {
    /// Not in `kind/subtype` form or the kind is neither `audio` nor `video`.
    #[error("Invalid MIME type \"{0}\"")]
    InvalidInput(String),
    /// Subtype is not a codec known to the worker.
    #[error("Unknown MIME type \"{0}\"")]
    Unknown(String),
}

impl FromStr for MimeType {
    type Err = ParseMimeTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, subtype) = s
            .split_once('/')
            .ok_or_else(|| ParseMimeTypeError::InvalidInput(s.to_string()))?;

        if kind.eq_ignore_ascii_case("audio") {
            AUDIO_SUBTYPES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(subtype))
                .map(|(audio, _)| Self::Audio(*audio))
                .ok_or_else(|| ParseMimeTypeError::Unknown(s.to_string()))
        } else if kind.eq_ignore_ascii_case("video") {
            VIDEO_SUBTYPES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(subtype))
                .map(|(video, _)| Self::Video(*video))
                .ok_or_else(|| ParseMimeTypeError::Unknown(s.to_string()))
        } else {
            Err(ParseMimeTypeError::InvalidInput(s.to_string()))
        }
    }
}

impl Serialize for MimeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MimeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = Cow::<str>::deserialize(deserializer)?;
        string.parse().map_err(de::Error::custom)
    }
}

/// Provides information on RTCP feedback messages for a specific codec.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(from = "RtcpFeedbackFields", into = "RtcpFeedbackFields")]
pub enum RtcpFeedback {
    /// `nack`
    Nack,
    /// `nack pli`
    NackPli,
    /// `ccm fir`
    CcmFir,
    /// `goog-remb`
    GoogRemb,
    /// `transport-cc`
    TransportCc,
    /// Anything else, ignored by the router.
    Unsupported,
}

#[derive(Deserialize, Serialize)]
struct RtcpFeedbackFields {
    r#type: String,
    #[serde(default)]
    parameter: String,
}

impl From<RtcpFeedbackFields> for RtcpFeedback {
    fn from(fields: RtcpFeedbackFields) -> Self {
        match (fields.r#type.as_str(), fields.parameter.as_str()) {
            ("nack", "") => Self::Nack,
            ("nack", "pli") => Self::NackPli,
            ("ccm", "fir") => Self::CcmFir,
            ("goog-remb", "") => Self::GoogRemb,
            ("transport-cc", "") => Self::TransportCc,
            _ => Self::Unsupported,
        }
    }
}

impl From<RtcpFeedback> for RtcpFeedbackFields {
    fn from(feedback: RtcpFeedback) -> Self {
        let (r#type, parameter) = match feedback {
            RtcpFeedback::Nack => ("nack", ""),
            RtcpFeedback::NackPli => ("nack", "pli"),
            RtcpFeedback::CcmFir => ("ccm", "fir"),
            RtcpFeedback::GoogRemb => ("goog-remb", ""),
            RtcpFeedback::TransportCc => ("transport-cc", ""),
            RtcpFeedback::Unsupported => ("unknown", ""),
        };
        Self {
            r#type: r#type.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// Codec as it appears in router options and in remote RTP capabilities.
///
/// `preferred_payload_type` is optional here: the router picks a dynamic one when unset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: MimeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// Number of audio channels, unset means 1. Ignored for video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    /// Audio codec without parameters or feedback.
    #[must_use]
    pub fn audio(mime_type: MimeTypeAudio, clock_rate: NonZeroU32, channels: NonZeroU8) -> Self {
        Self {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(mime_type),
            preferred_payload_type: None,
            clock_rate,
            channels: Some(channels),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: Vec::new(),
        }
    }

    /// Video codec without parameters or feedback.
    #[must_use]
    pub fn video(mime_type: MimeTypeVideo, clock_rate: NonZeroU32) -> Self {
        Self {
            kind: MediaKind::Video,
            mime_type: MimeType::Video(mime_type),
            preferred_payload_type: None,
            clock_rate,
            channels: None,
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_preferred_payload_type(mut self, preferred_payload_type: u8) -> Self {
        self.preferred_payload_type = Some(preferred_payload_type);
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: RtpCodecParametersParameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_rtcp_feedback(mut self, rtcp_feedback: Vec<RtcpFeedback>) -> Self {
        self.rtcp_feedback = rtcp_feedback;
        self
    }
}

/// Codec of router RTP capabilities, always with a concrete payload type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapabilityFinalized {
    pub kind: MediaKind,
    pub mime_type: MimeType,
    pub preferred_payload_type: u8,
    pub clock_rate: NonZeroU32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapabilityFinalized {
    /// `apt` parameter of an RTX codec.
    #[must_use]
    pub fn apt(&self) -> Option<u32> {
        self.parameters.get_u32("apt")
    }
}

impl From<RtpCodecCapabilityFinalized> for RtpCodecCapability {
    fn from(codec: RtpCodecCapabilityFinalized) -> Self {
        Self {
            kind: codec.kind,
            mime_type: codec.mime_type,
            preferred_payload_type: Some(codec.preferred_payload_type),
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            parameters: codec.parameters,
            rtcp_feedback: codec.rtcp_feedback,
        }
    }
}

/// What an endpoint (or the router) can receive at media level.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

/// Router RTP capabilities with every payload type assigned.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilitiesFinalized {
    pub codecs: Vec<RtpCodecCapabilityFinalized>,
    pub header_extensions: Vec<RtpHeaderExtension>,
}

impl From<RtpCapabilitiesFinalized> for RtpCapabilities {
    fn from(capabilities: RtpCapabilitiesFinalized) -> Self {
        Self {
            codecs: capabilities.codecs.into_iter().map(Into::into).collect(),
            header_extensions: capabilities.header_extensions,
        }
    }
}

/// Direction of RTP header extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpHeaderExtensionDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Default for RtpHeaderExtensionDirection {
    fn default() -> Self {
        Self::SendRecv
    }
}

/// URI of an RTP header extension. Unknown URIs are kept as [`RtpHeaderExtensionUri::Unsupported`]
/// so that remote capabilities with extensions the worker doesn't know still parse.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RtpHeaderExtensionUri {
    Mid,
    RtpStreamId,
    RepairRtpStreamId,
    FrameMarkingDraft07,
    FrameMarking,
    AudioLevel,
    VideoOrientation,
    TimeOffset,
    TransportWideCcDraft01,
    AbsSendTime,
    Unsupported,
}

const HEADER_EXTENSION_URIS: &[(RtpHeaderExtensionUri, &str)] = &[
    (
        RtpHeaderExtensionUri::Mid,
        "urn:ietf:params:rtp-hdrext:sdes:mid",
    ),
    (
        RtpHeaderExtensionUri::RtpStreamId,
        "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id",
    ),
    (
        RtpHeaderExtensionUri::RepairRtpStreamId,
        "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id",
    ),
    (
        RtpHeaderExtensionUri::FrameMarkingDraft07,
        "http://tools.ietf.org/html/draft-ietf-avtext-framemarking-07",
    ),
    (
        RtpHeaderExtensionUri::FrameMarking,
        "urn:ietf:params:rtp-hdrext:framemarking",
    ),
    (
        RtpHeaderExtensionUri::AudioLevel,
        "urn:ietf:params:rtp-hdrext:ssrc-audio-level",
    ),
    (
        RtpHeaderExtensionUri::VideoOrientation,
        "urn:3gpp:video-orientation",
    ),
    (
        RtpHeaderExtensionUri::TimeOffset,
        "urn:ietf:params:rtp-hdrext:toffset",
    ),
    (
        RtpHeaderExtensionUri::TransportWideCcDraft01,
        "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01",
    ),
    (
        RtpHeaderExtensionUri::AbsSendTime,
        "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time",
    ),
];

impl RtpHeaderExtensionUri {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        HEADER_EXTENSION_URIS
            .iter()
            .find(|(uri, _)| *uri == self)
            .map_or("unsupported", |(_, s)| s)
    }
}

impl From<&str> for RtpHeaderExtensionUri {
    fn from(s: &str) -> Self {
        HEADER_EXTENSION_URIS
            .iter()
            .find(|(_, known)| *known == s)
            .map_or(Self::Unsupported, |(uri, _)| *uri)
    }
}

impl Serialize for RtpHeaderExtensionUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RtpHeaderExtensionUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = Cow::<str>::deserialize(deserializer)?;
        Ok(Self::from(string.as_ref()))
    }
}

/// Header extension as it appears in RTP capabilities.
///
/// The direction is only meaningful in router capabilities, it is ignored in remote ones.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    pub kind: MediaKind,
    pub uri: RtpHeaderExtensionUri,
    /// Numeric identifier that goes in RTP packets, unique per kind.
    pub preferred_id: u16,
    #[serde(default)]
    pub preferred_encrypt: bool,
    #[serde(default)]
    pub direction: RtpHeaderExtensionDirection,
}

/// Codec settings inside RTP parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    pub mime_type: MimeType,
    /// The value that goes in the RTP payload type field, unique per parameters.
    pub payload_type: u8,
    pub clock_rate: NonZeroU32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecParameters {
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.mime_type.kind()
    }

    #[must_use]
    pub fn is_rtx(&self) -> bool {
        self.mime_type.is_rtx()
    }

    /// `apt` parameter of an RTX codec.
    #[must_use]
    pub fn apt(&self) -> Option<u32> {
        self.parameters.get_u32("apt")
    }
}

/// RTX stream attached to an encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpEncodingParametersRtx {
    pub ssrc: u32,
}

/// One media RTP stream and its associated RTX stream, if any.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    /// The RID RTP extension value. Must be unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Codec payload type this encoding affects. If unset, first media codec is chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_payload_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtx: Option<RtpEncodingParametersRtx>,
    /// Discontinuous transmission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtx: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<ScalabilityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
}

/// Header extension inside RTP parameters.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpHeaderExtensionParameters {
    pub uri: RtpHeaderExtensionUri,
    pub id: u16,
    #[serde(default)]
    pub encrypt: bool,
}

/// RTCP settings inside RTP parameters.
///
/// Without a cname in producer parameters the transport picks one and uses it for every producer
/// created on it afterwards.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Reduced size RTCP (RFC 5506). Default true.
    #[serde(default = "default_true")]
    pub reduced_size: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl Default for RtcpParameters {
    fn default() -> Self {
        Self {
            cname: None,
            reduced_size: true,
            mux: None,
        }
    }
}

/// Describes a media stream sent by an endpoint to a producer, or sent by a consumer to an
/// endpoint.
///
/// Consumer parameters always carry a single encoding with freshly generated SSRCs, except when
/// consuming over a pipe transport where every producer stream is forwarded verbatim.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    /// The MID RTP extension value as defined in the BUNDLE specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    pub codecs: Vec<RtpCodecParameters>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    #[serde(default)]
    pub rtcp: RtcpParameters,
}
