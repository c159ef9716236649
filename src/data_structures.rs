//! Miscellaneous data structures shared by transports and other entities.

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Container for arbitrary data attached to an entity by the application.
#[derive(Debug, Clone)]
pub struct AppData(Arc<dyn Any + Send + Sync>);

impl Default for AppData {
    fn default() -> Self {
        Self::new(())
    }
}

impl Deref for AppData {
    type Target = Arc<dyn Any + Send + Sync>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AppData {
    pub fn new<T: Any + Send + Sync>(app_data: T) -> Self {
        Self(Arc::new(app_data))
    }
}

/// Source of entity identifiers.
///
/// Every router, transport, producer and so on gets its id from the generator configured in
/// [`WorkerSettings`](crate::worker::WorkerSettings), which makes ids reproducible in tests.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    fn generate(&self) -> Uuid;
}

/// Random v4 UUIDs, the default.
#[derive(Debug, Default, Copy, Clone)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic ids counting up from a starting value.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: Mutex<u128>,
}

impl SequentialIdGenerator {
    #[must_use]
    pub fn starting_at(first: u128) -> Self {
        Self {
            next: Mutex::new(first),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> Uuid {
        let mut next = self.next.lock();
        let id = Uuid::from_u128(*next);
        *next = next.wrapping_add(1);
        id
    }
}

/// IP to listen on, with an optional public address to announce instead.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportListenIp {
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announced_ip: Option<IpAddr>,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceRole {
    Controlled,
    Controlling,
}

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    #[serde(default)]
    pub ice_lite: Option<bool>,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceCandidateType {
    Host,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceCandidateTcpType {
    Passive,
}

/// ICE-lite candidate gathered by the worker for a WebRTC transport.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: IpAddr,
    pub protocol: TransportProtocol,
    pub port: u16,
    pub r#type: IceCandidateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<IceCandidateTcpType>,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceState {
    New,
    Connected,
    Completed,
    Disconnected,
    Closed,
}

/// Local address of a transport, plus the remote one once known.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportTuple {
    pub local_ip: IpAddr,
    pub local_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    pub protocol: TransportProtocol,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SctpState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    Auto,
    Client,
    Server,
}

impl Default for DtlsRole {
    fn default() -> Self {
        Self::Auto
    }
}

/// Certificate fingerprint, serialized as `{"algorithm": "sha-256", "value": "AB:CD:..."}`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum DtlsFingerprint {
    Sha1 { value: [u8; 20] },
    Sha224 { value: [u8; 28] },
    Sha256 { value: [u8; 32] },
    Sha384 { value: [u8; 48] },
    Sha512 { value: [u8; 64] },
}

impl DtlsFingerprint {
    fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha1 { .. } => "sha-1",
            Self::Sha224 { .. } => "sha-224",
            Self::Sha256 { .. } => "sha-256",
            Self::Sha384 { .. } => "sha-384",
            Self::Sha512 { .. } => "sha-512",
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::Sha1 { value } => value,
            Self::Sha224 { value } => value,
            Self::Sha256 { value } => value,
            Self::Sha384 { value } => value,
            Self::Sha512 { value } => value,
        }
    }

    fn from_parts(algorithm: &str, hex: &str) -> Option<Self> {
        let bytes = hex
            .split(':')
            .map(|octet| {
                if octet.len() == 2 {
                    u8::from_str_radix(octet, 16).ok()
                } else {
                    None
                }
            })
            .collect::<Option<Vec<u8>>>()?;

        Some(match algorithm {
            "sha-1" => Self::Sha1 {
                value: bytes.try_into().ok()?,
            },
            "sha-224" => Self::Sha224 {
                value: bytes.try_into().ok()?,
            },
            "sha-256" => Self::Sha256 {
                value: bytes.try_into().ok()?,
            },
            "sha-384" => Self::Sha384 {
                value: bytes.try_into().ok()?,
            },
            "sha-512" => Self::Sha512 {
                value: bytes.try_into().ok()?,
            },
            _ => return None,
        })
    }
}

#[derive(Deserialize, Serialize)]
struct DtlsFingerprintFields<'a> {
    algorithm: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl Serialize for DtlsFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self
            .bytes()
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect::<Vec<_>>()
            .join(":");

        DtlsFingerprintFields {
            algorithm: Cow::Borrowed(self.algorithm()),
            value: Cow::Owned(value),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DtlsFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = DtlsFingerprintFields::deserialize(deserializer)?;
        Self::from_parts(&fields.algorithm, &fields.value).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid {} fingerprint {}",
                fields.algorithm, fields.value
            ))
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DtlsParameters {
    #[serde(default)]
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Direction of a trace event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEventDirection {
    In,
    Out,
}
