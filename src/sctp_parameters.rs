//! SCTP association and stream parameters used by data producers and data consumers.

use serde::{Deserialize, Serialize};

/// Number of SCTP streams negotiated in the INIT/INIT-ACK handshake.
///
/// Each data consumer on a transport takes one stream id out of a pool sized to the negotiated
/// `MIS`, so it bounds how many of them can be alive at once.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct NumSctpStreams {
    /// Initially requested number of outgoing SCTP streams.
    #[serde(rename = "OS")]
    pub os: u16,
    /// Maximum number of incoming SCTP streams.
    #[serde(rename = "MIS")]
    pub mis: u16,
}

impl Default for NumSctpStreams {
    fn default() -> Self {
        Self {
            os: 1024,
            mis: 1024,
        }
    }
}

/// SCTP association parameters of a transport, as reported by the worker.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpParameters {
    /// Always 5000.
    pub port: u16,
    #[serde(rename = "OS")]
    pub os: u16,
    #[serde(rename = "MIS")]
    pub mis: u16,
    pub max_message_size: usize,
}

/// Reliability settings of a single SCTP stream.
///
/// Ordered streams are fully reliable. Unordered streams are partially reliable with either a
/// packet lifetime or a retransmission limit, never both.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpStreamParameters {
    stream_id: u16,
    #[serde(default = "default_ordered")]
    ordered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_packet_life_time: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_retransmits: Option<u16>,
}

fn default_ordered() -> bool {
    true
}

impl SctpStreamParameters {
    /// Messages will be sent reliably in order.
    #[must_use]
    pub fn new_ordered(stream_id: u16) -> Self {
        Self {
            stream_id,
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
        }
    }

    /// Messages will be sent unreliably, giving up after `max_packet_life_time` milliseconds.
    #[must_use]
    pub fn new_unordered_with_life_time(stream_id: u16, max_packet_life_time: u16) -> Self {
        Self {
            stream_id,
            ordered: false,
            max_packet_life_time: Some(max_packet_life_time),
            max_retransmits: None,
        }
    }

    /// Messages will be sent unreliably with a limited number of retransmissions.
    #[must_use]
    pub fn new_unordered_with_retransmits(stream_id: u16, max_retransmits: u16) -> Self {
        Self {
            stream_id,
            ordered: false,
            max_packet_life_time: None,
            max_retransmits: Some(max_retransmits),
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    #[must_use]
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    #[must_use]
    pub fn max_packet_life_time(&self) -> Option<u16> {
        self.max_packet_life_time
    }

    #[must_use]
    pub fn max_retransmits(&self) -> Option<u16> {
        self.max_retransmits
    }

    /// Same reliability settings on a different stream.
    pub(crate) fn with_stream_id(self, stream_id: u16) -> Self {
        Self { stream_id, ..self }
    }

    /// Ordered together with a lifetime or retransmit limit, or both limits at once, is rejected.
    pub(crate) fn is_valid(&self) -> bool {
        match (self.max_packet_life_time, self.max_retransmits) {
            (Some(_), Some(_)) => false,
            (None, None) => true,
            _ => !self.ordered,
        }
    }
}
