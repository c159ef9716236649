//! sfu-control prelude.
//!
//! Re-exports commonly used traits and structs from this crate.
//!
//! # Examples
//!
//! Import the prelude with:
//!
//! ```
//! # #[allow(unused_imports)]
//! use sfu_control::prelude::*;
//! ```
pub use crate::worker_manager::WorkerManager;

pub use crate::worker::{
    CreateRouterError, CreateWorkerError, RequestError, Worker, WorkerConnection,
    WorkerDtlsFiles, WorkerId, WorkerLogLevel, WorkerLogTag, WorkerSettings,
    WorkerUpdateSettings,
};

pub use crate::router::{
    CreateRtpObserverError, CreateTransportError, NewRtpObserver, NewTransport,
    PipeDataProducerToRouterError, PipeDataProducerToRouterPair, PipeProducerToRouterError,
    PipeProducerToRouterPair, PipeToRouterOptions, PipeTransportPairError, Router, RouterId,
    RouterOptions,
};

pub use crate::pipe_transport::{
    PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters, WeakPipeTransport,
};
pub use crate::plain_transport::{
    PlainTransport, PlainTransportOptions, PlainTransportRemoteParameters,
};
pub use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportId,
};
pub use crate::webrtc_transport::{
    TransportListenIps, WebRtcTransport, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};

pub use crate::audio_level_observer::{
    AudioLevelObserver, AudioLevelObserverOptions, AudioLevelObserverVolume,
};
pub use crate::rtp_observer::{RtpObserver, RtpObserverAddProducerOptions, RtpObserverId};

pub use crate::consumer::{Consumer, ConsumerId, ConsumerLayers, ConsumerOptions, ConsumerType};
pub use crate::data_consumer::{DataConsumer, DataConsumerId, DataConsumerOptions};
pub use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions};
pub use crate::producer::{Producer, ProducerId, ProducerOptions, ProducerType};

pub use crate::data_structures::{
    AppData, DtlsParameters, IceCandidate, IceParameters, SctpState, TransportListenIp,
    TransportTuple,
};
pub use crate::rtp_parameters::{
    MediaKind, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCapabilities,
    RtpCapabilitiesFinalized, RtpCodecCapability, RtpCodecParametersParameters, RtpParameters,
};
pub use crate::sctp_parameters::{NumSctpStreams, SctpParameters, SctpStreamParameters};
