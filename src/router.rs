pub mod audio_level_observer;
pub mod consumer;
pub mod data_consumer;
pub mod data_producer;
pub mod pipe_transport;
pub mod plain_transport;
pub mod producer;
pub mod rtp_observer;
pub mod transport;
pub mod webrtc_transport;

use crate::audio_level_observer::{AudioLevelObserver, AudioLevelObserverOptions};
use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions, WeakDataProducer};
use crate::data_structures::{AppData, IdGenerator, TransportListenIp};
use crate::messages::{
    RouterCloseRequest, RouterCreateAudioLevelObserverData,
    RouterCreateAudioLevelObserverRequest, RouterCreatePipeTransportData,
    RouterCreatePipeTransportRequest, RouterCreatePlainTransportData,
    RouterCreatePlainTransportRequest, RouterCreateWebrtcTransportData,
    RouterCreateWebrtcTransportRequest, RouterDumpRequest, RouterInternal, RtpObserverInternal,
    TransportInternal,
};
use crate::ortc;
use crate::pipe_transport::{
    PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters, WeakPipeTransport,
};
use crate::plain_transport::{PlainTransport, PlainTransportOptions};
use crate::producer::{Producer, ProducerId, ProducerOptions, WeakProducer};
use crate::rtp_observer::{RtpObserver, RtpObserverId};
use crate::rtp_parameters::{RtpCapabilities, RtpCapabilitiesFinalized, RtpCodecCapability};
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportCore,
    TransportId, TransportKind,
};
use crate::uuid_based_wrapper_type;
use crate::webrtc_transport::{WebRtcTransport, WebRtcTransportOptions};
use crate::worker::{Channel, RequestError};
use crate::data_structures::SctpState;
use async_executor::Executor;
use async_lock::Mutex as AsyncMutex;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use futures_lite::future;
use log::{debug, error};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use crate::messages::RouterDump;

uuid_based_wrapper_type!(
    /// Router identifier.
    RouterId
);

/// Router options.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct RouterOptions {
    /// Router media codecs.
    pub media_codecs: Vec<RtpCodecCapability>,
    /// Custom application data.
    pub app_data: AppData,
}

impl RouterOptions {
    #[must_use]
    pub fn new(media_codecs: Vec<RtpCodecCapability>) -> Self {
        Self {
            media_codecs,
            app_data: AppData::default(),
        }
    }
}

/// Options used for piping a producer or data producer into another router.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeToRouterOptions {
    /// Target router instance.
    pub router: Router,
    /// IP used in the pipe transport pair.
    /// Default `127.0.0.1`.
    pub listen_ip: TransportListenIp,
    /// Create a SCTP association.
    /// Default `true`.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
}

impl PipeToRouterOptions {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            listen_ip: TransportListenIp {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                announced_ip: None,
            },
            enable_sctp: true,
            num_sctp_streams: NumSctpStreams::default(),
        }
    }
}

/// Result of piping a producer into another router.
#[derive(Debug)]
pub struct PipeProducerToRouterPair {
    /// The consumer created in the current router.
    pub pipe_consumer: Consumer,
    /// The producer created in the target router, with the id of the original producer.
    pub pipe_producer: Producer,
}

/// Result of piping a data producer into another router.
#[derive(Debug)]
pub struct PipeDataProducerToRouterPair {
    /// The data consumer created in the current router.
    pub pipe_data_consumer: DataConsumer,
    /// The data producer created in the target router, with the id of the original data
    /// producer.
    pub pipe_data_producer: DataProducer,
}

/// Error that caused transport creation to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CreateTransportError {
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Router was closed before the transport was created.
    #[error("Router closed")]
    RouterClosed,
}

/// Error that caused RTP observer creation to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CreateRtpObserverError {
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Router was closed before the observer was created.
    #[error("Router closed")]
    RouterClosed,
}

/// Error that caused the pipe transport pair between two routers to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PipeTransportPairError {
    /// One of the pipe transports couldn't be created.
    #[error("Failed to create pipe transport: {0}")]
    Create(CreateTransportError),
    /// Pipe transports couldn't be connected to each other.
    #[error("Failed to connect pipe transports: {0}")]
    Connect(RequestError),
}

/// Error that caused [`Router::pipe_producer_to_router`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PipeProducerToRouterError {
    /// Destination router must be different
    #[error("Destination router must be different")]
    SameRouter,
    /// Producer with specified id not found
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Failed to create or connect pipe transport pair
    #[error("Failed to create or connect pipe transports: {0}")]
    TransportFailed(PipeTransportPairError),
    /// Failed to consume
    #[error("Failed to consume: {0}")]
    ConsumeFailed(ConsumeError),
    /// Failed to produce
    #[error("Failed to produce: {0}")]
    ProduceFailed(ProduceError),
}

/// Error that caused [`Router::pipe_data_producer_to_router`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PipeDataProducerToRouterError {
    /// Destination router must be different
    #[error("Destination router must be different")]
    SameRouter,
    /// Data producer with specified id not found
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// Failed to create or connect pipe transport pair
    #[error("Failed to create or connect pipe transports: {0}")]
    TransportFailed(PipeTransportPairError),
    /// Failed to consume
    #[error("Failed to consume: {0}")]
    ConsumeFailed(ConsumeDataError),
    /// Failed to produce
    #[error("Failed to produce: {0}")]
    ProduceFailed(ProduceDataError),
}

/// What a transport can learn about the router it belongs to.
///
/// Transports and RTP observers get this instead of the router itself.
pub(crate) trait RouterAccessor: Send + Sync {
    fn rtp_capabilities(&self) -> &RtpCapabilitiesFinalized;

    fn get_producer(&self, producer_id: &ProducerId) -> Option<Producer>;

    fn get_data_producer(&self, data_producer_id: &DataProducerId) -> Option<DataProducer>;

    fn register_producer(&self, producer: &Producer);

    fn unregister_producer(&self, producer_id: &ProducerId);

    fn register_data_producer(&self, data_producer: &DataProducer);

    fn unregister_data_producer(&self, data_producer_id: &DataProducerId);
}

/// Every producer and data producer of every transport of a router, by id.
struct Registry {
    rtp_capabilities: RtpCapabilitiesFinalized,
    producers: Mutex<HashMap<ProducerId, WeakProducer>>,
    data_producers: Mutex<HashMap<DataProducerId, WeakDataProducer>>,
}

impl RouterAccessor for Registry {
    fn rtp_capabilities(&self) -> &RtpCapabilitiesFinalized {
        &self.rtp_capabilities
    }

    fn get_producer(&self, producer_id: &ProducerId) -> Option<Producer> {
        self.producers.lock().get(producer_id)?.upgrade()
    }

    fn get_data_producer(&self, data_producer_id: &DataProducerId) -> Option<DataProducer> {
        self.data_producers.lock().get(data_producer_id)?.upgrade()
    }

    fn register_producer(&self, producer: &Producer) {
        self.producers
            .lock()
            .insert(producer.id(), producer.downgrade());
    }

    fn unregister_producer(&self, producer_id: &ProducerId) {
        self.producers.lock().remove(producer_id);
    }

    fn register_data_producer(&self, data_producer: &DataProducer) {
        self.data_producers
            .lock()
            .insert(data_producer.id(), data_producer.downgrade());
    }

    fn unregister_data_producer(&self, data_producer_id: &DataProducerId) {
        self.data_producers.lock().remove(data_producer_id);
    }
}

/// New transport that was just created.
#[derive(Debug)]
pub enum NewTransport<'a> {
    /// WebRTC transport
    WebRtc(&'a WebRtcTransport),
    /// Plain transport
    Plain(&'a PlainTransport),
    /// Pipe transport
    Pipe(&'a PipeTransport),
}

impl<'a> Deref for NewTransport<'a> {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::WebRtc(transport) => *transport as &Self::Target,
            Self::Plain(transport) => *transport as &Self::Target,
            Self::Pipe(transport) => *transport as &Self::Target,
        }
    }
}

/// New RTP observer that was just created.
#[derive(Debug)]
pub enum NewRtpObserver<'a> {
    /// Audio level observer
    AudioLevel(&'a AudioLevelObserver),
}

impl<'a> Deref for NewRtpObserver<'a> {
    type Target = dyn RtpObserver;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::AudioLevel(observer) => *observer as &Self::Target,
        }
    }
}

/// Transport owned by the router.
#[derive(Clone)]
enum OwnedTransport {
    WebRtc(WebRtcTransport),
    Plain(PlainTransport),
    Pipe(PipeTransport),
}

impl OwnedTransport {
    fn id(&self) -> TransportId {
        match self {
            Self::WebRtc(transport) => transport.id(),
            Self::Plain(transport) => transport.id(),
            Self::Pipe(transport) => transport.id(),
        }
    }

    fn as_new_transport(&self) -> NewTransport<'_> {
        match self {
            Self::WebRtc(transport) => NewTransport::WebRtc(transport),
            Self::Plain(transport) => NewTransport::Plain(transport),
            Self::Pipe(transport) => NewTransport::Pipe(transport),
        }
    }

    fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        match self {
            Self::WebRtc(transport) => transport.on_internal_close(callback),
            Self::Plain(transport) => transport.on_internal_close(callback),
            Self::Pipe(transport) => transport.on_internal_close(callback),
        }
    }

    fn router_closed(&self) {
        match self {
            Self::WebRtc(transport) => transport.router_closed(),
            Self::Plain(transport) => transport.router_closed(),
            Self::Pipe(transport) => transport.router_closed(),
        }
    }
}

/// Connected pipe transports between this router and one other router.
#[derive(Clone)]
struct PipeTransportPair {
    local: PipeTransport,
    remote: PipeTransport,
}

impl PipeTransportPair {
    fn closed(&self) -> bool {
        self.local.closed() || self.remote.closed()
    }
}

/// Pipe transport pairs by destination router. The per-router slot is inserted synchronously, so
/// concurrent pipe calls to the same router end up waiting on one creation.
type PipeTransportPairs = Mutex<HashMap<RouterId, Arc<AsyncMutex<Option<PipeTransportPair>>>>>;

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct ObserverHandlers {
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    new_transport: Bag<Arc<dyn Fn(NewTransport<'_>) + Send + Sync>>,
    new_rtp_observer: Bag<Arc<dyn Fn(NewRtpObserver<'_>) + Send + Sync>>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_transport: Bag<Arc<dyn Fn(NewTransport<'_>) + Send + Sync>>,
    new_rtp_observer: Bag<Arc<dyn Fn(NewRtpObserver<'_>) + Send + Sync>>,
    worker_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer: ObserverHandlers,
}

struct Inner {
    id: RouterId,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    id_generator: Arc<dyn IdGenerator>,
    registry: Arc<Registry>,
    transports: Arc<Mutex<HashMap<TransportId, OwnedTransport>>>,
    rtp_observers: Arc<Mutex<HashMap<RtpObserverId, AudioLevelObserver>>>,
    pipe_transport_pairs: Arc<PipeTransportPairs>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close(true);
    }
}

impl Inner {
    fn close(&self, close_request: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if close_request {
            let channel = self.channel.clone();
            let request = RouterCloseRequest {
                internal: RouterInternal { router_id: self.id },
            };

            self.executor
                .spawn(async move {
                    match channel.request(request).await {
                        Ok(()) | Err(RequestError::ChannelClosed) => {}
                        Err(error) => {
                            error!("router closing failed: {}", error);
                        }
                    }
                })
                .detach();
        }

        let transports = mem::take(&mut *self.transports.lock());
        for transport in transports.into_values() {
            transport.router_closed();
        }
        let rtp_observers = mem::take(&mut *self.rtp_observers.lock());
        for rtp_observer in rtp_observers.into_values() {
            rtp_observer.router_closed();
        }
        let pipe_transport_pairs = mem::take(&mut *self.pipe_transport_pairs.lock());
        drop(pipe_transport_pairs);

        self.handlers.internal_close.call_simple();
        self.handlers.close.call_simple();
        self.handlers.observer.close.call_simple();
    }
}

/// A router enables injection, selection and forwarding of media streams through
/// [`Transport`] instances created on it.
///
/// Producers and data producers created on any of its transports can be consumed from any other
/// of its transports.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("rtp_capabilities", &self.inner.registry.rtp_capabilities)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Router {
    pub(crate) fn new(
        id: RouterId,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        rtp_capabilities: RtpCapabilitiesFinalized,
        id_generator: Arc<dyn IdGenerator>,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let registry = Arc::new(Registry {
            rtp_capabilities,
            producers: Mutex::default(),
            data_producers: Mutex::default(),
        });

        let inner = Arc::new(Inner {
            id,
            executor,
            channel,
            id_generator,
            registry,
            transports: Arc::default(),
            rtp_observers: Arc::default(),
            pipe_transport_pairs: Arc::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        });

        Self { inner }
    }

    /// Router id.
    #[must_use]
    pub fn id(&self) -> RouterId {
        self.inner.id
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the router is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// RTP capabilities of the router. These capabilities are typically needed by WebRTC
    /// endpoints to negotiate what they can send and receive.
    #[must_use]
    pub fn rtp_capabilities(&self) -> &RtpCapabilitiesFinalized {
        &self.inner.registry.rtp_capabilities
    }

    /// Dump Router.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<RouterDump, RequestError> {
        debug!("dump()");

        self.inner
            .channel
            .request(RouterDumpRequest {
                internal: RouterInternal {
                    router_id: self.inner.id,
                },
            })
            .await
    }

    /// Create a [`WebRtcTransport`].
    pub async fn create_webrtc_transport(
        &self,
        webrtc_transport_options: WebRtcTransportOptions,
    ) -> Result<WebRtcTransport, CreateTransportError> {
        debug!("create_webrtc_transport()");

        let WebRtcTransportOptions {
            listen_ips,
            enable_udp,
            enable_tcp,
            prefer_udp,
            prefer_tcp,
            initial_available_outgoing_bitrate,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            app_data,
        } = webrtc_transport_options;

        let transport_id = TransportId::generate(&*self.inner.id_generator);

        let data = self
            .inner
            .channel
            .request(RouterCreateWebrtcTransportRequest {
                internal: self.transport_internal(transport_id),
                data: RouterCreateWebrtcTransportData {
                    listen_ips: listen_ips.to_vec(),
                    enable_udp,
                    enable_tcp,
                    prefer_udp,
                    prefer_tcp,
                    initial_available_outgoing_bitrate,
                    enable_sctp,
                    num_sctp_streams,
                    max_sctp_message_size,
                    is_data_channel: true,
                },
            })
            .await
            .map_err(CreateTransportError::Request)?;

        let core = self.transport_core(
            transport_id,
            TransportKind::WebRtc,
            data.sctp_parameters,
            data.sctp_state,
            app_data,
        );
        let transport = WebRtcTransport::new(core, data);

        self.add_transport(OwnedTransport::WebRtc(transport.clone()))?;

        Ok(transport)
    }

    /// Create a [`PlainTransport`].
    pub async fn create_plain_transport(
        &self,
        plain_transport_options: PlainTransportOptions,
    ) -> Result<PlainTransport, CreateTransportError> {
        debug!("create_plain_transport()");

        let PlainTransportOptions {
            listen_ip,
            rtcp_mux,
            comedia,
            multi_source,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            app_data,
        } = plain_transport_options;

        let transport_id = TransportId::generate(&*self.inner.id_generator);

        let data = self
            .inner
            .channel
            .request(RouterCreatePlainTransportRequest {
                internal: self.transport_internal(transport_id),
                data: RouterCreatePlainTransportData {
                    listen_ip,
                    rtcp_mux,
                    comedia: comedia && !multi_source,
                    multi_source,
                    enable_sctp,
                    num_sctp_streams,
                    max_sctp_message_size,
                    is_data_channel: false,
                },
            })
            .await
            .map_err(CreateTransportError::Request)?;

        let core = self.transport_core(
            transport_id,
            TransportKind::Plain,
            data.sctp_parameters,
            data.sctp_state,
            app_data,
        );
        let transport = PlainTransport::new(core, multi_source, data);

        self.add_transport(OwnedTransport::Plain(transport.clone()))?;

        Ok(transport)
    }

    /// Create a [`PipeTransport`].
    pub async fn create_pipe_transport(
        &self,
        pipe_transport_options: PipeTransportOptions,
    ) -> Result<PipeTransport, CreateTransportError> {
        debug!("create_pipe_transport()");

        let PipeTransportOptions {
            listen_ip,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            enable_rtx,
            app_data,
        } = pipe_transport_options;

        let transport_id = TransportId::generate(&*self.inner.id_generator);

        let data = self
            .inner
            .channel
            .request(RouterCreatePipeTransportRequest {
                internal: self.transport_internal(transport_id),
                data: RouterCreatePipeTransportData {
                    listen_ip,
                    enable_sctp,
                    num_sctp_streams,
                    max_sctp_message_size,
                    is_data_channel: false,
                    enable_rtx,
                },
            })
            .await
            .map_err(CreateTransportError::Request)?;

        let core = self.transport_core(
            transport_id,
            TransportKind::Pipe { enable_rtx },
            data.sctp_parameters,
            data.sctp_state,
            app_data,
        );
        let transport = PipeTransport::new(core, data);

        self.add_transport(OwnedTransport::Pipe(transport.clone()))?;

        Ok(transport)
    }

    /// Create an [`AudioLevelObserver`].
    pub async fn create_audio_level_observer(
        &self,
        audio_level_observer_options: AudioLevelObserverOptions,
    ) -> Result<AudioLevelObserver, CreateRtpObserverError> {
        debug!("create_audio_level_observer()");

        let AudioLevelObserverOptions {
            max_entries,
            threshold,
            interval,
            app_data,
        } = audio_level_observer_options;

        let rtp_observer_id = RtpObserverId::generate(&*self.inner.id_generator);
        let internal = RtpObserverInternal {
            router_id: self.inner.id,
            rtp_observer_id,
        };

        self.inner
            .channel
            .request(RouterCreateAudioLevelObserverRequest {
                internal,
                data: RouterCreateAudioLevelObserverData {
                    max_entries: max_entries.get(),
                    threshold,
                    interval,
                },
            })
            .await
            .map_err(CreateRtpObserverError::Request)?;

        let audio_level_observer = AudioLevelObserver::new(
            rtp_observer_id,
            internal,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            app_data,
            Arc::clone(&self.inner.registry) as Arc<dyn RouterAccessor>,
        );

        if self.closed() {
            audio_level_observer.router_closed();
            return Err(CreateRtpObserverError::RouterClosed);
        }

        self.inner
            .rtp_observers
            .lock()
            .insert(rtp_observer_id, audio_level_observer.clone());

        {
            let rtp_observers_weak = Arc::downgrade(&self.inner.rtp_observers);

            audio_level_observer
                .on_internal_close(move || {
                    if let Some(rtp_observers) = rtp_observers_weak.upgrade() {
                        let removed = rtp_observers.lock().remove(&rtp_observer_id);
                        drop(removed);
                    }
                })
                .detach();
        }

        self.inner.handlers.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::AudioLevel(&audio_level_observer));
        });
        self.inner.handlers.observer.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::AudioLevel(&audio_level_observer));
        });

        Ok(audio_level_observer)
    }

    /// Pipes a [`Producer`] of this router into another router.
    ///
    /// A pipe consumer is created in this router and a pipe producer with the same id in the
    /// target router. Pipe transports between both routers are created once and reused.
    pub async fn pipe_producer_to_router(
        &self,
        producer_id: ProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeProducerToRouterPair, PipeProducerToRouterError> {
        debug!("pipe_producer_to_router()");

        if pipe_to_router_options.router.id() == self.id() {
            return Err(PipeProducerToRouterError::SameRouter);
        }

        let producer = self
            .inner
            .registry
            .get_producer(&producer_id)
            .ok_or(PipeProducerToRouterError::ProducerNotFound(producer_id))?;

        let pipe_transport_pair = self
            .get_or_create_pipe_transport_pair(pipe_to_router_options)
            .await
            .map_err(PipeProducerToRouterError::TransportFailed)?;

        let pipe_consumer = pipe_transport_pair
            .local
            .consume({
                let mut options = ConsumerOptions::new(
                    producer_id,
                    RtpCapabilities::from(self.rtp_capabilities().clone()),
                );
                options.paused = producer.paused();
                options
            })
            .await
            .map_err(PipeProducerToRouterError::ConsumeFailed)?;

        let pipe_producer = match pipe_transport_pair
            .remote
            .produce({
                let mut options = ProducerOptions::new_pipe_transport(
                    producer_id,
                    pipe_consumer.kind(),
                    pipe_consumer.rtp_parameters().clone(),
                );
                options.paused = pipe_consumer.producer_paused();
                options.app_data = producer.app_data().clone();
                options
            })
            .await
        {
            Ok(pipe_producer) => pipe_producer,
            Err(error) => {
                error!(
                    "pipe_producer_to_router() | error creating pipe producer: {}",
                    error,
                );
                pipe_consumer.close();
                return Err(PipeProducerToRouterError::ProduceFailed(error));
            }
        };

        // Pipe events from the pipe consumer to the pipe producer.
        {
            let observer = pipe_consumer.observer();

            let pipe_producer_weak = pipe_producer.downgrade();
            observer
                .on_close(move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        pipe_producer.close();
                    }
                })
                .detach();

            let executor = Arc::clone(&self.inner.executor);
            let pipe_producer_weak = pipe_producer.downgrade();
            observer
                .on_pause(move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_producer.pause().await {
                                    error!("failed to pause pipe producer: {}", error);
                                }
                            })
                            .detach();
                    }
                })
                .detach();

            let executor = Arc::clone(&self.inner.executor);
            let pipe_producer_weak = pipe_producer.downgrade();
            observer
                .on_resume(move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_producer.resume().await {
                                    error!("failed to resume pipe producer: {}", error);
                                }
                            })
                            .detach();
                    }
                })
                .detach();
        }

        // Pipe events from the pipe producer to the pipe consumer.
        {
            let pipe_consumer = pipe_consumer.clone();
            pipe_producer
                .observer()
                .on_close(move || {
                    pipe_consumer.close();
                })
                .detach();
        }

        Ok(PipeProducerToRouterPair {
            pipe_consumer,
            pipe_producer,
        })
    }

    /// Pipes a [`DataProducer`] of this router into another router.
    pub async fn pipe_data_producer_to_router(
        &self,
        data_producer_id: DataProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeDataProducerToRouterPair, PipeDataProducerToRouterError> {
        debug!("pipe_data_producer_to_router()");

        if pipe_to_router_options.router.id() == self.id() {
            return Err(PipeDataProducerToRouterError::SameRouter);
        }

        let data_producer = self
            .inner
            .registry
            .get_data_producer(&data_producer_id)
            .ok_or(PipeDataProducerToRouterError::DataProducerNotFound(
                data_producer_id,
            ))?;

        let pipe_transport_pair = self
            .get_or_create_pipe_transport_pair(pipe_to_router_options)
            .await
            .map_err(PipeDataProducerToRouterError::TransportFailed)?;

        let pipe_data_consumer = pipe_transport_pair
            .local
            .consume_data(DataConsumerOptions::new_sctp(data_producer_id))
            .await
            .map_err(PipeDataProducerToRouterError::ConsumeFailed)?;

        let pipe_data_producer = match pipe_transport_pair
            .remote
            .produce_data({
                let mut options = DataProducerOptions::new_pipe_transport(
                    data_producer_id,
                    pipe_data_consumer.sctp_stream_parameters(),
                );
                options.label = pipe_data_consumer.label().clone();
                options.protocol = pipe_data_consumer.protocol().clone();
                options.app_data = data_producer.app_data().clone();
                options
            })
            .await
        {
            Ok(pipe_data_producer) => pipe_data_producer,
            Err(error) => {
                error!(
                    "pipe_data_producer_to_router() | error creating pipe data producer: {}",
                    error,
                );
                pipe_data_consumer.close();
                return Err(PipeDataProducerToRouterError::ProduceFailed(error));
            }
        };

        {
            let pipe_data_producer_weak = pipe_data_producer.downgrade();
            pipe_data_consumer
                .observer()
                .on_close(move || {
                    if let Some(pipe_data_producer) = pipe_data_producer_weak.upgrade() {
                        pipe_data_producer.close();
                    }
                })
                .detach();
        }

        {
            let pipe_data_consumer = pipe_data_consumer.clone();
            pipe_data_producer
                .observer()
                .on_close(move || {
                    pipe_data_consumer.close();
                })
                .detach();
        }

        Ok(PipeDataProducerToRouterPair {
            pipe_data_consumer,
            pipe_data_producer,
        })
    }

    /// Check whether the given RTP capabilities are valid to consume the given producer.
    #[must_use]
    pub fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool {
        let producer = match self.inner.registry.get_producer(producer_id) {
            Some(producer) => producer,
            None => {
                error!("can_consume() | Producer with id \"{}\" not found", producer_id);
                return false;
            }
        };

        match ortc::can_consume(producer.consumable_rtp_parameters(), rtp_capabilities) {
            Ok(result) => result,
            Err(error) => {
                error!("can_consume() | unexpected error: {}", error);
                false
            }
        }
    }

    /// Callback is called when a new transport is created.
    pub fn on_new_transport<F: Fn(NewTransport<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_transport.add(Arc::new(callback))
    }

    /// Callback is called when a new RTP observer is created.
    pub fn on_new_rtp_observer<F: Fn(NewRtpObserver<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_rtp_observer.add(Arc::new(callback))
    }

    /// Callback is called when the worker this router belongs to is closed for whatever reason.
    /// The router itself is also closed.
    pub fn on_worker_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.worker_close.add(Box::new(callback))
    }

    /// Callback is called when the router is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.closed() {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    /// Coarse-grained events, meant for monitoring rather than for driving application logic.
    #[must_use]
    pub fn observer(&self) -> RouterObserver<'_> {
        RouterObserver { inner: &self.inner }
    }

    /// Closes the router, together with every transport and RTP observer created on it.
    pub fn close(&self) {
        self.inner.close(true);
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.internal_close.add(Box::new(callback))
    }

    pub(crate) fn worker_closed(&self) {
        if !self.closed() {
            self.inner.handlers.worker_close.call_simple();
            self.inner.close(false);
        }
    }

    fn transport_internal(&self, transport_id: TransportId) -> TransportInternal {
        TransportInternal {
            router_id: self.inner.id,
            transport_id,
        }
    }

    fn transport_core(
        &self,
        transport_id: TransportId,
        kind: TransportKind,
        sctp_parameters: Option<SctpParameters>,
        sctp_state: Option<SctpState>,
        app_data: AppData,
    ) -> TransportCore {
        TransportCore::new(
            transport_id,
            self.inner.id,
            kind,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            Arc::clone(&self.inner.registry) as Arc<dyn RouterAccessor>,
            Arc::clone(&self.inner.id_generator),
            sctp_parameters,
            sctp_state,
            app_data,
        )
    }

    fn add_transport(&self, transport: OwnedTransport) -> Result<(), CreateTransportError> {
        if self.closed() {
            transport.router_closed();
            return Err(CreateTransportError::RouterClosed);
        }

        let transport_id = transport.id();

        self.inner
            .transports
            .lock()
            .insert(transport_id, transport.clone());

        {
            let transports_weak = Arc::downgrade(&self.inner.transports);

            transport
                .on_internal_close(move || {
                    if let Some(transports) = transports_weak.upgrade() {
                        let removed = transports.lock().remove(&transport_id);
                        drop(removed);
                    }
                })
                .detach();
        }

        self.inner.handlers.new_transport.call(|callback| {
            callback(transport.as_new_transport());
        });
        self.inner.handlers.observer.new_transport.call(|callback| {
            callback(transport.as_new_transport());
        });

        Ok(())
    }

    async fn get_or_create_pipe_transport_pair(
        &self,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeTransportPair, PipeTransportPairError> {
        let PipeToRouterOptions {
            router,
            listen_ip,
            enable_sctp,
            num_sctp_streams,
        } = pipe_to_router_options;

        let remote_router_id = router.id();

        let slot = Arc::clone(
            self.inner
                .pipe_transport_pairs
                .lock()
                .entry(remote_router_id)
                .or_default(),
        );

        let mut slot = slot.lock().await;

        if let Some(pipe_transport_pair) = slot.as_ref() {
            if !pipe_transport_pair.closed() {
                return Ok(pipe_transport_pair.clone());
            }
        }

        let transport_options = {
            let mut options = PipeTransportOptions::new(listen_ip);
            options.enable_sctp = enable_sctp;
            options.num_sctp_streams = num_sctp_streams;
            options
        };

        let (local, remote) = future::zip(
            self.create_pipe_transport(transport_options.clone()),
            router.create_pipe_transport(transport_options),
        )
        .await;

        let (local, remote) = match (local, remote) {
            (Ok(local), Ok(remote)) => (local, remote),
            (local, remote) => {
                error!("pipe_to_router() | error creating pipe transport pair");

                let mut error = None;
                for result in [local, remote] {
                    match result {
                        Ok(transport) => transport.close(),
                        Err(e) => {
                            error.get_or_insert(e);
                        }
                    }
                }

                return Err(PipeTransportPairError::Create(
                    error.unwrap_or(CreateTransportError::RouterClosed),
                ));
            }
        };

        let local_tuple = local.tuple();
        let remote_tuple = remote.tuple();

        let (local_connected, remote_connected) = future::zip(
            local.connect(PipeTransportRemoteParameters::new(
                remote_tuple.local_ip,
                remote_tuple.local_port,
            )),
            remote.connect(PipeTransportRemoteParameters::new(
                local_tuple.local_ip,
                local_tuple.local_port,
            )),
        )
        .await;

        if let Err(error) = local_connected.and(remote_connected) {
            error!(
                "pipe_to_router() | error connecting pipe transport pair: {}",
                error,
            );
            local.close();
            remote.close();
            return Err(PipeTransportPairError::Connect(error));
        }

        Self::wire_pipe_transport_close(
            &local,
            remote.downgrade(),
            Arc::downgrade(&self.inner.pipe_transport_pairs),
            remote_router_id,
        );
        Self::wire_pipe_transport_close(
            &remote,
            local.downgrade(),
            Arc::downgrade(&self.inner.pipe_transport_pairs),
            remote_router_id,
        );

        let pipe_transport_pair = PipeTransportPair { local, remote };
        slot.replace(pipe_transport_pair.clone());

        Ok(pipe_transport_pair)
    }

    /// Closing either half of a pipe transport pair closes the other half and forgets the pair.
    fn wire_pipe_transport_close(
        transport: &PipeTransport,
        other: WeakPipeTransport,
        pipe_transport_pairs_weak: std::sync::Weak<PipeTransportPairs>,
        remote_router_id: RouterId,
    ) {
        transport
            .observer()
            .on_close(move || {
                if let Some(other) = other.upgrade() {
                    other.close();
                }
                if let Some(pipe_transport_pairs) = pipe_transport_pairs_weak.upgrade() {
                    let removed = pipe_transport_pairs.lock().remove(&remote_router_id);
                    drop(removed);
                }
            })
            .detach();
    }
}

/// Observer surface of a [`Router`].
pub struct RouterObserver<'a> {
    inner: &'a Inner,
}

impl<'a> RouterObserver<'a> {
    /// Callback is called when the router is closed for whatever reason, immediately if it is
    /// closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.observer.close.call_simple();
        }
        handler_id
    }

    /// Callback is called when a new transport is created.
    pub fn on_new_transport<F: Fn(NewTransport<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .observer
            .new_transport
            .add(Arc::new(callback))
    }

    /// Callback is called when a new RTP observer is created.
    pub fn on_new_rtp_observer<F: Fn(NewRtpObserver<'_>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .observer
            .new_rtp_observer
            .add(Arc::new(callback))
    }
}
