
use crate::consumer::{Consumer, ConsumerId, ConsumerOptions, ConsumerType};
use crate::data_consumer::{DataConsumer, DataConsumerId, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions, DataProducerType};
use crate::data_structures::{AppData, IdGenerator, SctpState};
use crate::messages::{
    ConsumerInternal, DataConsumerInternal, DataProducerInternal, ProducerInternal,
    TransportCloseRequest, TransportConsumeData, TransportConsumeDataData,
    TransportConsumeDataRequest, TransportConsumeRequest, TransportDumpRequest,
    TransportGetStatsRequest, TransportInternal, TransportProduceData,
    TransportProduceDataData, TransportProduceDataRequest, TransportProduceRequest,
    TransportSetMaxIncomingBitrateData, TransportSetMaxIncomingBitrateRequest,
};
use crate::ortc::{
    self, ConsumerRtpParametersError, RtpParametersError, RtpParametersMappingError,
};
use crate::producer::{Producer, ProducerId, ProducerOptions, ProducerType};
use crate::router::{RouterAccessor, RouterId};
use crate::rtp_parameters::{RtpEncodingParameters, RtpParameters};
use crate::sctp_parameters::SctpParameters;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, RequestError};
use async_executor::Executor;
use async_trait::async_trait;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

uuid_based_wrapper_type!(
    /// Transport identifier.
    TransportId
);

/// Error that caused [`Transport::produce`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProduceError {
    /// Producer with the same id already exists.
    #[error("Producer with the same id \"{0}\" already exists")]
    AlreadyExists(ProducerId),
    /// Incorrect RTP parameters.
    #[error("Incorrect RTP parameters: {0}")]
    IncorrectRtpParameters(RtpParametersError),
    /// RTP parameters use codecs the router can't route.
    #[error("RTP mapping error: {0}")]
    FailedRtpParametersMapping(RtpParametersMappingError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Transport was closed before the producer was created.
    #[error("Transport closed")]
    TransportClosed,
}

/// Error that caused [`Transport::consume`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsumeError {
    /// Producer with specified id not found.
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Invalid RTP capabilities of the consuming endpoint.
    #[error("Invalid RTP capabilities: {0}")]
    InvalidRtpCapabilities(RtpParametersError),
    /// Consuming endpoint can't decode any codec of the producer.
    #[error("Incompatible remote RTP capabilities: {0}")]
    IncompatibleRemoteRtpCapabilities(ConsumerRtpParametersError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Transport was closed before the consumer was created.
    #[error("Transport closed")]
    TransportClosed,
    /// Transport accepts media from multiple sources and can only receive.
    #[error("Transport is receive-only")]
    ReceiveOnly,
}

/// Error that caused [`Transport::produce_data`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProduceDataError {
    /// Data producer with the same id already exists.
    #[error("Data producer with the same id \"{0}\" already exists")]
    AlreadyExists(DataProducerId),
    /// SCTP is not enabled on this transport.
    #[error("SCTP not enabled")]
    SctpNotEnabled,
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Transport was closed before the data producer was created.
    #[error("Transport closed")]
    TransportClosed,
}

/// Error that caused [`Transport::consume_data`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsumeDataError {
    /// Data producer with specified id not found.
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// SCTP is not enabled on this transport.
    #[error("SCTP not enabled")]
    SctpNotEnabled,
    /// Both a packet life time and a retransmission limit were given, or one of them for an
    /// ordered data consumer.
    #[error("Invalid SCTP stream parameters")]
    InvalidSctpStreamParameters,
    /// Every outgoing SCTP stream of the transport is in use.
    #[error("No free sctpStreamId")]
    NoSctpStreamId,
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Transport was closed before the data consumer was created.
    #[error("Transport closed")]
    TransportClosed,
}

/// Stream ids a transport hands out to its data consumers.
///
/// Allocation goes round-robin from the slot after the last allocated one.
#[derive(Debug)]
pub(crate) struct SctpStreamIdPool {
    ids: Vec<bool>,
    next: usize,
}

impl SctpStreamIdPool {
    pub(crate) fn new(size: u16) -> Self {
        Self {
            ids: vec![false; usize::from(size)],
            next: 0,
        }
    }

    pub(crate) fn allocate(&mut self) -> Option<u16> {
        let len = self.ids.len();

        for offset in 0..len {
            let index = (self.next + offset) % len;
            if !self.ids[index] {
                self.ids[index] = true;
                self.next = (index + 1) % len;
                return u16::try_from(index).ok();
            }
        }

        None
    }

    pub(crate) fn release(&mut self, stream_id: u16) {
        if let Some(in_use) = self.ids.get_mut(usize::from(stream_id)) {
            *in_use = false;
        }
    }
}

/// Common interface of WebRTC, plain and pipe transports.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Transport id.
    fn id(&self) -> TransportId;

    /// Id of the router this transport belongs to.
    fn router_id(&self) -> RouterId;

    /// Custom application data.
    fn app_data(&self) -> &AppData;

    /// Whether the transport is closed.
    fn closed(&self) -> bool;

    /// Local SCTP parameters, `None` if SCTP is not enabled.
    fn sctp_parameters(&self) -> Option<SctpParameters>;

    /// Current SCTP state, `None` if SCTP is not enabled.
    fn sctp_state(&self) -> Option<SctpState>;

    /// Instructs the router to receive audio or video RTP (or SRTP depending on the transport).
    /// This is the way to inject media into the router.
    async fn produce(&self, producer_options: ProducerOptions) -> Result<Producer, ProduceError>;

    /// Instructs the router to send audio or video RTP (or SRTP depending on the transport).
    /// This is the way to extract media from the router.
    async fn consume(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError>;

    /// Instructs the router to receive data messages over SCTP.
    async fn produce_data(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError>;

    /// Instructs the router to send data messages to the endpoint over SCTP.
    async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError>;

    /// Dump Transport.
    #[doc(hidden)]
    async fn dump(&self) -> Result<Value, RequestError>;

    /// Returns current RTC statistics of the transport.
    async fn get_stats(&self) -> Result<Vec<Value>, RequestError>;

    /// Set maximum incoming bitrate for receiving media.
    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), RequestError>;

    /// Callback is called when a new producer is created.
    fn on_new_producer(&self, callback: Arc<dyn Fn(&Producer) + Send + Sync + 'static>)
        -> HandlerId;

    /// Callback is called when a new consumer is created.
    fn on_new_consumer(&self, callback: Arc<dyn Fn(&Consumer) + Send + Sync + 'static>)
        -> HandlerId;

    /// Callback is called when a new data producer is created.
    fn on_new_data_producer(
        &self,
        callback: Arc<dyn Fn(&DataProducer) + Send + Sync + 'static>,
    ) -> HandlerId;

    /// Callback is called when a new data consumer is created.
    fn on_new_data_consumer(
        &self,
        callback: Arc<dyn Fn(&DataConsumer) + Send + Sync + 'static>,
    ) -> HandlerId;

    /// Callback is called when the SCTP state changes.
    fn on_sctp_state_change(
        &self,
        callback: Arc<dyn Fn(&SctpState) + Send + Sync + 'static>,
    ) -> HandlerId;

    /// Callback is called when the router this transport belongs to is closed for whatever
    /// reason. The transport itself is also closed.
    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId;

    /// Coarse-grained events, meant for monitoring rather than for driving application logic.
    fn observer(&self) -> TransportObserver<'_>;

    /// Closes the transport, together with every producer, consumer, data producer and data
    /// consumer created on it.
    fn close(&self);
}

/// Observer surface of a [`Transport`].
pub struct TransportObserver<'a> {
    core: &'a TransportCore,
}

impl<'a> TransportObserver<'a> {
    pub(crate) fn new(core: &'a TransportCore) -> Self {
        Self { core }
    }

    /// Callback is called when the transport is closed for whatever reason, immediately if it
    /// is closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.core.handlers.observer.close.add(Box::new(callback));
        if self.core.closed() {
            self.core.handlers.observer.close.call_simple();
        }
        handler_id
    }

    pub fn on_new_producer<F: Fn(&Producer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.core
            .handlers
            .observer
            .new_producer
            .add(Arc::new(callback))
    }

    pub fn on_new_consumer<F: Fn(&Consumer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.core
            .handlers
            .observer
            .new_consumer
            .add(Arc::new(callback))
    }

    pub fn on_new_data_producer<F: Fn(&DataProducer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.core
            .handlers
            .observer
            .new_data_producer
            .add(Arc::new(callback))
    }

    pub fn on_new_data_consumer<F: Fn(&DataConsumer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.core
            .handlers
            .observer
            .new_data_consumer
            .add(Arc::new(callback))
    }
}

/// What kind of transport a [`TransportCore`] serves, decides CNAME and consumer policies.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum TransportKind {
    WebRtc,
    Plain,
    Pipe { enable_rtx: bool },
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct ObserverHandlers {
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    new_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>, Producer>,
    new_consumer: Bag<Arc<dyn Fn(&Consumer) + Send + Sync>, Consumer>,
    new_data_producer: Bag<Arc<dyn Fn(&DataProducer) + Send + Sync>, DataProducer>,
    new_data_consumer: Bag<Arc<dyn Fn(&DataConsumer) + Send + Sync>, DataConsumer>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>, Producer>,
    new_consumer: Bag<Arc<dyn Fn(&Consumer) + Send + Sync>, Consumer>,
    new_data_producer: Bag<Arc<dyn Fn(&DataProducer) + Send + Sync>, DataProducer>,
    new_data_consumer: Bag<Arc<dyn Fn(&DataConsumer) + Send + Sync>, DataConsumer>,
    sctp_state_change: Bag<Arc<dyn Fn(&SctpState) + Send + Sync>, SctpState>,
    router_close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer: ObserverHandlers,
}

/// State and behavior shared by every transport kind.
///
/// The core owns the four collections of children. It reaches its router only through the
/// injected [`RouterAccessor`].
pub(crate) struct TransportCore {
    id: TransportId,
    router_id: RouterId,
    kind: TransportKind,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    accessor: Arc<dyn RouterAccessor>,
    id_generator: Arc<dyn IdGenerator>,
    producers: Arc<Mutex<HashMap<ProducerId, Producer>>>,
    consumers: Arc<Mutex<HashMap<ConsumerId, Consumer>>>,
    data_producers: Arc<Mutex<HashMap<DataProducerId, DataProducer>>>,
    data_consumers: Arc<Mutex<HashMap<DataConsumerId, DataConsumer>>>,
    cname_for_producers: Mutex<Option<String>>,
    next_mid_for_consumers: AtomicU32,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Mutex<Option<SctpState>>,
    sctp_stream_ids: Option<Arc<Mutex<SctpStreamIdPool>>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
}

impl fmt::Debug for TransportCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCore")
            .field("id", &self.id)
            .field("router_id", &self.router_id)
            .field("kind", &self.kind)
            .field("sctp_parameters", &self.sctp_parameters)
            .field("sctp_state", &self.sctp_state)
            .field("closed", &self.closed)
            .finish()
    }
}

impl TransportCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TransportId,
        router_id: RouterId,
        kind: TransportKind,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        accessor: Arc<dyn RouterAccessor>,
        id_generator: Arc<dyn IdGenerator>,
        sctp_parameters: Option<SctpParameters>,
        sctp_state: Option<SctpState>,
        app_data: AppData,
    ) -> Self {
        let sctp_stream_ids = sctp_parameters
            .map(|sctp_parameters| Arc::new(Mutex::new(SctpStreamIdPool::new(sctp_parameters.mis))));

        Self {
            id,
            router_id,
            kind,
            executor,
            channel,
            accessor,
            id_generator,
            producers: Arc::default(),
            consumers: Arc::default(),
            data_producers: Arc::default(),
            data_consumers: Arc::default(),
            cname_for_producers: Mutex::new(None),
            next_mid_for_consumers: AtomicU32::new(0),
            sctp_parameters,
            sctp_state: Mutex::new(sctp_state),
            sctp_stream_ids,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> TransportId {
        self.id
    }

    pub(crate) fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub(crate) fn internal(&self) -> TransportInternal {
        TransportInternal {
            router_id: self.router_id,
            transport_id: self.id,
        }
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    pub(crate) fn executor(&self) -> &Arc<Executor<'static>> {
        &self.executor
    }

    pub(crate) fn app_data(&self) -> &AppData {
        &self.app_data
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.sctp_parameters
    }

    pub(crate) fn sctp_state(&self) -> Option<SctpState> {
        *self.sctp_state.lock()
    }

    pub(crate) fn producers(&self) -> Vec<Producer> {
        self.producers.lock().values().cloned().collect()
    }

    pub(crate) fn consumers(&self) -> Vec<Consumer> {
        self.consumers.lock().values().cloned().collect()
    }

    pub(crate) fn data_producers(&self) -> Vec<DataProducer> {
        self.data_producers.lock().values().cloned().collect()
    }

    pub(crate) fn data_consumers(&self) -> Vec<DataConsumer> {
        self.data_consumers.lock().values().cloned().collect()
    }

    pub(crate) fn sctp_state_changed(&self, sctp_state: SctpState) {
        self.sctp_state.lock().replace(sctp_state);

        self.handlers.sctp_state_change.call_simple(&sctp_state);
    }

    pub(crate) fn on_new_producer(
        &self,
        callback: Arc<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.new_producer.add(callback)
    }

    pub(crate) fn on_new_consumer(
        &self,
        callback: Arc<dyn Fn(&Consumer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.new_consumer.add(callback)
    }

    pub(crate) fn on_new_data_producer(
        &self,
        callback: Arc<dyn Fn(&DataProducer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.new_data_producer.add(callback)
    }

    pub(crate) fn on_new_data_consumer(
        &self,
        callback: Arc<dyn Fn(&DataConsumer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.new_data_consumer.add(callback)
    }

    pub(crate) fn on_sctp_state_change(
        &self,
        callback: Arc<dyn Fn(&SctpState) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.sctp_state_change.add(callback)
    }

    pub(crate) fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        self.handlers.router_close.add(callback)
    }

    pub(crate) fn on_internal_close(
        &self,
        callback: Box<dyn FnOnce() + Send + 'static>,
    ) -> HandlerId {
        self.handlers.internal_close.add(callback)
    }

    /// Closes every child and the transport itself. `close_request` is false when the worker
    /// already got rid of the transport.
    pub(crate) fn close(&self, close_request: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        // Maps are emptied before any child is closed, children remove themselves from them on
        // close.
        let producers = mem::take(&mut *self.producers.lock());
        for producer in producers.into_values() {
            producer.transport_closed();
        }
        let consumers = mem::take(&mut *self.consumers.lock());
        for consumer in consumers.into_values() {
            consumer.transport_closed();
        }
        let data_producers = mem::take(&mut *self.data_producers.lock());
        for data_producer in data_producers.into_values() {
            data_producer.transport_closed();
        }
        let data_consumers = mem::take(&mut *self.data_consumers.lock());
        for data_consumer in data_consumers.into_values() {
            data_consumer.transport_closed();
        }

        self.handlers.internal_close.call_simple();
        self.handlers.observer.close.call_simple();

        if close_request {
            let channel = self.channel.clone();
            let request = TransportCloseRequest {
                internal: self.internal(),
            };

            self.executor
                .spawn(async move {
                    match channel.request(request).await {
                        Ok(()) | Err(RequestError::ChannelClosed) => {}
                        Err(error) => {
                            error!("transport closing failed: {}", error);
                        }
                    }
                })
                .detach();
        }
    }

    /// Fires `router_close` and closes without asking the worker.
    pub(crate) fn router_closed(&self) {
        if !self.closed() {
            self.handlers.router_close.call_simple();
            self.close(false);
        }
    }

    /// Every producer of an ordinary transport shares the CNAME of the first one, or a random
    /// one if the first producer didn't declare any.
    fn apply_shared_cname(&self, rtp_parameters: &mut RtpParameters) {
        let mut cname_for_producers = self.cname_for_producers.lock();

        let cname = cname_for_producers.get_or_insert_with(|| {
            rtp_parameters.rtcp.cname.clone().unwrap_or_else(|| {
                let mut cname = Uuid::new_v4().to_simple().to_string();
                cname.truncate(8);
                cname
            })
        });

        rtp_parameters.rtcp.cname = Some(cname.clone());
    }

    fn next_mid(&self) -> String {
        let mid = self
            .next_mid_for_consumers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |mid| {
                Some(if mid + 1 >= 100_000_000 { 0 } else { mid + 1 })
            })
            .unwrap_or_default();

        mid.to_string()
    }

    fn add_producer(&self, producer: &Producer) {
        let producer_id = producer.id();

        self.producers.lock().insert(producer_id, producer.clone());
        self.accessor.register_producer(producer);

        {
            let producers_weak = Arc::downgrade(&self.producers);
            let accessor = Arc::clone(&self.accessor);

            producer
                .on_internal_close(move || {
                    if let Some(producers) = producers_weak.upgrade() {
                        let removed = producers.lock().remove(&producer_id);
                        drop(removed);
                    }
                    accessor.unregister_producer(&producer_id);
                })
                .detach();
        }

        self.handlers.new_producer.call_simple(producer);
        self.handlers.observer.new_producer.call_simple(producer);
    }

    fn add_consumer(&self, consumer: &Consumer) {
        let consumer_id = consumer.id();

        self.consumers.lock().insert(consumer_id, consumer.clone());

        {
            let consumers_weak = Arc::downgrade(&self.consumers);

            consumer
                .on_internal_close(move || {
                    if let Some(consumers) = consumers_weak.upgrade() {
                        let removed = consumers.lock().remove(&consumer_id);
                        drop(removed);
                    }
                })
                .detach();
        }

        self.handlers.new_consumer.call_simple(consumer);
        self.handlers.observer.new_consumer.call_simple(consumer);
    }

    fn add_data_producer(&self, data_producer: &DataProducer) {
        let data_producer_id = data_producer.id();

        self.data_producers
            .lock()
            .insert(data_producer_id, data_producer.clone());
        self.accessor.register_data_producer(data_producer);

        {
            let data_producers_weak = Arc::downgrade(&self.data_producers);
            let accessor = Arc::clone(&self.accessor);

            data_producer
                .on_internal_close(move || {
                    if let Some(data_producers) = data_producers_weak.upgrade() {
                        let removed = data_producers.lock().remove(&data_producer_id);
                        drop(removed);
                    }
                    accessor.unregister_data_producer(&data_producer_id);
                })
                .detach();
        }

        self.handlers.new_data_producer.call_simple(data_producer);
        self.handlers
            .observer
            .new_data_producer
            .call_simple(data_producer);
    }

    fn add_data_consumer(
        &self,
        data_consumer: &DataConsumer,
        stream_id: u16,
        sctp_stream_ids: &Arc<Mutex<SctpStreamIdPool>>,
    ) {
        let data_consumer_id = data_consumer.id();

        self.data_consumers
            .lock()
            .insert(data_consumer_id, data_consumer.clone());

        {
            let data_consumers_weak = Arc::downgrade(&self.data_consumers);
            let sctp_stream_ids = Arc::clone(sctp_stream_ids);

            data_consumer
                .on_internal_close(move || {
                    sctp_stream_ids.lock().release(stream_id);

                    if let Some(data_consumers) = data_consumers_weak.upgrade() {
                        let removed = data_consumers.lock().remove(&data_consumer_id);
                        drop(removed);
                    }
                })
                .detach();
        }

        self.handlers.new_data_consumer.call_simple(data_consumer);
        self.handlers
            .observer
            .new_data_consumer
            .call_simple(data_consumer);
    }
}

/// Shared implementation of the [`Transport`] methods, transports only provide their core.
#[async_trait]
pub(crate) trait TransportImpl: Transport {
    fn core(&self) -> &TransportCore;

    async fn dump_impl(&self) -> Result<Value, RequestError> {
        debug!("dump()");

        let core = self.core();

        let mut dump: Value = core
            .channel
            .request(TransportDumpRequest {
                internal: core.internal(),
            })
            .await?;

        // Children are listed from local bookkeeping.
        if let Value::Object(fields) = &mut dump {
            fields.insert(
                "producerIds".to_string(),
                core.producers().iter().map(|p| json!(p.id())).collect(),
            );
            fields.insert(
                "consumerIds".to_string(),
                core.consumers().iter().map(|c| json!(c.id())).collect(),
            );
            fields.insert(
                "dataProducerIds".to_string(),
                core.data_producers().iter().map(|p| json!(p.id())).collect(),
            );
            fields.insert(
                "dataConsumerIds".to_string(),
                core.data_consumers().iter().map(|c| json!(c.id())).collect(),
            );
        }

        Ok(dump)
    }

    async fn get_stats_impl(&self) -> Result<Vec<Value>, RequestError> {
        debug!("get_stats()");

        let core = self.core();

        core.channel
            .request(TransportGetStatsRequest {
                internal: core.internal(),
            })
            .await
    }

    async fn set_max_incoming_bitrate_impl(&self, bitrate: u32) -> Result<(), RequestError> {
        debug!("set_max_incoming_bitrate() [bitrate:{}]", bitrate);

        let core = self.core();

        core.channel
            .request(TransportSetMaxIncomingBitrateRequest {
                internal: core.internal(),
                data: TransportSetMaxIncomingBitrateData { bitrate },
            })
            .await
    }

    async fn produce_impl(
        &self,
        producer_options: ProducerOptions,
    ) -> Result<Producer, ProduceError> {
        debug!("produce()");

        let core = self.core();

        let ProducerOptions {
            id,
            kind,
            mut rtp_parameters,
            paused,
            key_frame_request_delay,
            app_data,
        } = producer_options;

        if let Some(id) = id {
            if core.producers.lock().contains_key(&id) {
                return Err(ProduceError::AlreadyExists(id));
            }
        }

        ortc::validate_rtp_parameters(kind, &rtp_parameters)
            .map_err(ProduceError::IncorrectRtpParameters)?;

        // No encodings stands for a single encoding with nothing set.
        if rtp_parameters.encodings.is_empty() {
            rtp_parameters.encodings = vec![RtpEncodingParameters::default()];
        }

        // Pipe producers keep their own CNAME, so they stay attributable end-to-end.
        if !matches!(core.kind, TransportKind::Pipe { .. }) {
            core.apply_shared_cname(&mut rtp_parameters);
        }

        let router_rtp_capabilities = core.accessor.rtp_capabilities();

        let rtp_mapping =
            ortc::get_producer_rtp_parameters_mapping(&rtp_parameters, router_rtp_capabilities)
                .map_err(ProduceError::FailedRtpParametersMapping)?;

        let consumable_rtp_parameters = ortc::get_consumable_rtp_parameters(
            kind,
            &rtp_parameters,
            router_rtp_capabilities,
            &rtp_mapping,
        );

        let producer_id = id.unwrap_or_else(|| ProducerId::generate(&*core.id_generator));
        let internal = ProducerInternal {
            router_id: core.router_id,
            transport_id: core.id,
            producer_id,
        };

        let response = core
            .channel
            .request(TransportProduceRequest {
                internal,
                data: TransportProduceData {
                    kind,
                    rtp_parameters: rtp_parameters.clone(),
                    rtp_mapping,
                    key_frame_request_delay,
                    paused,
                },
            })
            .await
            .map_err(ProduceError::Request)?;

        let producer = Producer::new(
            producer_id,
            kind,
            response.r#type,
            rtp_parameters,
            consumable_rtp_parameters,
            paused,
            internal,
            Arc::clone(&core.executor),
            core.channel.clone(),
            app_data,
        );

        if core.closed() {
            producer.transport_closed();
            return Err(ProduceError::TransportClosed);
        }

        core.add_producer(&producer);

        Ok(producer)
    }

    async fn consume_impl(
        &self,
        consumer_options: ConsumerOptions,
    ) -> Result<Consumer, ConsumeError> {
        debug!("consume()");

        let core = self.core();

        let ConsumerOptions {
            producer_id,
            rtp_capabilities,
            paused,
            preferred_layers,
            app_data,
        } = consumer_options;

        ortc::validate_rtp_capabilities(&rtp_capabilities)
            .map_err(ConsumeError::InvalidRtpCapabilities)?;

        let producer = core
            .accessor
            .get_producer(&producer_id)
            .ok_or(ConsumeError::ProducerNotFound(producer_id))?;

        let (rtp_parameters, r#type) = match core.kind {
            TransportKind::Pipe { enable_rtx } => (
                ortc::get_pipe_consumer_rtp_parameters(
                    producer.consumable_rtp_parameters(),
                    enable_rtx,
                ),
                ConsumerType::Pipe,
            ),
            TransportKind::WebRtc | TransportKind::Plain => {
                let mut rtp_parameters = ortc::get_consumer_rtp_parameters(
                    producer.consumable_rtp_parameters(),
                    &rtp_capabilities,
                )
                .map_err(ConsumeError::IncompatibleRemoteRtpCapabilities)?;

                rtp_parameters.mid = Some(core.next_mid());

                let r#type = match producer.r#type() {
                    ProducerType::Simple => ConsumerType::Simple,
                    ProducerType::Simulcast => ConsumerType::Simulcast,
                    ProducerType::Svc => ConsumerType::Svc,
                };

                (rtp_parameters, r#type)
            }
        };

        let consumer_id = ConsumerId::generate(&*core.id_generator);
        let internal = ConsumerInternal {
            router_id: core.router_id,
            transport_id: core.id,
            consumer_id,
            producer_id,
        };

        let response = core
            .channel
            .request(TransportConsumeRequest {
                internal,
                data: TransportConsumeData {
                    kind: producer.kind(),
                    rtp_parameters: rtp_parameters.clone(),
                    r#type,
                    consumable_rtp_encodings: producer
                        .consumable_rtp_parameters()
                        .encodings
                        .clone(),
                    paused,
                    preferred_layers,
                },
            })
            .await
            .map_err(ConsumeError::Request)?;

        let consumer = Consumer::new(
            consumer_id,
            producer_id,
            producer.kind(),
            r#type,
            rtp_parameters,
            response.paused,
            response.producer_paused,
            response.score,
            response.preferred_layers,
            internal,
            Arc::clone(&core.executor),
            core.channel.clone(),
            app_data,
        );

        if core.closed() {
            consumer.transport_closed();
            return Err(ConsumeError::TransportClosed);
        }

        core.add_consumer(&consumer);

        Ok(consumer)
    }

    async fn produce_data_impl(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError> {
        debug!("produce_data()");

        let core = self.core();

        if core.sctp_parameters.is_none() {
            return Err(ProduceDataError::SctpNotEnabled);
        }

        let DataProducerOptions {
            id,
            sctp_stream_parameters,
            label,
            protocol,
            app_data,
        } = data_producer_options;

        if let Some(id) = id {
            if core.data_producers.lock().contains_key(&id) {
                return Err(ProduceDataError::AlreadyExists(id));
            }
        }

        let data_producer_id =
            id.unwrap_or_else(|| DataProducerId::generate(&*core.id_generator));
        let internal = DataProducerInternal {
            router_id: core.router_id,
            transport_id: core.id,
            data_producer_id,
        };

        let response = core
            .channel
            .request(TransportProduceDataRequest {
                internal,
                data: TransportProduceDataData {
                    r#type: DataProducerType::Sctp,
                    sctp_stream_parameters,
                    label,
                    protocol,
                },
            })
            .await
            .map_err(ProduceDataError::Request)?;

        let data_producer = DataProducer::new(
            data_producer_id,
            response.r#type,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            internal,
            Arc::clone(&core.executor),
            core.channel.clone(),
            app_data,
        );

        if core.closed() {
            data_producer.transport_closed();
            return Err(ProduceDataError::TransportClosed);
        }

        core.add_data_producer(&data_producer);

        Ok(data_producer)
    }

    async fn consume_data_impl(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        debug!("consume_data()");

        let core = self.core();

        let sctp_stream_ids = core
            .sctp_stream_ids
            .as_ref()
            .ok_or(ConsumeDataError::SctpNotEnabled)?;

        let data_producer_id = data_consumer_options.data_producer_id;
        let data_producer = core
            .accessor
            .get_data_producer(&data_producer_id)
            .ok_or(ConsumeDataError::DataProducerNotFound(data_producer_id))?;

        let sctp_stream_parameters = data_consumer_options
            .stream_parameters(data_producer.sctp_stream_parameters(), 0)
            .ok_or(ConsumeDataError::InvalidSctpStreamParameters)?;

        // Taken synchronously, before the request, so concurrent calls never share an id.
        let stream_id = sctp_stream_ids
            .lock()
            .allocate()
            .ok_or(ConsumeDataError::NoSctpStreamId)?;
        let sctp_stream_parameters = sctp_stream_parameters.with_stream_id(stream_id);

        let data_consumer_id = DataConsumerId::generate(&*core.id_generator);
        let internal = DataConsumerInternal {
            router_id: core.router_id,
            transport_id: core.id,
            data_consumer_id,
            data_producer_id,
        };

        let response = match core
            .channel
            .request(TransportConsumeDataRequest {
                internal,
                data: TransportConsumeDataData {
                    r#type: DataProducerType::Sctp,
                    sctp_stream_parameters,
                    label: data_producer.label().clone(),
                    protocol: data_producer.protocol().clone(),
                },
            })
            .await
        {
            Ok(response) => response,
            Err(error) => {
                sctp_stream_ids.lock().release(stream_id);
                return Err(ConsumeDataError::Request(error));
            }
        };

        let data_consumer = DataConsumer::new(
            data_consumer_id,
            DataProducerType::Sctp,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            data_producer_id,
            internal,
            Arc::clone(&core.executor),
            core.channel.clone(),
            data_consumer_options.app_data,
        );

        if core.closed() {
            sctp_stream_ids.lock().release(stream_id);
            data_consumer.transport_closed();
            return Err(ConsumeDataError::TransportClosed);
        }

        core.add_data_consumer(&data_consumer, stream_id, sctp_stream_ids);

        Ok(data_consumer)
    }
}
