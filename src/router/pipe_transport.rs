
use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerOptions};
use crate::data_structures::{AppData, SctpState, TransportListenIp, TransportTuple};
use crate::messages::{TransportConnectPipeData, TransportConnectPipeRequest};
use crate::producer::{Producer, ProducerOptions};
use crate::router::RouterId;
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportCore,
    TransportId, TransportImpl, TransportObserver,
};
use crate::worker::{RequestError, SubscriptionHandler};
use async_trait::async_trait;
use event_listener_primitives::HandlerId;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

/// [`PipeTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeTransportOptions {
    /// Listening IP address.
    pub listen_ip: TransportListenIp,
    /// Create a SCTP association.
    /// Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by DataProducers.
    /// Default 268_435_456.
    pub max_sctp_message_size: u32,
    /// Enable RTX and NACK for RTP retransmission. Useful if both routers are located in
    /// different hosts and there is packet lost in the link. For this to work, both pipe
    /// transports must enable this setting.
    /// Default false.
    pub enable_rtx: bool,
    /// Custom application data.
    pub app_data: AppData,
}

impl PipeTransportOptions {
    /// Create pipe transport options with given listen IP.
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self {
            listen_ip,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 268_435_456,
            enable_rtx: false,
            app_data: AppData::default(),
        }
    }
}

/// Worker's answer to `router.createPipeTransport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipeTransportData {
    pub(crate) tuple: TransportTuple,
    #[serde(default)]
    pub(crate) sctp_parameters: Option<SctpParameters>,
    #[serde(default)]
    pub(crate) sctp_state: Option<SctpState>,
}

/// Remote parameters for [`PipeTransport::connect`], the local address of the other pipe
/// transport.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeTransportRemoteParameters {
    /// Remote IPv4 or IPv6.
    pub ip: IpAddr,
    /// Remote port.
    pub port: u16,
}

impl PipeTransportRemoteParameters {
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    SctpStateChange { sctp_state: SctpState },
}

struct Inner {
    core: TransportCore,
    tuple: Mutex<TransportTuple>,
    subscription_handler: Mutex<Option<SubscriptionHandler>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close(true);
    }
}

impl Inner {
    fn close(&self, close_request: bool) {
        self.subscription_handler.lock().take();
        self.core.close(close_request);
    }
}

/// A pipe transport represents a network path through which RTP, RTCP (optionally secured with
/// SRTP) and SCTP (DataChannel) is transmitted. Pipe transports are intended to intercommunicate
/// two [`Router`](crate::router::Router) instances collocated on the same host or on separate
/// hosts.
///
/// Producers created on a pipe transport keep the CNAME they were created with.
#[derive(Clone)]
pub struct PipeTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("core", &self.inner.core)
            .field("tuple", &self.inner.tuple)
            .finish()
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn id(&self) -> TransportId {
        self.inner.core.id()
    }

    fn router_id(&self) -> RouterId {
        self.inner.core.router_id()
    }

    fn app_data(&self) -> &AppData {
        self.inner.core.app_data()
    }

    fn closed(&self) -> bool {
        self.inner.core.closed()
    }

    fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.inner.core.sctp_parameters()
    }

    fn sctp_state(&self) -> Option<SctpState> {
        self.inner.core.sctp_state()
    }

    async fn produce(&self, producer_options: ProducerOptions) -> Result<Producer, ProduceError> {
        self.produce_impl(producer_options).await
    }

    async fn consume(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError> {
        self.consume_impl(consumer_options).await
    }

    async fn produce_data(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError> {
        self.produce_data_impl(data_producer_options).await
    }

    async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        self.consume_data_impl(data_consumer_options).await
    }

    async fn dump(&self) -> Result<Value, RequestError> {
        self.dump_impl().await
    }

    async fn get_stats(&self) -> Result<Vec<Value>, RequestError> {
        self.get_stats_impl().await
    }

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), RequestError> {
        self.set_max_incoming_bitrate_impl(bitrate).await
    }

    fn on_new_producer(
        &self,
        callback: Arc<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.inner.core.on_new_producer(callback)
    }

    fn on_new_consumer(
        &self,
        callback: Arc<dyn Fn(&Consumer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.inner.core.on_new_consumer(callback)
    }

    fn on_new_data_producer(
        &self,
        callback: Arc<dyn Fn(&DataProducer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.inner.core.on_new_data_producer(callback)
    }

    fn on_new_data_consumer(
        &self,
        callback: Arc<dyn Fn(&DataConsumer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.inner.core.on_new_data_consumer(callback)
    }

    fn on_sctp_state_change(
        &self,
        callback: Arc<dyn Fn(&SctpState) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.inner.core.on_sctp_state_change(callback)
    }

    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        self.inner.core.on_router_close(callback)
    }

    fn observer(&self) -> TransportObserver<'_> {
        TransportObserver::new(&self.inner.core)
    }

    fn close(&self) {
        self.inner.close(true);
    }
}

impl TransportImpl for PipeTransport {
    fn core(&self) -> &TransportCore {
        &self.inner.core
    }
}

impl PipeTransport {
    pub(crate) fn new(core: TransportCore, data: PipeTransportData) -> Self {
        debug!("new()");

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        let subscription_handler = {
            let inner_weak = Arc::clone(&inner_weak);

            core.channel()
                .subscribe_to_notifications(core.id().into(), move |notification| {
                    let inner = match inner_weak.lock().as_ref().and_then(Weak::upgrade) {
                        Some(inner) => inner,
                        None => return,
                    };

                    match notification.parse::<Notification>() {
                        Ok(Notification::SctpStateChange { sctp_state }) => {
                            inner.core.sctp_state_changed(sctp_state);
                        }
                        Err(error) => {
                            error!("Failed to parse notification: {}", error);
                        }
                    }
                })
        };

        let inner = Arc::new(Inner {
            core,
            tuple: Mutex::new(data.tuple),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// The transport tuple. It refers to both RTP and RTCP since pipe transports use RTCP-mux by
    /// design.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        *self.inner.tuple.lock()
    }

    /// Provides the pipe transport with the remote parameters.
    pub async fn connect(
        &self,
        remote_parameters: PipeTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        let response = self
            .inner
            .core
            .channel()
            .request(TransportConnectPipeRequest {
                internal: self.inner.core.internal(),
                data: TransportConnectPipeData {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                },
            })
            .await?;

        if let Some(tuple) = response.tuple {
            *self.inner.tuple.lock() = tuple;
        }

        Ok(())
    }

    /// Downgrade `PipeTransport` to [`WeakPipeTransport`] instance.
    #[must_use]
    pub fn downgrade(&self) -> WeakPipeTransport {
        WeakPipeTransport {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.core.on_internal_close(Box::new(callback))
    }

    pub(crate) fn router_closed(&self) {
        self.inner.subscription_handler.lock().take();
        self.inner.core.router_closed();
    }
}

/// [`WeakPipeTransport`] doesn't own the pipe transport and will not prevent one from being
/// destroyed once last instance of regular [`PipeTransport`] is dropped.
///
/// [`WeakPipeTransport`] vs [`PipeTransport`] is similar to [`Weak`] vs [`Arc`].
#[derive(Clone)]
pub struct WeakPipeTransport {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakPipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPipeTransport").finish()
    }
}

impl WeakPipeTransport {
    /// Attempts to upgrade `WeakPipeTransport` to [`PipeTransport`] if last instance of one
    /// wasn't dropped yet.
    #[must_use]
    pub fn upgrade(&self) -> Option<PipeTransport> {
        let inner = self.inner.upgrade()?;

        Some(PipeTransport { inner })
    }
}
