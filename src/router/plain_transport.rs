#[cfg(test)]
mod tests;

use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerOptions};
use crate::data_structures::{AppData, SctpState, TransportListenIp, TransportTuple};
use crate::messages::{TransportConnectPlainData, TransportConnectPlainRequest};
use crate::producer::{Producer, ProducerOptions};
use crate::router::RouterId;
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportCore,
    TransportId, TransportImpl, TransportObserver,
};
use crate::worker::{RequestError, SubscriptionHandler};
use async_trait::async_trait;
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

/// [`PlainTransport`] options.
///
/// # Notes on usage
/// * `comedia` mode just makes sense when the remote endpoint is going to produce RTP on this
///   transport. Otherwise there is no way to detect its remote IP and port.
/// * Do not use `comedia` mode if the remote endpoint only consumes, call
///   [`PlainTransport::connect()`] with its IP and port(s) instead.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PlainTransportOptions {
    /// Listening IP address.
    pub listen_ip: TransportListenIp,
    /// Use RTCP-mux (RTP and RTCP in the same port).
    /// Default true.
    pub rtcp_mux: bool,
    /// Whether remote IP:port should be auto-detected based on first RTP/RTCP packet received.
    /// Ignored if `multi_source` is set.
    /// Default false.
    pub comedia: bool,
    /// Accept RTP and RTCP from different remote IPs and ports. Such a transport only receives
    /// media, [`Transport::consume`] is rejected on it and it must not be connected.
    /// Default false.
    pub multi_source: bool,
    /// Create a SCTP association.
    /// Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by DataProducers.
    /// Default 262144.
    pub max_sctp_message_size: u32,
    /// Custom application data.
    pub app_data: AppData,
}

impl PlainTransportOptions {
    /// Create plain transport options with given listen IP.
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self {
            listen_ip,
            rtcp_mux: true,
            comedia: false,
            multi_source: false,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

/// Worker's answer to `router.createPlainRtpTransport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlainTransportData {
    pub(crate) tuple: TransportTuple,
    #[serde(default)]
    pub(crate) rtcp_tuple: Option<TransportTuple>,
    #[serde(default)]
    pub(crate) sctp_parameters: Option<SctpParameters>,
    #[serde(default)]
    pub(crate) sctp_state: Option<SctpState>,
}

/// Remote parameters for [`PlainTransport::connect`].
///
/// Every field is optional, in `comedia` mode the remote address is learned from the first
/// received packet.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct PlainTransportRemoteParameters {
    /// Remote IPv4 or IPv6.
    pub ip: Option<IpAddr>,
    /// Remote port.
    pub port: Option<u16>,
    /// Remote RTCP port, only when RTCP-mux is not used.
    pub rtcp_port: Option<u16>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    tuple: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>, TransportTuple>,
    rtcp_tuple: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>, TransportTuple>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Tuple {
        tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    RtcpTuple {
        rtcp_tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange {
        sctp_state: SctpState,
    },
}

#[derive(Debug)]
struct Tuples {
    tuple: TransportTuple,
    rtcp_tuple: Option<TransportTuple>,
}

struct Inner {
    core: TransportCore,
    multi_source: bool,
    tuples: Mutex<Tuples>,
    handlers: Handlers,
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

/// A plain transport represents a network path through which plain RTP and RTCP is
/// transmitted, typically towards media tools like FFmpeg or GStreamer.
#[derive(Clone)]
pub struct PlainTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for PlainTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTransport")
            .field("core", &self.inner.core)
            .field("multi_source", &self.inner.multi_source)
            .field("tuples", &self.inner.tuples)
            .finish()
    }
}

#[async_trait]
impl Transport for PlainTransport {
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
        if self.inner.multi_source {
            return Err(ConsumeError::ReceiveOnly);
        }

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

impl TransportImpl for PlainTransport {
    fn core(&self) -> &TransportCore {
        &self.inner.core
    }
}

impl PlainTransport {
    pub(crate) fn new(core: TransportCore, multi_source: bool, data: PlainTransportData) -> Self {
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
                        Ok(Notification::Tuple { tuple }) => {
                            inner.tuples.lock().tuple = tuple;
                            inner.handlers.tuple.call_simple(&tuple);
                        }
                        Ok(Notification::RtcpTuple { rtcp_tuple }) => {
                            inner.tuples.lock().rtcp_tuple.replace(rtcp_tuple);
                            inner.handlers.rtcp_tuple.call_simple(&rtcp_tuple);
                        }
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
            multi_source,
            tuples: Mutex::new(Tuples {
                tuple: data.tuple,
                rtcp_tuple: data.rtcp_tuple,
            }),
            handlers: Handlers::default(),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// The transport tuple. If RTCP-mux is enabled, this tuple refers to both RTP and RTCP.
    ///
    /// In `comedia` mode the remote part is only known once the first packet arrives.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        self.inner.tuples.lock().tuple
    }

    /// Whether the transport accepts media from multiple remote sources.
    #[must_use]
    pub fn multi_source(&self) -> bool {
        self.inner.multi_source
    }

    /// The transport tuple for RTCP, `None` if RTCP-mux is enabled.
    #[must_use]
    pub fn rtcp_tuple(&self) -> Option<TransportTuple> {
        self.inner.tuples.lock().rtcp_tuple
    }

    /// Provides the plain transport with the endpoint parameters.
    pub async fn connect(
        &self,
        remote_parameters: PlainTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        let response = self
            .inner
            .core
            .channel()
            .request(TransportConnectPlainRequest {
                internal: self.inner.core.internal(),
                data: TransportConnectPlainData {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                    rtcp_port: remote_parameters.rtcp_port,
                },
            })
            .await?;

        let mut tuples = self.inner.tuples.lock();
        if let Some(tuple) = response.tuple {
            tuples.tuple = tuple;
        }
        if let Some(rtcp_tuple) = response.rtcp_tuple {
            tuples.rtcp_tuple.replace(rtcp_tuple);
        }

        Ok(())
    }

    /// Callback is called after the remote RTP origin has been discovered. Only if `comedia`
    /// mode was set.
    pub fn on_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.tuple.add(Arc::new(callback))
    }

    /// Callback is called after the remote RTCP origin has been discovered. Only if `comedia`
    /// mode was set and `rtcp_mux` was not.
    pub fn on_rtcp_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.rtcp_tuple.add(Arc::new(callback))
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.core.on_internal_close(Box::new(callback))
    }

    pub(crate) fn router_closed(&self) {
        self.inner.subscription_handler.lock().take();
        self.inner.core.router_closed();
    }
}
