
use crate::consumer::{Consumer, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerOptions};
use crate::data_structures::{
    AppData, DtlsParameters, DtlsRole, DtlsState, IceCandidate, IceParameters, IceRole,
    IceState, SctpState, TransportListenIp, TransportTuple,
};
use crate::messages::{
    TransportConnectWebRtcData, TransportConnectWebRtcRequest, TransportRestartIceRequest,
};
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
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Struct that protects an invariant of having non-empty list of listen IPs.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct TransportListenIps(Vec<TransportListenIp>);

impl TransportListenIps {
    #[must_use]
    pub fn new(listen_ip: TransportListenIp) -> Self {
        Self(vec![listen_ip])
    }

    #[must_use]
    pub fn add(mut self, listen_ip: TransportListenIp) -> Self {
        self.0.push(listen_ip);
        self
    }
}

impl Deref for TransportListenIps {
    type Target = Vec<TransportListenIp>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Error, Debug, Eq, PartialEq)]
#[error("Empty list of listen IPs provided, should have at least one element")]
pub struct EmptyListError;

impl TryFrom<Vec<TransportListenIp>> for TransportListenIps {
    type Error = EmptyListError;

    fn try_from(listen_ips: Vec<TransportListenIp>) -> Result<Self, Self::Error> {
        if listen_ips.is_empty() {
            Err(EmptyListError)
        } else {
            Ok(Self(listen_ips))
        }
    }
}

/// WebRTC transport options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WebRtcTransportOptions {
    /// Listening IP address or addresses in order of preference (first one is the preferred
    /// one).
    pub listen_ips: TransportListenIps,
    /// Listen in UDP. Default true.
    pub enable_udp: bool,
    /// Listen in TCP. Default false.
    pub enable_tcp: bool,
    /// Prefer UDP. Default false.
    pub prefer_udp: bool,
    /// Prefer TCP. Default false.
    pub prefer_tcp: bool,
    /// Initial available outgoing bitrate (in bps). Default 600000.
    pub initial_available_outgoing_bitrate: u32,
    /// Create a SCTP association. Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by DataProducers.
    /// Default 262144.
    pub max_sctp_message_size: u32,
    /// Custom application data.
    pub app_data: AppData,
}

impl WebRtcTransportOptions {
    #[must_use]
    pub fn new(listen_ips: TransportListenIps) -> Self {
        Self {
            listen_ips,
            enable_udp: true,
            enable_tcp: false,
            prefer_udp: false,
            prefer_tcp: false,
            initial_available_outgoing_bitrate: 600_000,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

/// Worker's answer to `router.createWebRtcTransport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebRtcTransportData {
    pub(crate) ice_role: IceRole,
    pub(crate) ice_parameters: IceParameters,
    pub(crate) ice_candidates: Vec<IceCandidate>,
    pub(crate) ice_state: IceState,
    #[serde(default)]
    pub(crate) ice_selected_tuple: Option<TransportTuple>,
    pub(crate) dtls_parameters: DtlsParameters,
    pub(crate) dtls_state: DtlsState,
    #[serde(default)]
    pub(crate) dtls_remote_cert: Option<String>,
    #[serde(default)]
    pub(crate) sctp_parameters: Option<SctpParameters>,
    #[serde(default)]
    pub(crate) sctp_state: Option<SctpState>,
}

/// Remote parameters for [`WebRtcTransport::connect`].
#[derive(Debug, Clone)]
pub struct WebRtcTransportRemoteParameters {
    /// Remote DTLS parameters.
    pub dtls_parameters: DtlsParameters,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    ice_state_change: Bag<Arc<dyn Fn(&IceState) + Send + Sync>, IceState>,
    ice_selected_tuple_change: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>, TransportTuple>,
    dtls_state_change: Bag<Arc<dyn Fn(&DtlsState) + Send + Sync>, DtlsState>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    IceStateChange { ice_state: IceState },
    #[serde(rename_all = "camelCase")]
    IceSelectedTupleChange { ice_selected_tuple: TransportTuple },
    #[serde(rename_all = "camelCase")]
    DtlsStateChange {
        dtls_state: DtlsState,
        #[serde(default)]
        dtls_remote_cert: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange { sctp_state: SctpState },
}

struct Inner {
    core: TransportCore,
    data: Mutex<WebRtcTransportData>,
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

/// A WebRTC transport represents a network path negotiated by both, a WebRTC endpoint and the
/// SFU, via ICE and DTLS procedures.
#[derive(Clone)]
pub struct WebRtcTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcTransport")
            .field("core", &self.inner.core)
            .field("data", &self.inner.data)
            .finish()
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
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

impl TransportImpl for WebRtcTransport {
    fn core(&self) -> &TransportCore {
        &self.inner.core
    }
}

impl WebRtcTransport {
    pub(crate) fn new(core: TransportCore, data: WebRtcTransportData) -> Self {
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
                        Ok(Notification::IceStateChange { ice_state }) => {
                            inner.data.lock().ice_state = ice_state;
                            inner.handlers.ice_state_change.call_simple(&ice_state);
                        }
                        Ok(Notification::IceSelectedTupleChange { ice_selected_tuple }) => {
                            inner
                                .data
                                .lock()
                                .ice_selected_tuple
                                .replace(ice_selected_tuple);
                            inner
                                .handlers
                                .ice_selected_tuple_change
                                .call_simple(&ice_selected_tuple);
                        }
                        Ok(Notification::DtlsStateChange {
                            dtls_state,
                            dtls_remote_cert,
                        }) => {
                            {
                                let mut data = inner.data.lock();
                                data.dtls_state = dtls_state;
                                if dtls_state == DtlsState::Connected {
                                    data.dtls_remote_cert = dtls_remote_cert;
                                }
                            }
                            inner.handlers.dtls_state_change.call_simple(&dtls_state);
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
            data: Mutex::new(data),
            handlers: Handlers::default(),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Local ICE role. Due to the ICE Lite design, this is always `Controlled`.
    #[must_use]
    pub fn ice_role(&self) -> IceRole {
        self.inner.data.lock().ice_role
    }

    /// Local ICE parameters.
    #[must_use]
    pub fn ice_parameters(&self) -> IceParameters {
        self.inner.data.lock().ice_parameters.clone()
    }

    /// Local ICE candidates.
    #[must_use]
    pub fn ice_candidates(&self) -> Vec<IceCandidate> {
        self.inner.data.lock().ice_candidates.clone()
    }

    /// Current ICE state.
    #[must_use]
    pub fn ice_state(&self) -> IceState {
        self.inner.data.lock().ice_state
    }

    /// The selected transport tuple if ICE is in `Connected` or `Completed` state. It is `None`
    /// if ICE is not established (no working candidate pair was found).
    #[must_use]
    pub fn ice_selected_tuple(&self) -> Option<TransportTuple> {
        self.inner.data.lock().ice_selected_tuple
    }

    /// Local DTLS parameters. The role is the one negotiated by [`WebRtcTransport::connect`].
    #[must_use]
    pub fn dtls_parameters(&self) -> DtlsParameters {
        self.inner.data.lock().dtls_parameters.clone()
    }

    /// Current DTLS state.
    #[must_use]
    pub fn dtls_state(&self) -> DtlsState {
        self.inner.data.lock().dtls_state
    }

    /// The remote certificate in PEM format. It is set once the DTLS state becomes `Connected`.
    #[must_use]
    pub fn dtls_remote_cert(&self) -> Option<String> {
        self.inner.data.lock().dtls_remote_cert.clone()
    }

    /// Provides the WebRTC transport with the endpoint parameters.
    pub async fn connect(
        &self,
        remote_parameters: WebRtcTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        let response = self
            .inner
            .core
            .channel()
            .request(TransportConnectWebRtcRequest {
                internal: self.inner.core.internal(),
                data: TransportConnectWebRtcData {
                    dtls_parameters: remote_parameters.dtls_parameters,
                },
            })
            .await?;

        self.set_dtls_local_role(response.dtls_local_role);

        Ok(())
    }

    /// Restarts the ICE layer by generating new local ICE parameters that must be signaled to
    /// the remote endpoint.
    pub async fn restart_ice(&self) -> Result<IceParameters, RequestError> {
        debug!("restart_ice()");

        let response = self
            .inner
            .core
            .channel()
            .request(TransportRestartIceRequest {
                internal: self.inner.core.internal(),
            })
            .await?;

        self.inner.data.lock().ice_parameters = response.ice_parameters.clone();

        Ok(response.ice_parameters)
    }

    /// Callback is called when the transport ICE state changes.
    pub fn on_ice_state_change<F: Fn(&IceState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.ice_state_change.add(Arc::new(callback))
    }

    /// Callback is called after ICE state becomes `Completed` and when the ICE selected tuple
    /// changes.
    pub fn on_ice_selected_tuple_change<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .ice_selected_tuple_change
            .add(Arc::new(callback))
    }

    /// Callback is called when the transport DTLS state changes.
    pub fn on_dtls_state_change<F: Fn(&DtlsState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.dtls_state_change.add(Arc::new(callback))
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.core.on_internal_close(Box::new(callback))
    }

    pub(crate) fn router_closed(&self) {
        self.inner.subscription_handler.lock().take();
        self.inner.core.router_closed();
    }

    fn set_dtls_local_role(&self, dtls_local_role: DtlsRole) {
        self.inner.data.lock().dtls_parameters.role = dtls_local_role;
    }
}
