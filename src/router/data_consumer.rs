
use crate::data_producer::{DataProducerId, DataProducerType};
use crate::data_structures::AppData;
use crate::messages::{
    DataConsumerCloseRequest, DataConsumerDumpRequest, DataConsumerGetStatsRequest,
    DataConsumerInternal,
};
use crate::sctp_parameters::SctpStreamParameters;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use event_listener_primitives::{BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// Data consumer identifier.
    DataConsumerId
);

/// Data consumer options.
///
/// Reliability settings that are not given are inherited from the data producer.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataConsumerOptions {
    /// The id of the data producer to consume.
    pub data_producer_id: DataProducerId,
    /// Just if consuming over SCTP. Whether data messages must be received in order.
    pub ordered: Option<bool>,
    /// Just if consuming over SCTP. When ordered is false indicates the time (in milliseconds)
    /// after which a SCTP packet will stop being retransmitted.
    pub max_packet_life_time: Option<u16>,
    /// Just if consuming over SCTP. When ordered is false indicates the maximum number of times
    /// a packet will be retransmitted.
    pub max_retransmits: Option<u16>,
    /// Custom application data.
    pub app_data: AppData,
}

impl DataConsumerOptions {
    /// Consume with the same reliability settings as the data producer.
    #[must_use]
    pub fn new_sctp(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: None,
            max_packet_life_time: None,
            max_retransmits: None,
            app_data: AppData::default(),
        }
    }

    /// Messages will be sent reliably in order.
    #[must_use]
    pub fn new_sctp_ordered(data_producer_id: DataProducerId) -> Self {
        Self {
            ordered: Some(true),
            ..Self::new_sctp(data_producer_id)
        }
    }

    /// Messages will be sent unreliably with time (in milliseconds) after which a SCTP packet
    /// will stop being retransmitted.
    #[must_use]
    pub fn new_sctp_unordered_with_life_time(
        data_producer_id: DataProducerId,
        max_packet_life_time: u16,
    ) -> Self {
        Self {
            ordered: Some(false),
            max_packet_life_time: Some(max_packet_life_time),
            ..Self::new_sctp(data_producer_id)
        }
    }

    /// Messages will be sent unreliably with a limited number of retransmission attempts.
    #[must_use]
    pub fn new_sctp_unordered_with_retransmits(
        data_producer_id: DataProducerId,
        max_retransmits: u16,
    ) -> Self {
        Self {
            ordered: Some(false),
            max_retransmits: Some(max_retransmits),
            ..Self::new_sctp(data_producer_id)
        }
    }

    /// Stream parameters for the data consumer on the given outgoing stream, `None` when the
    /// options mix mutually exclusive reliability settings.
    pub(crate) fn stream_parameters(
        &self,
        producer_parameters: SctpStreamParameters,
        stream_id: u16,
    ) -> Option<SctpStreamParameters> {
        let inherit = self.ordered.is_none()
            && self.max_packet_life_time.is_none()
            && self.max_retransmits.is_none();
        if inherit {
            return Some(producer_parameters.with_stream_id(stream_id));
        }

        match (
            self.ordered.unwrap_or(true),
            self.max_packet_life_time,
            self.max_retransmits,
        ) {
            (true, None, None) => Some(SctpStreamParameters::new_ordered(stream_id)),
            (false, Some(max_packet_life_time), None) => Some(
                SctpStreamParameters::new_unordered_with_life_time(stream_id, max_packet_life_time),
            ),
            (false, None, Some(max_retransmits)) => Some(
                SctpStreamParameters::new_unordered_with_retransmits(stream_id, max_retransmits),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    DataProducerClose,
}

#[derive(Default)]
struct Handlers {
    data_producer_close: BagOnce<Box<dyn FnOnce() + Send>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer_close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: DataConsumerId,
    r#type: DataProducerType,
    sctp_stream_parameters: SctpStreamParameters,
    label: String,
    protocol: String,
    data_producer_id: DataProducerId,
    internal: DataConsumerInternal,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    handlers: Arc<Handlers>,
    app_data: AppData,
    closed: AtomicBool,
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
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.subscription_handler.lock().take();

            self.handlers.internal_close.call_simple();
            self.handlers.observer_close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = DataConsumerCloseRequest {
                    internal: self.internal,
                };

                self.executor
                    .spawn(async move {
                        match channel.request(request).await {
                            Ok(()) | Err(RequestError::ChannelClosed) => {}
                            Err(error) => {
                                error!("data consumer closing failed: {}", error);
                            }
                        }
                    })
                    .detach();
            }
        }
    }
}

/// A data consumer represents an endpoint capable of receiving data messages from a router. A
/// data consumer can use SCTP (AKA DataChannel) to receive those messages.
///
/// Its stream id is taken from the transport's pool and given back once it is closed.
#[derive(Clone)]
pub struct DataConsumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConsumer")
            .field("id", &self.inner.id)
            .field("type", &self.inner.r#type)
            .field("sctp_stream_parameters", &self.inner.sctp_stream_parameters)
            .field("label", &self.inner.label)
            .field("protocol", &self.inner.protocol)
            .field("data_producer_id", &self.inner.data_producer_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl DataConsumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: DataConsumerId,
        r#type: DataProducerType,
        sctp_stream_parameters: SctpStreamParameters,
        label: String,
        protocol: String,
        data_producer_id: DataProducerId,
        internal: DataConsumerInternal,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        let subscription_handler = {
            let inner_weak = Arc::clone(&inner_weak);

            channel.subscribe_to_notifications(id.into(), move |notification| {
                match notification.parse::<Notification>() {
                    Ok(Notification::DataProducerClose) => {
                        let inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                        if let Some(inner) = inner {
                            if !inner.closed.load(Ordering::SeqCst) {
                                inner.handlers.data_producer_close.call_simple();
                                inner.close(false);
                            }
                        }
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            })
        };

        let inner = Arc::new(Inner {
            id,
            r#type,
            sctp_stream_parameters,
            label,
            protocol,
            data_producer_id,
            internal,
            executor,
            channel,
            handlers,
            app_data,
            closed: AtomicBool::new(false),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Data consumer id.
    #[must_use]
    pub fn id(&self) -> DataConsumerId {
        self.inner.id
    }

    /// The associated data producer id.
    #[must_use]
    pub fn data_producer_id(&self) -> DataProducerId {
        self.inner.data_producer_id
    }

    /// The type of the data consumer.
    #[must_use]
    pub fn r#type(&self) -> DataProducerType {
        self.inner.r#type
    }

    /// The SCTP stream parameters, the stream id being the one taken from the transport.
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> SctpStreamParameters {
        self.inner.sctp_stream_parameters
    }

    /// The data channel label.
    #[must_use]
    pub fn label(&self) -> &String {
        &self.inner.label
    }

    /// The data channel sub-protocol.
    #[must_use]
    pub fn protocol(&self) -> &String {
        &self.inner.protocol
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the data consumer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump DataConsumer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<Value, RequestError> {
        debug!("dump()");

        self.inner
            .channel
            .request(DataConsumerDumpRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Returns current statistics of the data consumer.
    pub async fn get_stats(&self) -> Result<Vec<Value>, RequestError> {
        debug!("get_stats()");

        self.inner
            .channel
            .request(DataConsumerGetStatsRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Callback is called when the associated data producer is closed for whatever reason. The
    /// data consumer itself is also closed.
    pub fn on_data_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner
            .handlers
            .data_producer_close
            .add(Box::new(callback))
    }

    /// Callback is called when the transport this data consumer belongs to is closed for
    /// whatever reason. The data consumer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    #[must_use]
    pub fn observer(&self) -> DataConsumerObserver<'_> {
        DataConsumerObserver { inner: &self.inner }
    }

    /// Closes the data consumer.
    pub fn close(&self) {
        self.inner.close(true);
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.internal_close.add(Box::new(callback))
    }

    pub(crate) fn transport_closed(&self) {
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.transport_close.call_simple();
            self.inner.close(false);
        }
    }
}

pub struct DataConsumerObserver<'a> {
    inner: &'a Inner,
}

impl<'a> DataConsumerObserver<'a> {
    /// Callback is called when the data consumer is closed for whatever reason, immediately if
    /// it is closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer_close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.observer_close.call_simple();
        }
        handler_id
    }
}
