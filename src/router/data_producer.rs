
use crate::data_structures::AppData;
use crate::messages::{
    DataProducerCloseRequest, DataProducerDumpRequest, DataProducerGetStatsRequest,
    DataProducerInternal,
};
use crate::sctp_parameters::SctpStreamParameters;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, RequestError};
use async_executor::Executor;
use event_listener_primitives::{BagOnce, HandlerId};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// Data producer identifier.
    DataProducerId
);

/// Data producer options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataProducerOptions {
    /// Data producer id, only set when piping an existing data producer into another router.
    pub(crate) id: Option<DataProducerId>,
    /// SCTP parameters defining how the endpoint is sending the data.
    pub sctp_stream_parameters: SctpStreamParameters,
    /// A label which can be used to distinguish this DataChannel from others.
    pub label: String,
    /// Name of the sub-protocol used by this DataChannel.
    pub protocol: String,
    /// Custom application data.
    pub app_data: AppData,
}

impl DataProducerOptions {
    #[must_use]
    pub fn new_sctp(sctp_stream_parameters: SctpStreamParameters) -> Self {
        Self {
            id: None,
            sctp_stream_parameters,
            label: String::new(),
            protocol: String::new(),
            app_data: AppData::default(),
        }
    }

    /// Options for the remote half of a piped data producer, reusing the original id.
    #[must_use]
    pub(crate) fn new_pipe_transport(
        data_producer_id: DataProducerId,
        sctp_stream_parameters: SctpStreamParameters,
    ) -> Self {
        Self {
            id: Some(data_producer_id),
            ..Self::new_sctp(sctp_stream_parameters)
        }
    }
}

/// Data producer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataProducerType {
    /// The endpoint sends messages using the SCTP protocol.
    Sctp,
}

#[derive(Default)]
struct Handlers {
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer_close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: DataProducerId,
    r#type: DataProducerType,
    sctp_stream_parameters: SctpStreamParameters,
    label: String,
    protocol: String,
    internal: DataProducerInternal,
    executor: Arc<Executor<'static>>,
    channel: Channel,
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
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            self.handlers.internal_close.call_simple();
            self.handlers.observer_close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = DataProducerCloseRequest {
                    internal: self.internal,
                };

                self.executor
                    .spawn(async move {
                        match channel.request(request).await {
                            Ok(()) | Err(RequestError::ChannelClosed) => {}
                            Err(error) => {
                                error!("data producer closing failed: {}", error);
                            }
                        }
                    })
                    .detach();
            }
        }
    }
}

/// A data producer represents an endpoint capable of injecting data messages into a router. A
/// data producer can use SCTP (AKA DataChannel) to deliver those messages.
#[derive(Clone)]
pub struct DataProducer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DataProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProducer")
            .field("id", &self.inner.id)
            .field("type", &self.inner.r#type)
            .field("sctp_stream_parameters", &self.inner.sctp_stream_parameters)
            .field("label", &self.inner.label)
            .field("protocol", &self.inner.protocol)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl DataProducer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: DataProducerId,
        r#type: DataProducerType,
        sctp_stream_parameters: SctpStreamParameters,
        label: String,
        protocol: String,
        internal: DataProducerInternal,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            r#type,
            sctp_stream_parameters,
            label,
            protocol,
            internal,
            executor,
            channel,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        });

        Self { inner }
    }

    /// Data producer id.
    #[must_use]
    pub fn id(&self) -> DataProducerId {
        self.inner.id
    }

    /// The type of the data producer.
    #[must_use]
    pub fn r#type(&self) -> DataProducerType {
        self.inner.r#type
    }

    /// The SCTP stream parameters.
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> SctpStreamParameters {
        self.inner.sctp_stream_parameters
    }

    /// The DataChannel label.
    #[must_use]
    pub fn label(&self) -> &String {
        &self.inner.label
    }

    /// The DataChannel sub-protocol.
    #[must_use]
    pub fn protocol(&self) -> &String {
        &self.inner.protocol
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the data producer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump DataProducer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<Value, RequestError> {
        debug!("dump()");

        self.inner
            .channel
            .request(DataProducerDumpRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Returns current statistics of the data producer.
    pub async fn get_stats(&self) -> Result<Vec<Value>, RequestError> {
        debug!("get_stats()");

        self.inner
            .channel
            .request(DataProducerGetStatsRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Callback is called when the transport this data producer belongs to is closed for
    /// whatever reason. The data producer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Observer surface of the data producer.
    #[must_use]
    pub fn observer(&self) -> DataProducerObserver<'_> {
        DataProducerObserver { inner: &self.inner }
    }

    /// Closes the data producer. Data consumers of it are closed by the worker afterwards.
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

    pub(crate) fn downgrade(&self) -> WeakDataProducer {
        WeakDataProducer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Observer surface of a [`DataProducer`].
pub struct DataProducerObserver<'a> {
    inner: &'a Inner,
}

impl<'a> DataProducerObserver<'a> {
    /// Callback is called when the data producer is closed for whatever reason, immediately if
    /// it is closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer_close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.observer_close.call_simple();
        }
        handler_id
    }
}

#[derive(Clone)]
pub(crate) struct WeakDataProducer {
    inner: Weak<Inner>,
}

impl WeakDataProducer {
    pub(crate) fn upgrade(&self) -> Option<DataProducer> {
        let inner = self.inner.upgrade()?;

        Some(DataProducer { inner })
    }
}
