#[cfg(test)]
mod tests;

use crate::data_structures::{AppData, TraceEventDirection};
use crate::messages::{
    ConsumerCloseRequest, ConsumerDumpRequest, ConsumerEnableTraceEventData,
    ConsumerEnableTraceEventRequest, ConsumerGetStatsRequest, ConsumerInternal,
    ConsumerPauseRequest, ConsumerRequestKeyFrameRequest, ConsumerResumeRequest,
    ConsumerSetPreferredLayersRequest, ConsumerSetPriorityData, ConsumerSetPriorityRequest,
};
use crate::producer::ProducerId;
use crate::rtp_parameters::{MediaKind, RtpCapabilities, RtpParameters};
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// Consumer identifier.
    ConsumerId
);

/// Spatial/temporal layers of a simulcast or SVC stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    /// The spatial layer index (from 0 to N).
    pub spatial_layer: u8,
    /// The temporal layer index (from 0 to N), highest available when not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_layer: Option<u8>,
}

/// Score of the consumer and of the producer it consumes.
#[derive(Debug, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerScore {
    /// The score of the RTP stream of the consumer, from 0 to 10.
    pub score: u8,
    /// The score of the currently selected RTP stream of the producer, from 0 to 10.
    pub producer_score: u8,
    /// The scores of all RTP streams in the producer ordered by encoding.
    #[serde(default)]
    pub producer_scores: Vec<u8>,
}

/// Consumer options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ConsumerOptions {
    /// The id of the producer to consume.
    pub producer_id: ProducerId,
    /// RTP capabilities of the consuming endpoint.
    pub rtp_capabilities: RtpCapabilities,
    /// Whether the consumer must start in paused mode. Default false.
    ///
    /// When creating a video consumer, it's recommended to set paused to true, then transmit the
    /// consumer parameters to the consuming endpoint and, once it has created its local side
    /// consumer, unpause the server side consumer using [`Consumer::resume`].
    pub paused: bool,
    /// Preferred spatial and temporal layer for simulcast or SVC media sources.
    pub preferred_layers: Option<ConsumerLayers>,
    /// Custom application data.
    pub app_data: AppData,
}

impl ConsumerOptions {
    #[must_use]
    pub fn new(producer_id: ProducerId, rtp_capabilities: RtpCapabilities) -> Self {
        Self {
            producer_id,
            rtp_capabilities,
            paused: false,
            preferred_layers: None,
            app_data: AppData::default(),
        }
    }
}

/// Consumer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    /// A single RTP stream is sent with no spatial/temporal layers.
    Simple,
    /// Two or more RTP streams are sent, each of them with one or more temporal layers.
    Simulcast,
    /// A single RTP stream is sent with spatial/temporal layers.
    Svc,
    /// Special type for consumers created on a pipe transport.
    Pipe,
}

/// Valid types for the `trace` event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerTraceEventType {
    Rtp,
    KeyFrame,
    Nack,
    Pli,
    Fir,
}

/// `trace` event data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerTraceEventData {
    pub r#type: ConsumerTraceEventType,
    pub timestamp: u64,
    pub direction: TraceEventDirection,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    ProducerClose,
    ProducerPause,
    ProducerResume,
    Score(ConsumerScore),
    LayersChange(Option<ConsumerLayers>),
    Trace(ConsumerTraceEventData),
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct ObserverHandlers {
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    score: Bag<Arc<dyn Fn(&ConsumerScore) + Send + Sync>, ConsumerScore>,
    layers_change: Bag<Arc<dyn Fn(&Option<ConsumerLayers>) + Send + Sync>, Option<ConsumerLayers>>,
    trace: Bag<Arc<dyn Fn(&ConsumerTraceEventData) + Send + Sync>, ConsumerTraceEventData>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    producer_close: BagOnce<Box<dyn FnOnce() + Send>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    producer_pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    producer_resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    score: Bag<Arc<dyn Fn(&ConsumerScore) + Send + Sync>, ConsumerScore>,
    layers_change: Bag<Arc<dyn Fn(&Option<ConsumerLayers>) + Send + Sync>, Option<ConsumerLayers>>,
    trace: Bag<Arc<dyn Fn(&ConsumerTraceEventData) + Send + Sync>, ConsumerTraceEventData>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer: ObserverHandlers,
}

#[derive(Debug)]
struct State {
    paused: bool,
    producer_paused: bool,
    priority: u8,
    score: ConsumerScore,
    preferred_layers: Option<ConsumerLayers>,
    current_layers: Option<ConsumerLayers>,
}

struct Inner {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    r#type: ConsumerType,
    rtp_parameters: RtpParameters,
    internal: ConsumerInternal,
    state: Arc<Mutex<State>>,
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
            self.handlers.observer.close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = ConsumerCloseRequest {
                    internal: self.internal,
                };

                self.executor
                    .spawn(async move {
                        match channel.request(request).await {
                            Ok(()) | Err(RequestError::ChannelClosed) => {}
                            Err(error) => {
                                error!("consumer closing failed: {}", error);
                            }
                        }
                    })
                    .detach();
            }
        }
    }
}

/// A consumer represents an audio or video source being forwarded from a router to an endpoint.
/// It's created on top of a transport that defines how the media packets are carried.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.inner.id)
            .field("producer_id", &self.inner.producer_id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("rtp_parameters", &self.inner.rtp_parameters)
            .field("state", &self.inner.state)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        r#type: ConsumerType,
        rtp_parameters: RtpParameters,
        paused: bool,
        producer_paused: bool,
        score: ConsumerScore,
        preferred_layers: Option<ConsumerLayers>,
        internal: ConsumerInternal,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let state = Arc::new(Mutex::new(State {
            paused,
            producer_paused,
            priority: 1,
            score,
            preferred_layers,
            current_layers: None,
        }));
        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        let subscription_handler = {
            let handlers = Arc::clone(&handlers);
            let state = Arc::clone(&state);
            let inner_weak = Arc::clone(&inner_weak);

            channel.subscribe_to_notifications(id.into(), move |notification| {
                match notification.parse::<Notification>() {
                    Ok(Notification::ProducerClose) => {
                        let inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                        if let Some(inner) = inner {
                            if !inner.closed.load(Ordering::SeqCst) {
                                inner.handlers.producer_close.call_simple();
                                inner.close(false);
                            }
                        }
                    }
                    Ok(Notification::ProducerPause) => {
                        let was_paused = {
                            let mut state = state.lock();
                            if state.producer_paused {
                                return;
                            }
                            state.producer_paused = true;
                            state.paused
                        };

                        handlers.producer_pause.call_simple();

                        if !was_paused {
                            handlers.observer.pause.call_simple();
                        }
                    }
                    Ok(Notification::ProducerResume) => {
                        let paused = {
                            let mut state = state.lock();
                            if !state.producer_paused {
                                return;
                            }
                            state.producer_paused = false;
                            state.paused
                        };

                        handlers.producer_resume.call_simple();

                        if !paused {
                            handlers.observer.resume.call_simple();
                        }
                    }
                    Ok(Notification::Score(consumer_score)) => {
                        state.lock().score = consumer_score.clone();

                        handlers.score.call_simple(&consumer_score);
                        handlers.observer.score.call_simple(&consumer_score);
                    }
                    Ok(Notification::LayersChange(consumer_layers)) => {
                        state.lock().current_layers = consumer_layers;

                        handlers.layers_change.call_simple(&consumer_layers);
                        handlers.observer.layers_change.call_simple(&consumer_layers);
                    }
                    Ok(Notification::Trace(trace_event_data)) => {
                        handlers.trace.call_simple(&trace_event_data);
                        handlers.observer.trace.call_simple(&trace_event_data);
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            })
        };

        let inner = Arc::new(Inner {
            id,
            producer_id,
            kind,
            r#type,
            rtp_parameters,
            internal,
            state,
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

    /// Consumer id.
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// Associated Producer id.
    #[must_use]
    pub fn producer_id(&self) -> ProducerId {
        self.inner.producer_id
    }

    /// Media kind.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Consumer RTP parameters.
    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    /// Consumer type.
    #[must_use]
    pub fn r#type(&self) -> ConsumerType {
        self.inner.r#type
    }

    /// Whether the consumer is paused. It does not take into account whether the associated
    /// producer is paused.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Whether the associated producer is paused.
    #[must_use]
    pub fn producer_paused(&self) -> bool {
        self.inner.state.lock().producer_paused
    }

    /// Consumer priority (see [`Consumer::set_priority`] method).
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.inner.state.lock().priority
    }

    /// Consumer score.
    #[must_use]
    pub fn score(&self) -> ConsumerScore {
        self.inner.state.lock().score.clone()
    }

    /// Preferred spatial and temporal layers (see [`Consumer::set_preferred_layers`] method).
    /// For simulcast and SVC consumers, `None` otherwise.
    #[must_use]
    pub fn preferred_layers(&self) -> Option<ConsumerLayers> {
        self.inner.state.lock().preferred_layers
    }

    /// Currently active spatial and temporal layers (for simulcast and SVC consumers only).
    /// It's `None` if no layers are being sent to the consuming endpoint at this time (or if the
    /// consumer is consuming from a simulcast or SVC producer).
    #[must_use]
    pub fn current_layers(&self) -> Option<ConsumerLayers> {
        self.inner.state.lock().current_layers
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the consumer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump Consumer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<Value, RequestError> {
        debug!("dump()");

        self.inner
            .channel
            .request(ConsumerDumpRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Returns current RTC statistics of the consumer.
    ///
    /// Check the RTC Statistics section for more details.
    pub async fn get_stats(&self) -> Result<Vec<Value>, RequestError> {
        debug!("get_stats()");

        self.inner
            .channel
            .request(ConsumerGetStatsRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Pauses the consumer (no RTP is sent to the consuming endpoint).
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        self.inner
            .channel
            .request(ConsumerPauseRequest {
                internal: self.inner.internal,
            })
            .await?;

        let was_paused = {
            let mut state = self.inner.state.lock();
            let was_paused = state.paused || state.producer_paused;
            state.paused = true;
            was_paused
        };

        if !was_paused {
            self.inner.handlers.observer.pause.call_simple();
        }

        Ok(())
    }

    /// Resumes the consumer (RTP is sent again to the consuming endpoint).
    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        self.inner
            .channel
            .request(ConsumerResumeRequest {
                internal: self.inner.internal,
            })
            .await?;

        let (was_paused, producer_paused) = {
            let mut state = self.inner.state.lock();
            let was_paused = state.paused || state.producer_paused;
            state.paused = false;
            (was_paused, state.producer_paused)
        };

        if was_paused && !producer_paused {
            self.inner.handlers.observer.resume.call_simple();
        }

        Ok(())
    }

    /// Sets the preferred (highest) spatial and temporal layers to be sent to the consuming
    /// endpoint. Just valid for simulcast and SVC consumers.
    pub async fn set_preferred_layers(
        &self,
        consumer_layers: ConsumerLayers,
    ) -> Result<(), RequestError> {
        debug!("set_preferred_layers()");

        let consumer_layers = self
            .inner
            .channel
            .request(ConsumerSetPreferredLayersRequest {
                internal: self.inner.internal,
                data: consumer_layers,
            })
            .await?;

        self.inner.state.lock().preferred_layers = consumer_layers;

        Ok(())
    }

    /// Sets the priority for this consumer. It affects how the estimated outgoing bitrate in the
    /// transport (obtained via transport-cc or REMB) is distributed among all video consumers,
    /// by priority.
    pub async fn set_priority(&self, priority: u8) -> Result<(), RequestError> {
        debug!("set_priority()");

        let result = self
            .inner
            .channel
            .request(ConsumerSetPriorityRequest {
                internal: self.inner.internal,
                data: ConsumerSetPriorityData { priority },
            })
            .await?;

        self.inner.state.lock().priority = result.priority;

        Ok(())
    }

    /// Unsets the priority for this consumer (it sets it to its default value 1).
    pub async fn unset_priority(&self) -> Result<(), RequestError> {
        debug!("unset_priority()");

        self.set_priority(1).await
    }

    /// Request a key frame to the associated producer. Just valid for video consumers.
    pub async fn request_key_frame(&self) -> Result<(), RequestError> {
        debug!("request_key_frame()");

        self.inner
            .channel
            .request(ConsumerRequestKeyFrameRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Instructs the consumer to emit `trace` events. For monitoring purposes. Use with caution.
    pub async fn enable_trace_event(
        &self,
        types: Vec<ConsumerTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        self.inner
            .channel
            .request(ConsumerEnableTraceEventRequest {
                internal: self.inner.internal,
                data: ConsumerEnableTraceEventData { types },
            })
            .await
    }

    /// Callback is called when the associated producer is closed for whatever reason. The
    /// consumer itself is also closed.
    pub fn on_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_close.add(Box::new(callback))
    }

    /// Callback is called when the transport this consumer belongs to is closed for whatever
    /// reason. The consumer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Callback is called when the associated producer is paused.
    pub fn on_producer_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_pause.add(Arc::new(callback))
    }

    /// Callback is called when the associated producer is resumed.
    pub fn on_producer_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_resume.add(Arc::new(callback))
    }

    /// Callback is called when the consumer or producer score changes.
    pub fn on_score<F: Fn(&ConsumerScore) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.score.add(Arc::new(callback))
    }

    /// Callback is called when the spatial/temporal layers being sent to the endpoint change.
    /// Just for simulcast or SVC consumers. `None` means no layers are being sent, for instance
    /// because the associated producer is paused.
    pub fn on_layers_change<F: Fn(&Option<ConsumerLayers>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.layers_change.add(Arc::new(callback))
    }

    /// See [`Consumer::enable_trace_event`] method.
    pub fn on_trace<F: Fn(&ConsumerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.trace.add(Arc::new(callback))
    }

    /// Coarse-grained events, meant for monitoring rather than for driving application logic.
    #[must_use]
    pub fn observer(&self) -> ConsumerObserver<'_> {
        ConsumerObserver { inner: &self.inner }
    }

    /// Closes the consumer.
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

/// Observer surface of a [`Consumer`].
pub struct ConsumerObserver<'a> {
    inner: &'a Inner,
}

impl<'a> ConsumerObserver<'a> {
    /// Callback is called when the consumer is closed for whatever reason, immediately if it is
    /// closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.observer.close.call_simple();
        }
        handler_id
    }

    /// Callback is called when the consumer or its producer becomes paused and the consumer was
    /// not effectively paused before.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.observer.pause.add(Arc::new(callback))
    }

    /// Callback is called when neither the consumer nor its producer are paused anymore.
    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.observer.resume.add(Arc::new(callback))
    }

    pub fn on_score<F: Fn(&ConsumerScore) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.observer.score.add(Arc::new(callback))
    }

    pub fn on_layers_change<F: Fn(&Option<ConsumerLayers>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .observer
            .layers_change
            .add(Arc::new(callback))
    }

    pub fn on_trace<F: Fn(&ConsumerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.observer.trace.add(Arc::new(callback))
    }
}
