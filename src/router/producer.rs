
use crate::data_structures::{AppData, TraceEventDirection};
use crate::messages::{
    ProducerCloseRequest, ProducerDumpRequest, ProducerEnableTraceEventData,
    ProducerEnableTraceEventRequest, ProducerGetStatsRequest, ProducerInternal,
    ProducerPauseRequest, ProducerResumeRequest,
};
use crate::rtp_parameters::{MediaKind, RtpParameters};
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
    /// Producer identifier.
    ProducerId
);

/// Producer options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProducerOptions {
    /// Producer id, only set when piping an existing producer into another router.
    pub(crate) id: Option<ProducerId>,
    /// Media kind.
    pub kind: MediaKind,
    /// RTP parameters defining what the endpoint is sending.
    pub rtp_parameters: RtpParameters,
    /// Whether the producer must start in paused mode. Default false.
    pub paused: bool,
    /// Just for video. Time (in ms) before asking the sender for a new key frame after having
    /// asked a previous one. Default 0.
    pub key_frame_request_delay: u32,
    /// Custom application data.
    pub app_data: AppData,
}

impl ProducerOptions {
    /// Options for a producer with an id generated by the transport.
    #[must_use]
    pub fn new(kind: MediaKind, rtp_parameters: RtpParameters) -> Self {
        Self {
            id: None,
            kind,
            rtp_parameters,
            paused: false,
            key_frame_request_delay: 0,
            app_data: AppData::default(),
        }
    }

    /// Options for the remote half of a piped producer, reusing the original producer id.
    #[must_use]
    pub fn new_pipe_transport(
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Self {
        Self {
            id: Some(producer_id),
            ..Self::new(kind, rtp_parameters)
        }
    }
}

/// Producer type, decided by the worker from the encodings it receives.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// A single RTP stream is received with no spatial/temporal layers.
    Simple,
    /// Two or more RTP streams are received, each of them with one or more temporal layers.
    Simulcast,
    /// A single RTP stream is received with spatial/temporal layers.
    Svc,
}

/// Score of one RTP stream of the producer.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerScore {
    /// Index of the RTP stream in the `encodings` of the RTP parameters.
    #[serde(default)]
    pub encoding_idx: u32,
    /// SSRC of the RTP stream.
    pub ssrc: u32,
    /// RID of the RTP stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// The score of the RTP stream, from 0 to 10.
    pub score: u8,
}

/// As documented in
/// [WebRTC Video Processing and Codec Requirements](https://tools.ietf.org/html/rfc7742#section-4).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProducerVideoOrientation {
    /// Whether the source is a video camera.
    pub camera: bool,
    /// Whether the video source is flipped.
    pub flip: bool,
    /// Rotation degrees (0, 90, 180 or 270).
    pub rotation: u16,
}

/// Valid types for the `trace` event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerTraceEventType {
    Rtp,
    KeyFrame,
    Nack,
    Pli,
    Fir,
}

/// `trace` event data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerTraceEventData {
    pub r#type: ProducerTraceEventType,
    /// Event timestamp.
    pub timestamp: u64,
    /// Event direction.
    pub direction: TraceEventDirection,
    /// Per type information.
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Score(Vec<ProducerScore>),
    VideoOrientationChange(ProducerVideoOrientation),
    Trace(ProducerTraceEventData),
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct ObserverHandlers {
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    score: Bag<Arc<dyn Fn(&Vec<ProducerScore>) + Send + Sync>, Vec<ProducerScore>>,
    video_orientation_change:
        Bag<Arc<dyn Fn(&ProducerVideoOrientation) + Send + Sync>, ProducerVideoOrientation>,
    trace: Bag<Arc<dyn Fn(&ProducerTraceEventData) + Send + Sync>, ProducerTraceEventData>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    score: Bag<Arc<dyn Fn(&Vec<ProducerScore>) + Send + Sync>, Vec<ProducerScore>>,
    video_orientation_change:
        Bag<Arc<dyn Fn(&ProducerVideoOrientation) + Send + Sync>, ProducerVideoOrientation>,
    trace: Bag<Arc<dyn Fn(&ProducerTraceEventData) + Send + Sync>, ProducerTraceEventData>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer: ObserverHandlers,
}

struct Inner {
    id: ProducerId,
    kind: MediaKind,
    r#type: ProducerType,
    rtp_parameters: RtpParameters,
    consumable_rtp_parameters: RtpParameters,
    internal: ProducerInternal,
    paused: AtomicBool,
    score: Arc<Mutex<Vec<ProducerScore>>>,
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
                let request = ProducerCloseRequest {
                    internal: self.internal,
                };

                self.executor
                    .spawn(async move {
                        match channel.request(request).await {
                            Ok(()) | Err(RequestError::ChannelClosed) => {}
                            Err(error) => {
                                error!("producer closing failed: {}", error);
                            }
                        }
                    })
                    .detach();
            }
        }
    }
}

/// A producer represents an audio or video source being injected into a router. It's created on
/// top of a transport that defines how the media packets are carried.
///
/// The transport keeps the producer alive until it is closed, directly or through its transport.
#[derive(Clone)]
pub struct Producer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("rtp_parameters", &self.inner.rtp_parameters)
            .field("paused", &self.inner.paused)
            .field("score", &self.inner.score)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Producer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ProducerId,
        kind: MediaKind,
        r#type: ProducerType,
        rtp_parameters: RtpParameters,
        consumable_rtp_parameters: RtpParameters,
        paused: bool,
        internal: ProducerInternal,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let score = Arc::<Mutex<Vec<ProducerScore>>>::default();

        let subscription_handler = {
            let handlers = Arc::clone(&handlers);
            let score = Arc::clone(&score);

            channel.subscribe_to_notifications(id.into(), move |notification| {
                match notification.parse::<Notification>() {
                    Ok(Notification::Score(scores)) => {
                        *score.lock() = scores.clone();

                        handlers.score.call_simple(&scores);
                        handlers.observer.score.call_simple(&scores);
                    }
                    Ok(Notification::VideoOrientationChange(video_orientation)) => {
                        handlers
                            .video_orientation_change
                            .call_simple(&video_orientation);
                        handlers
                            .observer
                            .video_orientation_change
                            .call_simple(&video_orientation);
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
            kind,
            r#type,
            rtp_parameters,
            consumable_rtp_parameters,
            internal,
            paused: AtomicBool::new(paused),
            score,
            executor,
            channel,
            handlers,
            app_data,
            closed: AtomicBool::new(false),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        Self { inner }
    }

    /// Producer id.
    #[must_use]
    pub fn id(&self) -> ProducerId {
        self.inner.id
    }

    /// Media kind.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Producer RTP parameters.
    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    /// Producer type.
    #[must_use]
    pub fn r#type(&self) -> ProducerType {
        self.inner.r#type
    }

    /// Whether the Producer is paused.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// The score of each RTP stream being received, as reported by the last `score`
    /// notification.
    #[must_use]
    pub fn score(&self) -> Vec<ProducerScore> {
        self.inner.score.lock().clone()
    }

    /// Producer parameters translated into router payload types and header extension ids, the
    /// input for every consumer of this producer.
    #[must_use]
    pub fn consumable_rtp_parameters(&self) -> &RtpParameters {
        &self.inner.consumable_rtp_parameters
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the producer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump Producer.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<Value, RequestError> {
        debug!("dump()");

        self.inner
            .channel
            .request(ProducerDumpRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Returns current RTC statistics of the producer.
    pub async fn get_stats(&self) -> Result<Vec<Value>, RequestError> {
        debug!("get_stats()");

        self.inner
            .channel
            .request(ProducerGetStatsRequest {
                internal: self.inner.internal,
            })
            .await
    }

    /// Pauses the producer (no RTP is sent to its associated consumers).
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        self.inner
            .channel
            .request(ProducerPauseRequest {
                internal: self.inner.internal,
            })
            .await?;

        let was_paused = self.inner.paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.inner.handlers.observer.pause.call_simple();
        }

        Ok(())
    }

    /// Resumes the producer (RTP is sent again to its associated consumers).
    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        self.inner
            .channel
            .request(ProducerResumeRequest {
                internal: self.inner.internal,
            })
            .await?;

        let was_paused = self.inner.paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.inner.handlers.observer.resume.call_simple();
        }

        Ok(())
    }

    /// Instructs the producer to emit `trace` events. For monitoring purposes. Use with caution.
    pub async fn enable_trace_event(
        &self,
        types: Vec<ProducerTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        self.inner
            .channel
            .request(ProducerEnableTraceEventRequest {
                internal: self.inner.internal,
                data: ProducerEnableTraceEventData { types },
            })
            .await
    }

    /// Callback is called when the producer score changes.
    pub fn on_score<F: Fn(&Vec<ProducerScore>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.score.add(Arc::new(callback))
    }

    /// Callback is called when the video orientation changes. This is just possible if the
    /// `urn:3gpp:video-orientation` RTP extension has been negotiated in the producer RTP
    /// parameters.
    pub fn on_video_orientation_change<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&ProducerVideoOrientation) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .video_orientation_change
            .add(Arc::new(callback))
    }

    /// See [`Producer::enable_trace_event`] method.
    pub fn on_trace<F: Fn(&ProducerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.trace.add(Arc::new(callback))
    }

    /// Callback is called when the transport this producer belongs to is closed for whatever
    /// reason. The producer itself is also closed.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Coarse-grained events, meant for monitoring rather than for driving application logic.
    #[must_use]
    pub fn observer(&self) -> ProducerObserver<'_> {
        ProducerObserver { inner: &self.inner }
    }

    /// Closes the producer. Every consumer of it is closed by the worker afterwards.
    pub fn close(&self) {
        self.inner.close(true);
    }

    /// Owner-only event fired on every close path.
    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.internal_close.add(Box::new(callback))
    }

    pub(crate) fn transport_closed(&self) {
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.transport_close.call_simple();
            self.inner.close(false);
        }
    }

    pub(crate) fn downgrade(&self) -> WeakProducer {
        WeakProducer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Observer surface of a [`Producer`].
pub struct ProducerObserver<'a> {
    inner: &'a Inner,
}

impl<'a> ProducerObserver<'a> {
    /// Callback is called when the producer is closed for whatever reason, immediately if it is
    /// closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.observer.close.call_simple();
        }
        handler_id
    }

    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.observer.pause.add(Arc::new(callback))
    }

    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.observer.resume.add(Arc::new(callback))
    }

    pub fn on_score<F: Fn(&Vec<ProducerScore>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.observer.score.add(Arc::new(callback))
    }

    pub fn on_video_orientation_change<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&ProducerVideoOrientation) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .observer
            .video_orientation_change
            .add(Arc::new(callback))
    }

    pub fn on_trace<F: Fn(&ProducerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.observer.trace.add(Arc::new(callback))
    }
}

/// [`Producer`] that doesn't keep it alive, used by the router-wide registry.
#[derive(Clone)]
pub(crate) struct WeakProducer {
    inner: Weak<Inner>,
}

impl WeakProducer {
    pub(crate) fn upgrade(&self) -> Option<Producer> {
        let inner = self.inner.upgrade()?;

        Some(Producer { inner })
    }
}
