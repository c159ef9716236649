
use crate::data_structures::AppData;
use crate::messages::{
    RtpObserverAddProducerRequest, RtpObserverAddRemoveProducerData, RtpObserverCloseRequest,
    RtpObserverInternal, RtpObserverPauseRequest, RtpObserverRemoveProducerRequest,
    RtpObserverResumeRequest,
};
use crate::producer::{Producer, ProducerId};
use crate::router::RouterAccessor;
use crate::rtp_observer::{
    RtpObserver, RtpObserverAddProducerOptions, RtpObserverId, RtpObserverProducerError,
};
use crate::rtp_parameters::MediaKind;
use crate::worker::{Channel, RequestError, SubscriptionHandler};
use async_executor::Executor;
use async_trait::async_trait;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroU16;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Audio level observer options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AudioLevelObserverOptions {
    /// Maximum number of entries in the 'volumes' event.
    /// Default 1.
    pub max_entries: NonZeroU16,
    /// Minimum average volume (in dBvo from -127 to 0) for entries in the 'volumes' event.
    /// Default -80.
    pub threshold: i8,
    /// Interval in ms for checking audio volumes.
    /// Default 1000.
    pub interval: u16,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for AudioLevelObserverOptions {
    fn default() -> Self {
        Self {
            max_entries: NonZeroU16::MIN,
            threshold: -80,
            interval: 1000,
            app_data: AppData::default(),
        }
    }
}

/// One entry of the `volumes` event.
#[derive(Debug, Clone)]
pub struct AudioLevelObserverVolume {
    /// The audio producer instance.
    pub producer: Producer,
    /// The average volume (in dBvo from -127 to 0) of the audio producer in the last interval.
    pub volume: i8,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    volumes: Bag<
        Arc<dyn Fn(&Vec<AudioLevelObserverVolume>) + Send + Sync>,
        Vec<AudioLevelObserverVolume>,
    >,
    silence: Bag<Arc<dyn Fn() + Send + Sync>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    add_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>, Producer>,
    remove_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>, Producer>,
    router_close: BagOnce<Box<dyn FnOnce() + Send>>,
    internal_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeNotification {
    producer_id: ProducerId,
    volume: i8,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Volumes(Vec<VolumeNotification>),
    Silence,
}

struct Inner {
    id: RtpObserverId,
    internal: RtpObserverInternal,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    handlers: Arc<Handlers>,
    paused: AtomicBool,
    app_data: AppData,
    accessor: Arc<dyn RouterAccessor>,
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
            self.handlers.close.call_simple();

            if close_request {
                let channel = self.channel.clone();
                let request = RtpObserverCloseRequest {
                    internal: self.internal,
                };

                self.executor
                    .spawn(async move {
                        match channel.request(request).await {
                            Ok(()) | Err(RequestError::ChannelClosed) => {}
                            Err(error) => {
                                error!("audio level observer closing failed: {}", error);
                            }
                        }
                    })
                    .detach();
            }
        }
    }
}

/// Monitors the volume of the selected audio producers. It just handles audio producers.
#[derive(Clone)]
pub struct AudioLevelObserver {
    inner: Arc<Inner>,
}

impl fmt::Debug for AudioLevelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioLevelObserver")
            .field("id", &self.inner.id)
            .field("paused", &self.inner.paused)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

#[async_trait]
impl RtpObserver for AudioLevelObserver {
    fn id(&self) -> RtpObserverId {
        self.inner.id
    }

    fn paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        self.inner
            .channel
            .request(RtpObserverPauseRequest {
                internal: self.inner.internal,
            })
            .await?;

        let was_paused = self.inner.paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.inner.handlers.pause.call_simple();
        }

        Ok(())
    }

    async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        self.inner
            .channel
            .request(RtpObserverResumeRequest {
                internal: self.inner.internal,
            })
            .await?;

        let was_paused = self.inner.paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.inner.handlers.resume.call_simple();
        }

        Ok(())
    }

    async fn add_producer(
        &self,
        RtpObserverAddProducerOptions { producer_id }: RtpObserverAddProducerOptions,
    ) -> Result<(), RtpObserverProducerError> {
        debug!("add_producer()");

        let producer = self.audio_producer(&producer_id)?;

        self.inner
            .channel
            .request(RtpObserverAddProducerRequest {
                internal: self.inner.internal,
                data: RtpObserverAddRemoveProducerData { producer_id },
            })
            .await?;

        self.inner.handlers.add_producer.call_simple(&producer);

        Ok(())
    }

    async fn remove_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), RtpObserverProducerError> {
        debug!("remove_producer()");

        let producer = self.audio_producer(&producer_id)?;

        self.inner
            .channel
            .request(RtpObserverRemoveProducerRequest {
                internal: self.inner.internal,
                data: RtpObserverAddRemoveProducerData { producer_id },
            })
            .await?;

        self.inner.handlers.remove_producer.call_simple(&producer);

        Ok(())
    }

    fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId {
        self.inner.handlers.pause.add(Arc::from(callback))
    }

    fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId {
        self.inner.handlers.resume.add(Arc::from(callback))
    }

    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        self.inner.handlers.router_close.add(callback)
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(callback);
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    fn close(&self) {
        self.inner.close(true);
    }
}

impl AudioLevelObserver {
    pub(crate) fn new(
        id: RtpObserverId,
        internal: RtpObserverInternal,
        executor: Arc<Executor<'static>>,
        channel: Channel,
        app_data: AppData,
        accessor: Arc<dyn RouterAccessor>,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();

        let subscription_handler = {
            let handlers = Arc::clone(&handlers);
            let accessor = Arc::clone(&accessor);

            channel.subscribe_to_notifications(id.into(), move |notification| {
                match notification.parse::<Notification>() {
                    Ok(Notification::Volumes(volumes)) => {
                        // Producers closed in the meantime are not reported.
                        let volumes = volumes
                            .into_iter()
                            .filter_map(|VolumeNotification { producer_id, volume }| {
                                accessor
                                    .get_producer(&producer_id)
                                    .map(|producer| AudioLevelObserverVolume { producer, volume })
                            })
                            .collect::<Vec<_>>();

                        if !volumes.is_empty() {
                            handlers.volumes.call_simple(&volumes);
                        }
                    }
                    Ok(Notification::Silence) => {
                        handlers.silence.call_simple();
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            })
        };

        let inner = Arc::new(Inner {
            id,
            internal,
            executor,
            channel,
            handlers,
            paused: AtomicBool::new(false),
            app_data,
            accessor,
            closed: AtomicBool::new(false),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        Self { inner }
    }

    /// Callback is called at most every interval ms (see [`AudioLevelObserverOptions`]) with the
    /// audio producers that are above the threshold, loudest first.
    pub fn on_volumes<F: Fn(&Vec<AudioLevelObserverVolume>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.volumes.add(Arc::new(callback))
    }

    /// Callback is called when no one of the producers is above the threshold.
    pub fn on_silence<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.silence.add(Arc::new(callback))
    }

    /// Callback is called when a new producer is added into the observer.
    pub fn on_add_producer<F: Fn(&Producer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.add_producer.add(Arc::new(callback))
    }

    /// Callback is called when a producer is removed from the observer.
    pub fn on_remove_producer<F: Fn(&Producer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.remove_producer.add(Arc::new(callback))
    }

    pub(crate) fn on_internal_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.internal_close.add(Box::new(callback))
    }

    pub(crate) fn router_closed(&self) {
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.router_close.call_simple();
            self.inner.close(false);
        }
    }

    fn audio_producer(&self, producer_id: &ProducerId) -> Result<Producer, RtpObserverProducerError> {
        let producer = self
            .inner
            .accessor
            .get_producer(producer_id)
            .ok_or(RtpObserverProducerError::ProducerNotFound(*producer_id))?;

        if producer.kind() != MediaKind::Audio {
            return Err(RtpObserverProducerError::NotAudio(*producer_id));
        }

        Ok(producer)
    }
}
