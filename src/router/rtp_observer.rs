use crate::data_structures::AppData;
use crate::producer::ProducerId;
use crate::uuid_based_wrapper_type;
use crate::worker::RequestError;
use async_trait::async_trait;
use event_listener_primitives::HandlerId;
use thiserror::Error;

uuid_based_wrapper_type!(
    /// RTP observer identifier.
    RtpObserverId
);

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RtpObserverAddProducerOptions {
    /// The id of the Producer to be added.
    pub producer_id: ProducerId,
}

impl RtpObserverAddProducerOptions {
    #[must_use]
    pub fn new(producer_id: ProducerId) -> Self {
        Self { producer_id }
    }
}

/// Error that caused [`RtpObserver::add_producer`] or [`RtpObserver::remove_producer`] to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpObserverProducerError {
    /// Producer with this id doesn't exist in the router of the observer.
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Only audio producers can be observed.
    #[error("Producer with id \"{0}\" is not an audio producer")]
    NotAudio(ProducerId),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(#[from] RequestError),
}

/// An RTP observer inspects the media received by a set of selected producers.
#[async_trait]
pub trait RtpObserver {
    /// RtpObserver id.
    fn id(&self) -> RtpObserverId;

    /// Whether the RtpObserver is paused.
    fn paused(&self) -> bool;

    /// Custom application data.
    fn app_data(&self) -> &AppData;

    /// Whether the RtpObserver is closed.
    fn closed(&self) -> bool;

    /// Pauses the RtpObserver. No RTP is inspected until resumed.
    async fn pause(&self) -> Result<(), RequestError>;

    /// Resumes the RtpObserver. RTP is inspected again.
    async fn resume(&self) -> Result<(), RequestError>;

    /// Provides the RtpObserver with a new producer to monitor.
    async fn add_producer(
        &self,
        rtp_observer_add_producer_options: RtpObserverAddProducerOptions,
    ) -> Result<(), RtpObserverProducerError>;

    /// Removes the given producer from the RtpObserver.
    async fn remove_producer(&self, producer_id: ProducerId)
        -> Result<(), RtpObserverProducerError>;

    /// Callback is called when the RtpObserver is paused.
    fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId;

    /// Callback is called when the RtpObserver is resumed.
    fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId;

    /// Callback is called when the router this RtpObserver belongs to is closed for whatever
    /// reason. The RtpObserver itself is also closed.
    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId;

    /// Callback is called when the RtpObserver is closed for whatever reason.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId;

    /// Closes the RtpObserver.
    fn close(&self);
}
