use crate::messages::Request;
use crate::worker::common::{EventHandlers, SubscriptionHandler, SubscriptionTarget};
use async_executor::Executor;
use futures_lite::future;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error of a request sent to the worker.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Channel is already closed, the worker is most likely gone.
    #[error("Channel already closed")]
    ChannelClosed,
    /// Worker didn't answer in time.
    #[error("Request timed out")]
    TimedOut,
    /// Worker explicitly rejected the request.
    #[error("Received response error: {reason}")]
    Response { reason: String },
    #[error("Failed to parse response from worker: {error}")]
    FailedToParse { error: String },
    #[error("Worker did not return any data in response")]
    NoData,
}

/// Notification pushed by the worker for a specific entity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Notification {
    pub(crate) event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub(crate) data: Value,
}

impl Notification {
    /// Parse into an entity-specific notification enum that is adjacently tagged with
    /// `event`/`data`.
    pub(crate) fn parse<T: for<'de> Deserialize<'de>>(&self) -> Result<T, NotificationParseError> {
        let mut message = serde_json::Map::new();
        message.insert("event".to_string(), Value::String(self.event.clone()));
        if !self.data.is_null() {
            message.insert("data".to_string(), self.data.clone());
        }

        T::deserialize(Value::Object(message))
            .map_err(|error| NotificationParseError {
                event: self.event.clone(),
                error: error.to_string(),
            })
    }
}

#[derive(Debug, Error)]
#[error("Failed to parse notification {event}: {error}")]
pub(crate) struct NotificationParseError {
    event: String,
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelReceiveMessage {
    #[serde(rename_all = "camelCase")]
    Notification {
        target_id: NotificationTarget,
        event: String,
        #[serde(default)]
        data: Value,
    },
    ResponseSuccess {
        id: u32,
        #[allow(dead_code)]
        accepted: bool,
        #[serde(default)]
        data: Value,
    },
    ResponseError {
        id: u32,
        #[allow(dead_code)]
        error: Value,
        #[serde(default)]
        reason: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotificationTarget {
    Number(u32),
    Uuid(Uuid),
    // Worker announces itself with its pid as a string.
    Text(String),
}

impl NotificationTarget {
    fn into_subscription_target(self) -> Option<SubscriptionTarget> {
        match self {
            Self::Number(number) => Some(SubscriptionTarget::Number(number)),
            Self::Uuid(uuid) => Some(SubscriptionTarget::Uuid(uuid)),
            Self::Text(text) => text.parse().ok().map(SubscriptionTarget::Number),
        }
    }
}

type ResponseResult = Result<Value, RequestError>;

#[derive(Default)]
struct RequestsContainer {
    next_id: u32,
    handlers: HashMap<u32, async_oneshot::Sender<ResponseResult>>,
}

struct Inner {
    sender: async_channel::Sender<Vec<u8>>,
    requests_container: Arc<Mutex<RequestsContainer>>,
    event_handlers: EventHandlers<Notification>,
    closed: Arc<AtomicBool>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sender.close();
    }
}

/// Read half of a [`Channel`], started once the initial subscriptions are in place so that no
/// early notification is missed.
pub(crate) struct PreparedChannelRead {
    receiver: async_channel::Receiver<Vec<u8>>,
    requests_container: Arc<Mutex<RequestsContainer>>,
    event_handlers: EventHandlers<Notification>,
    closed: Arc<AtomicBool>,
}

impl PreparedChannelRead {
    pub(crate) fn spawn(self, executor: &Executor<'static>) {
        let Self {
            receiver,
            requests_container,
            event_handlers,
            closed,
        } = self;

        executor
            .spawn(async move {
                while let Ok(bytes) = receiver.recv().await {
                    trace!("received raw message: {}", String::from_utf8_lossy(&bytes));

                    let message = match serde_json::from_slice::<ChannelReceiveMessage>(&bytes)
                    {
                        Ok(message) => message,
                        Err(error) => {
                            warn!(
                                "unexpected message from worker: {}: {}",
                                String::from_utf8_lossy(&bytes),
                                error,
                            );
                            continue;
                        }
                    };

                    match message {
                        ChannelReceiveMessage::ResponseSuccess { id, data, .. } => {
                            let sender = requests_container.lock().handlers.remove(&id);
                            match sender {
                                Some(mut sender) => {
                                    let _ = sender.send(Ok(data));
                                }
                                None => {
                                    warn!(
                                        "received success response does not match any sent request [id:{}]",
                                        id,
                                    );
                                }
                            }
                        }
                        ChannelReceiveMessage::ResponseError { id, reason, .. } => {
                            let sender = requests_container.lock().handlers.remove(&id);
                            match sender {
                                Some(mut sender) => {
                                    let _ = sender.send(Err(RequestError::Response { reason }));
                                }
                                None => {
                                    warn!(
                                        "received error response does not match any sent request [id:{}]",
                                        id,
                                    );
                                }
                            }
                        }
                        ChannelReceiveMessage::Notification {
                            target_id,
                            event,
                            data,
                        } => {
                            let target = match target_id.into_subscription_target() {
                                Some(target) => target,
                                None => {
                                    warn!(
                                        "notification with unknown target [event:{}]",
                                        event,
                                    );
                                    continue;
                                }
                            };
                            let notification = Notification { event, data };
                            if !event_handlers.call(&target, &notification) {
                                debug!(
                                    "notification without subscribers [target:{}, event:{}]",
                                    target, notification.event,
                                );
                            }
                        }
                    }
                }

                debug!("channel closed");

                closed.store(true, Ordering::SeqCst);
                // Dropping senders fails every pending request with `ChannelClosed`.
                let handlers = std::mem::take(&mut requests_container.lock().handlers);
                drop(handlers);
                event_handlers.clear();
            })
            .detach();
    }
}

/// Request/notification channel to the worker.
///
/// Requests are matched to responses by a monotonically increasing id, so any number of them may
/// be in flight. Notifications are dispatched to subscribers of their `targetId`.
#[derive(Clone)]
pub(crate) struct Channel {
    inner: Arc<Inner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(
        sender: async_channel::Sender<Vec<u8>>,
        receiver: async_channel::Receiver<Vec<u8>>,
    ) -> (Self, PreparedChannelRead) {
        let requests_container = Arc::<Mutex<RequestsContainer>>::default();
        let event_handlers = EventHandlers::<Notification>::new();
        let closed = Arc::new(AtomicBool::new(false));

        let prepared_channel_read = PreparedChannelRead {
            receiver,
            requests_container: Arc::clone(&requests_container),
            event_handlers: event_handlers.clone(),
            closed: Arc::clone(&closed),
        };


        let inner = Arc::new(Inner {
            sender,
            requests_container,
            event_handlers,
            closed,
        });

        (Self { inner }, prepared_channel_read)
    }

    pub(crate) fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.sender.is_closed()
    }

    /// Stop accepting requests, every pending one fails with [`RequestError::ChannelClosed`].
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.sender.close();
        let handlers = std::mem::take(&mut self.inner.requests_container.lock().handlers);
        drop(handlers);
    }

    pub(crate) async fn request<R>(&self, request: R) -> Result<R::Response, RequestError>
    where
        R: Request,
    {
        let method = request.as_method();
        let message = serde_json::to_value(&request).map_err(|error| {
            RequestError::FailedToParse {
                error: error.to_string(),
            }
        })?;

        let data = self.request_internal(method, message).await?;

        // `()` responses come without data, `null` deserializes into it just fine.
        serde_json::from_value(data).map_err(|error| RequestError::FailedToParse {
            error: error.to_string(),
        })
    }

    pub(crate) fn subscribe_to_notifications<F>(
        &self,
        target: SubscriptionTarget,
        callback: F,
    ) -> SubscriptionHandler
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.event_handlers.add(target, Arc::new(callback))
    }

    /// Non-generic method to avoid significant duplication in final binary
    async fn request_internal(&self, method: &'static str, message: Value) -> ResponseResult {
        #[derive(Debug, Serialize)]
        struct RequestMessagePrivate {
            id: u32,
            method: &'static str,
            #[serde(flatten)]
            message: Value,
        }

        if self.closed() {
            return Err(RequestError::ChannelClosed);
        }

        let id;
        let queue_len;
        let (result_sender, result_receiver) = async_oneshot::oneshot();
        let requests_container = &self.inner.requests_container;

        {
            let mut requests_container = requests_container.lock();

            id = requests_container.next_id;
            queue_len = requests_container.handlers.len();

            requests_container.next_id = requests_container.next_id.wrapping_add(1);
            requests_container.handlers.insert(id, result_sender);
        }

        debug!("request() [method:{}, id:{}]", method, id);

        let serialized_message = serde_json::to_vec(&RequestMessagePrivate {
            id,
            method,
            message,
        })
        .map_err(|error| RequestError::FailedToParse {
            error: error.to_string(),
        })?;

        if self.inner.sender.send(serialized_message).await.is_err() {
            requests_container.lock().handlers.remove(&id);
            return Err(RequestError::ChannelClosed);
        }

        let result = future::or(
            async move { result_receiver.await.map_err(|_| RequestError::ChannelClosed) },
            async move {
                async_io::Timer::after(Duration::from_millis(
                    (1000.0 * (15.0 + (0.1 * queue_len as f64))).round() as u64,
                ))
                .await;

                requests_container.lock().handlers.remove(&id);

                Err(RequestError::TimedOut)
            },
        )
        .await;

        match result {
            Ok(Ok(data)) => {
                debug!("request succeeded [method:{}, id:{}]", method, id);
                Ok(data)
            }
            Ok(Err(error)) | Err(error) => {
                debug!("request failed [method:{}, id:{}]: {}", method, id, error);
                Err(error)
            }
        }
    }
}
