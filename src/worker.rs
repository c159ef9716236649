//! A worker represents a media worker process that handles media of any number of routers.

mod channel;
mod common;

use crate::data_structures::{AppData, IdGenerator, RandomIdGenerator};
use crate::messages::{
    RouterInternal, WorkerCreateRouterRequest, WorkerDumpRequest, WorkerUpdateSettingsData,
    WorkerUpdateSettingsRequest,
};
use crate::ortc::{self, RtpCapabilitiesError};
use crate::router::{Router, RouterId, RouterOptions};
use crate::uuid_based_wrapper_type;
use crate::worker_manager::WorkerManager;
use async_executor::Executor;
pub(crate) use channel::Channel;
pub use channel::RequestError;
pub(crate) use common::{SubscriptionHandler, SubscriptionTarget};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::{fmt, mem};
use thiserror::Error;

pub use crate::messages::WorkerDump;

uuid_based_wrapper_type!(
    /// Worker identifier.
    WorkerId
);

/// Exit code the worker process uses to report settings it can't work with.
const WRONG_SETTINGS_EXIT_CODE: i32 = 42;

/// Logging level for logs generated by the media worker.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogLevel {
    /// Log all severities.
    Debug,
    /// Log "warn" and "error" severities.
    Warn,
    /// Log "error" severity.
    Error,
    /// Do not log anything.
    None,
}

impl Default for WorkerLogLevel {
    fn default() -> Self {
        Self::Error
    }
}

impl WorkerLogLevel {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::None => "none",
        }
    }
}

/// Log tags for debugging. Check the meaning of each available tag in the worker documentation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogTag {
    Info,
    Ice,
    Dtls,
    Rtp,
    Srtp,
    Rtcp,
    Rtx,
    Bwe,
    Score,
    Simulcast,
    Svc,
    Sctp,
    Message,
}

impl WorkerLogTag {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Ice => "ice",
            Self::Dtls => "dtls",
            Self::Rtp => "rtp",
            Self::Srtp => "srtp",
            Self::Rtcp => "rtcp",
            Self::Rtx => "rtx",
            Self::Bwe => "bwe",
            Self::Score => "score",
            Self::Simulcast => "simulcast",
            Self::Svc => "svc",
            Self::Sctp => "sctp",
            Self::Message => "message",
        }
    }
}

/// DTLS certificate and private key in PEM format, always given together.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkerDtlsFiles {
    /// Path to the DTLS public certificate file in PEM format.
    pub certificate: PathBuf,
    /// Path to the DTLS certificate private key file in PEM format.
    pub private_key: PathBuf,
}

/// Settings for worker to be created with.
#[derive(Clone)]
#[non_exhaustive]
pub struct WorkerSettings {
    /// Logging level for logs generated by the media worker.
    ///
    /// Default [`WorkerLogLevel::Error`].
    pub log_level: WorkerLogLevel,
    /// Log tags for debugging.
    pub log_tags: Vec<WorkerLogTag>,
    /// RTC ports range for ICE, DTLS, RTP, etc.
    ///
    /// Default `10000..=59999`.
    pub rtc_ports_range: RangeInclusive<u16>,
    /// DTLS certificate and private key.
    ///
    /// If `None`, a certificate is dynamically created.
    pub dtls_files: Option<WorkerDtlsFiles>,
    /// Source of ids for the worker and everything created on it.
    pub id_generator: Arc<dyn IdGenerator>,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            log_level: WorkerLogLevel::default(),
            log_tags: Vec::new(),
            rtc_ports_range: 10000..=59999,
            dtls_files: None,
            id_generator: Arc::new(RandomIdGenerator),
            app_data: AppData::default(),
        }
    }
}

impl fmt::Debug for WorkerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let WorkerSettings {
            log_level,
            log_tags,
            rtc_ports_range,
            dtls_files,
            id_generator,
            app_data,
        } = self;

        f.debug_struct("WorkerSettings")
            .field("log_level", &log_level)
            .field("log_tags", &log_tags)
            .field("rtc_ports_range", &rtc_ports_range)
            .field("dtls_files", &dtls_files)
            .field("id_generator", &id_generator)
            .field("app_data", &app_data)
            .finish()
    }
}

impl WorkerSettings {
    /// Command line arguments the worker process has to be started with for these settings.
    #[must_use]
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = vec![format!("--logLevel={}", self.log_level.as_str())];

        for log_tag in &self.log_tags {
            args.push(format!("--logTag={}", log_tag.as_str()));
        }

        args.push(format!("--rtcMinPort={}", self.rtc_ports_range.start()));
        args.push(format!("--rtcMaxPort={}", self.rtc_ports_range.end()));

        if let Some(dtls_files) = &self.dtls_files {
            args.push(format!(
                "--dtlsCertificateFile={}",
                dtls_files.certificate.display(),
            ));
            args.push(format!(
                "--dtlsPrivateKeyFile={}",
                dtls_files.private_key.display(),
            ));
        }

        args
    }

    fn validate(&self) -> Result<(), CreateWorkerError> {
        if self.rtc_ports_range.is_empty() {
            return Err(CreateWorkerError::InvalidSettings(format!(
                "RTC ports range {}..={} is empty",
                self.rtc_ports_range.start(),
                self.rtc_ports_range.end(),
            )));
        }

        if let Some(dtls_files) = &self.dtls_files {
            if dtls_files.certificate.as_os_str().is_empty()
                || dtls_files.private_key.as_os_str().is_empty()
            {
                return Err(CreateWorkerError::InvalidSettings(
                    "DTLS certificate and private key must both be given".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Worker settings that can be changed while the worker is running.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct WorkerUpdateSettings {
    /// Logging level for logs generated by the media worker.
    pub log_level: Option<WorkerLogLevel>,
    /// Log tags for debugging.
    pub log_tags: Option<Vec<WorkerLogTag>>,
}

/// Connection to a started worker process.
///
/// Messages are serialized JSON documents, one per queue item.
pub struct WorkerConnection {
    /// Process id of the worker.
    pub pid: u32,
    /// Messages from this library to the worker.
    pub sender: async_channel::Sender<Vec<u8>>,
    /// Messages from the worker to this library.
    pub receiver: async_channel::Receiver<Vec<u8>>,
    /// Resolves with the exit code once the worker process is gone.
    pub exit: async_oneshot::Receiver<i32>,
}

impl fmt::Debug for WorkerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConnection")
            .field("pid", &self.pid)
            .finish()
    }
}

/// Error that caused worker creation to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CreateWorkerError {
    /// Settings were rejected before the worker was contacted.
    #[error("Invalid worker settings: {0}")]
    InvalidSettings(String),
    /// Worker exited because it couldn't use the settings it was started with.
    #[error("Worker rejected its settings")]
    WrongSettings,
    /// Worker exited before it reported being ready.
    #[error("Worker exited before being ready, exit code {code:?}")]
    ExitedBeforeReady {
        /// Exit code, if known.
        code: Option<i32>,
    },
}

/// Error that caused router creation to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CreateRouterError {
    /// RTP capabilities generation error
    #[error("RTP capabilities generation error: {0}")]
    FailedRtpCapabilitiesGeneration(RtpCapabilitiesError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
    /// Worker was closed before the router was created.
    #[error("Worker closed")]
    WorkerClosed,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Running,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_router: Bag<Arc<dyn Fn(&Router) + Send + Sync>, Router>,
    died: BagOnce<Box<dyn FnOnce(Option<i32>) + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
    observer_new_router: Bag<Arc<dyn Fn(&Router) + Send + Sync>, Router>,
    observer_close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: WorkerId,
    pid: u32,
    channel: Channel,
    executor: Arc<Executor<'static>>,
    id_generator: Arc<dyn IdGenerator>,
    routers: Arc<Mutex<HashMap<RouterId, Router>>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    // Keeps the manager and its executor thread alive as long as there is a worker.
    _worker_manager: WorkerManager,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close();
    }
}

impl Inner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        self.close_routers();

        self.handlers.close.call_simple();
        self.handlers.observer_close.call_simple();
    }

    fn died(&self, code: Option<i32>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        error!("worker process died unexpectedly [pid:{}, code:{:?}]", self.pid, code);

        self.close_routers();

        self.handlers.died.call(|callback| {
            callback(code);
        });
        self.handlers.close.call_simple();
        self.handlers.observer_close.call_simple();
    }

    fn close_routers(&self) {
        self.channel.close();

        let routers = mem::take(&mut *self.routers.lock());
        for router in routers.into_values() {
            router.worker_closed();
        }
    }
}

/// A worker represents a media worker process, connected to this library through a
/// [`WorkerConnection`].
///
/// Workers are created with [`WorkerManager::create_worker`].
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("pid", &self.inner.pid)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Worker {
    pub(super) async fn new(
        executor: Arc<Executor<'static>>,
        connection: WorkerConnection,
        worker_settings: WorkerSettings,
        worker_manager: WorkerManager,
    ) -> Result<Self, CreateWorkerError> {
        debug!("new()");

        worker_settings.validate()?;

        let WorkerSettings {
            id_generator,
            app_data,
            ..
        } = worker_settings;
        let WorkerConnection {
            pid,
            sender,
            receiver,
            exit,
        } = connection;

        let (channel, prepared_channel_read) = Channel::new(sender, receiver);

        let (status_sender, status_receiver) =
            async_oneshot::oneshot::<Result<(), CreateWorkerError>>();
        let status_sender = Arc::new(Mutex::new(Some(status_sender)));

        let running_subscription = {
            let status_sender = Arc::clone(&status_sender);

            channel.subscribe_to_notifications(pid.into(), move |notification| {
                match notification.parse::<Notification>() {
                    Ok(Notification::Running) => {
                        debug!("worker process running [pid:{}]", pid);

                        if let Some(mut status_sender) = status_sender.lock().take() {
                            let _ = status_sender.send(Ok(()));
                        }
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            })
        };

        prepared_channel_read.spawn(&executor);

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        {
            let status_sender = Arc::clone(&status_sender);
            let inner_weak = Arc::clone(&inner_weak);

            executor
                .spawn(async move {
                    let code = exit.await.ok();

                    let status_sender = status_sender.lock().take();
                    if let Some(mut status_sender) = status_sender {
                        let error = if code == Some(WRONG_SETTINGS_EXIT_CODE) {
                            CreateWorkerError::WrongSettings
                        } else {
                            CreateWorkerError::ExitedBeforeReady { code }
                        };
                        let _ = status_sender.send(Err(error));
                        return;
                    }

                    let inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                    if let Some(inner) = inner {
                        inner.died(code);
                    }
                })
                .detach();
        }

        let id = WorkerId::generate(&*id_generator);

        let inner = Arc::new(Inner {
            id,
            pid,
            channel,
            executor,
            id_generator,
            routers: Arc::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            _worker_manager: worker_manager,
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        let status = status_receiver.await.unwrap_or(Err(
            CreateWorkerError::ExitedBeforeReady { code: None },
        ));
        drop(running_subscription);
        status?;

        Ok(Self { inner })
    }

    /// Worker id.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    /// Worker process identifier (PID).
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the worker is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Dump Worker.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<WorkerDump, RequestError> {
        debug!("dump()");

        self.inner.channel.request(WorkerDumpRequest {}).await
    }

    /// Updates the worker settings in runtime. Only a subset of the worker settings can be
    /// updated.
    pub async fn update_settings(&self, data: WorkerUpdateSettings) -> Result<(), RequestError> {
        debug!("update_settings()");

        let WorkerUpdateSettings {
            log_level,
            log_tags,
        } = data;

        self.inner
            .channel
            .request(WorkerUpdateSettingsRequest {
                data: WorkerUpdateSettingsData {
                    log_level,
                    log_tags,
                },
            })
            .await
    }

    /// Create a Router.
    ///
    /// Router capabilities are generated from the media codecs before the worker is contacted.
    pub async fn create_router(
        &self,
        router_options: RouterOptions,
    ) -> Result<Router, CreateRouterError> {
        debug!("create_router()");

        let RouterOptions {
            media_codecs,
            app_data,
        } = router_options;

        let rtp_capabilities = ortc::generate_router_rtp_capabilities(media_codecs)
            .map_err(CreateRouterError::FailedRtpCapabilitiesGeneration)?;

        let router_id = RouterId::generate(&*self.inner.id_generator);

        self.inner
            .channel
            .request(WorkerCreateRouterRequest {
                internal: RouterInternal { router_id },
            })
            .await
            .map_err(CreateRouterError::Request)?;

        let router = Router::new(
            router_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            rtp_capabilities,
            Arc::clone(&self.inner.id_generator),
            app_data,
        );

        if self.closed() {
            router.worker_closed();
            return Err(CreateRouterError::WorkerClosed);
        }

        self.inner.routers.lock().insert(router_id, router.clone());

        {
            let routers_weak = Arc::downgrade(&self.inner.routers);

            router
                .on_internal_close(move || {
                    if let Some(routers) = routers_weak.upgrade() {
                        let removed = routers.lock().remove(&router_id);
                        drop(removed);
                    }
                })
                .detach();
        }

        self.inner.handlers.new_router.call_simple(&router);
        self.inner.handlers.observer_new_router.call_simple(&router);

        Ok(router)
    }

    /// Callback is called when a new router is created.
    pub fn on_new_router<F: Fn(&Router) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.new_router.add(Arc::new(callback))
    }

    /// Callback is called when the worker process unexpectedly dies, with its exit code if
    /// known.
    pub fn on_died<F: FnOnce(Option<i32>) + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.died.add(Box::new(callback))
    }

    /// Callback is called when the worker is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.closed() {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    /// Coarse-grained events, meant for monitoring rather than for driving application logic.
    #[must_use]
    pub fn observer(&self) -> WorkerObserver<'_> {
        WorkerObserver { inner: &self.inner }
    }

    /// Closes the worker together with all of its routers. The `died` event is not fired.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// Observer surface of a [`Worker`].
pub struct WorkerObserver<'a> {
    inner: &'a Inner,
}

impl<'a> WorkerObserver<'a> {
    /// Callback is called when the worker is closed for whatever reason, immediately if it is
    /// closed already.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.observer_close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.handlers.observer_close.call_simple();
        }
        handler_id
    }

    /// Callback is called when a new router is created.
    pub fn on_new_router<F: Fn(&Router) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.observer_new_router.add(Arc::new(callback))
    }
}

#[cfg(test)]
impl From<crate::fake_worker::FakeWorkerEnds> for WorkerConnection {
    fn from(ends: crate::fake_worker::FakeWorkerEnds) -> Self {
        Self {
            pid: ends.pid,
            sender: ends.sender,
            receiver: ends.receiver,
            exit: ends.exit,
        }
    }
}
