
use crate::worker::{CreateWorkerError, Worker, WorkerConnection, WorkerSettings};
use async_executor::Executor;
use async_oneshot::Sender;
use event_listener_primitives::{Bag, HandlerId};
use futures_lite::future;
use log::debug;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct Handlers {
    new_worker: Bag<Arc<dyn Fn(&Worker) + Send + Sync>, Worker>,
}

struct Inner {
    executor: Arc<Executor<'static>>,
    handlers: Handlers,
    /// This field is only used in order to be dropped with the worker manager itself to stop the
    /// thread created with `WorkerManager::new()` call
    _stop_sender: Option<Sender<()>>,
}

/// Container that creates [`Worker`] instances.
///
/// # Examples
/// ```no_run
/// use futures_lite::future;
/// use sfu_control::worker::{WorkerConnection, WorkerSettings};
/// use sfu_control::worker_manager::WorkerManager;
///
/// # fn connect_to_worker_process() -> WorkerConnection { unimplemented!() }
/// let worker_manager = WorkerManager::new();
///
/// future::block_on(async move {
///     // Connection to a worker process started with `WorkerSettings::worker_args()`
///     let connection = connect_to_worker_process();
///
///     let worker = worker_manager
///         .create_worker(connection, WorkerSettings::default())
///         .await
///         .unwrap();
/// })
/// ```
///
/// If you already happen to have [`async_executor::Executor`] instance available,
/// [`WorkerManager::with_executor()`] can be used to create an instance instead.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManager").finish()
    }
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    /// Create new worker manager, internally a new thread with executor will be created.
    #[must_use]
    pub fn new() -> Self {
        let executor = Arc::new(Executor::new());
        let (stop_sender, stop_receiver) = async_oneshot::oneshot::<()>();
        {
            let executor = Arc::clone(&executor);
            std::thread::Builder::new()
                .name("sfu-control-executor".to_string())
                .spawn(move || {
                    // Will return Err(Closed) when `WorkerManager` struct is dropped
                    let _ = future::block_on(executor.run(stop_receiver));
                })
                .ok();
        }

        let inner = Arc::new(Inner {
            executor,
            handlers: Handlers::default(),
            _stop_sender: Some(stop_sender),
        });

        Self { inner }
    }

    /// Create new worker manager, uses externally provided executor.
    #[must_use]
    pub fn with_executor(executor: Arc<Executor<'static>>) -> Self {
        let inner = Arc::new(Inner {
            executor,
            handlers: Handlers::default(),
            _stop_sender: None,
        });

        Self { inner }
    }

    /// Create a Worker on top of an already started worker process.
    ///
    /// Settings are validated first, then the worker is awaited until it reports being ready.
    /// Worker manager will be kept alive as long as at least one worker instance is alive.
    pub async fn create_worker(
        &self,
        connection: WorkerConnection,
        worker_settings: WorkerSettings,
    ) -> Result<Worker, CreateWorkerError> {
        debug!("create_worker()");

        let worker = Worker::new(
            Arc::clone(&self.inner.executor),
            connection,
            worker_settings,
            self.clone(),
        )
        .await?;

        self.inner.handlers.new_worker.call_simple(&worker);

        Ok(worker)
    }

    /// Callback is called when a new worker is created.
    pub fn on_new_worker<F: Fn(&Worker) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.new_worker.add(Arc::new(callback))
    }
}
