use crate::common::{
    audio_producer_options, connection, create_router, create_webrtc_transport,
    device_capabilities, init_logging, opus, start_worker, wait_for,
};
use crate::fake_worker::FakeWorker;
use futures_lite::future;
use serde_json::json;
use sfu_control::audio_level_observer::AudioLevelObserverOptions;
use sfu_control::consumer::ConsumerOptions;
use sfu_control::data_consumer::DataConsumerOptions;
use sfu_control::data_producer::DataProducerOptions;
use sfu_control::rtp_observer::RtpObserver;
use sfu_control::rtp_parameters::MimeTypeAudio;
use sfu_control::sctp_parameters::SctpStreamParameters;
use sfu_control::transport::Transport;
use sfu_control::worker::{CreateWorkerError, WorkerSettings};
use sfu_control::worker_manager::WorkerManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn increment(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn worker_close_closes_whole_graph() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;

        let transport_1 = create_webrtc_transport(&router, true).await;
        let transport_2 = create_webrtc_transport(&router, true).await;

        let producer = transport_1
            .produce(audio_producer_options(MimeTypeAudio::Opus, 111))
            .await
            .expect("Failed to produce audio");
        let consumer = transport_2
            .consume(ConsumerOptions::new(
                producer.id(),
                device_capabilities(&router),
            ))
            .await
            .expect("Failed to consume audio");
        let data_producer = transport_1
            .produce_data(DataProducerOptions::new_sctp(
                SctpStreamParameters::new_ordered(1),
            ))
            .await
            .expect("Failed to produce data");
        let data_consumer = transport_2
            .consume_data(DataConsumerOptions::new_sctp(data_producer.id()))
            .await
            .expect("Failed to consume data");
        let audio_level_observer = router
            .create_audio_level_observer(AudioLevelObserverOptions::default())
            .await
            .expect("Failed to create AudioLevelObserver");

        let close_count = counter();
        let _handlers = vec![
            worker.observer().on_close(increment(&close_count)),
            router.on_close(increment(&close_count)),
            transport_1.observer().on_close(increment(&close_count)),
            transport_2.observer().on_close(increment(&close_count)),
            producer.observer().on_close(increment(&close_count)),
            consumer.observer().on_close(increment(&close_count)),
            data_producer.observer().on_close(increment(&close_count)),
            data_consumer.observer().on_close(increment(&close_count)),
            audio_level_observer.on_close(Box::new(increment(&close_count))),
        ];

        let router_worker_close_count = counter();
        let _handler = router.on_worker_close(increment(&router_worker_close_count));

        let requests_before = fake_worker.methods().len();

        worker.close();
        worker.close();

        assert!(worker.closed());
        assert!(router.closed());
        assert!(transport_1.closed());
        assert!(transport_2.closed());
        assert!(producer.closed());
        assert!(consumer.closed());
        assert!(data_producer.closed());
        assert!(data_consumer.closed());
        assert!(audio_level_observer.closed());

        assert_eq!(close_count.load(Ordering::SeqCst), 9);
        assert_eq!(router_worker_close_count.load(Ordering::SeqCst), 1);

        // Children of a closed worker are not closed one by one.
        assert_eq!(fake_worker.methods().len(), requests_before);
    });
}

#[test]
fn worker_death_closes_routers() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;
        let transport = create_webrtc_transport(&router, false).await;

        let (mut died_tx, died_rx) = async_oneshot::oneshot::<Option<i32>>();
        let _handler = worker.on_died(move |code| {
            let _ = died_tx.send(code);
        });

        let (mut router_close_tx, router_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = transport.on_router_close(Box::new(move || {
            let _ = router_close_tx.send(());
        }));

        fake_worker.exit(1);

        assert_eq!(died_rx.await.ok(), Some(Some(1)));
        router_close_rx
            .await
            .expect("Failed to receive router_close event");
        assert!(worker.closed());
        assert!(router.closed());
        assert!(transport.closed());
    });
}

#[test]
fn worker_exit_before_ready() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();

        let (fake_worker, ends) = FakeWorker::spawn_not_ready(1);
        fake_worker.exit(42);
        assert_eq!(
            worker_manager
                .create_worker(connection(ends), WorkerSettings::default())
                .await
                .err(),
            Some(CreateWorkerError::WrongSettings),
        );

        let (fake_worker, ends) = FakeWorker::spawn_not_ready(2);
        fake_worker.exit(1);
        assert_eq!(
            worker_manager
                .create_worker(connection(ends), WorkerSettings::default())
                .await
                .err(),
            Some(CreateWorkerError::ExitedBeforeReady { code: Some(1) }),
        );
    });
}

#[test]
fn transport_close_empties_child_maps() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;

        let transport_1 = create_webrtc_transport(&router, false).await;
        let transport_2 = create_webrtc_transport(&router, false).await;

        let producer = transport_1
            .produce(audio_producer_options(MimeTypeAudio::Opus, 111))
            .await
            .expect("Failed to produce audio");
        let consumer = transport_2
            .consume(ConsumerOptions::new(
                producer.id(),
                device_capabilities(&router),
            ))
            .await
            .expect("Failed to consume audio");

        let dump = transport_1.dump().await.expect("Failed to dump transport");
        assert_eq!(dump["producerIds"], json!([producer.id()]));

        let (mut producer_close_tx, producer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.on_producer_close(move || {
            let _ = producer_close_tx.send(());
        });
        let (mut consumer_close_tx, consumer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.observer().on_close(move || {
            let _ = consumer_close_tx.send(());
        });

        transport_1.close();

        assert!(producer.closed());
        assert!(!router.can_consume(&producer.id(), &device_capabilities(&router)));

        // Worker closes consumers of producers living on the closed transport.
        producer_close_rx
            .await
            .expect("Failed to receive producer_close event");
        consumer_close_rx
            .await
            .expect("Failed to receive close event");
        assert!(consumer.closed());
        assert!(!transport_2.closed());

        let dump = transport_2.dump().await.expect("Failed to dump transport");
        assert_eq!(dump["consumerIds"], json!([]));

        wait_for(|| fake_worker.transport_count() == 1).await;
        assert_eq!(fake_worker.count("transport.close"), 1);
        assert_eq!(fake_worker.count("producer.close"), 0);
    });
}

#[test]
fn producer_close_is_idempotent() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer = transport
            .produce(audio_producer_options(MimeTypeAudio::Opus, 111))
            .await
            .expect("Failed to produce audio");

        let close_count = counter();
        let _handler = producer.observer().on_close(increment(&close_count));

        producer.close();
        producer.close();

        wait_for(|| fake_worker.producer_count() == 0).await;

        assert_eq!(close_count.load(Ordering::SeqCst), 1);
        assert_eq!(fake_worker.count("producer.close"), 1);

        let dump = transport.dump().await.expect("Failed to dump transport");
        assert_eq!(dump["producerIds"], json!([]));
    });
}
