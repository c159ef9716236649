use crate::common::{
    audio_producer_options, create_router, create_webrtc_transport, device_capabilities,
    init_logging, opus, start_worker, video_producer_options, vp8,
};
use futures_lite::future;
use parking_lot::Mutex;
use serde_json::json;
use sfu_control::consumer::{ConsumerOptions, ConsumerType};
use sfu_control::ortc::RtpParametersMappingError;
use sfu_control::producer::ProducerType;
use sfu_control::rtp_parameters::{MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo};
use sfu_control::transport::{ProduceError, Transport};
use sfu_control::worker_manager::WorkerManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn produce_and_consume_video() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus(), vp8()]).await;

        let producer_transport = create_webrtc_transport(&router, false).await;
        let consumer_transport = create_webrtc_transport(&router, false).await;

        let producer = producer_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        assert_eq!(producer.kind(), MediaKind::Video);
        assert_eq!(producer.r#type(), ProducerType::Simple);
        assert!(!producer.paused());
        assert_eq!(fake_worker.producer_count(), 1);

        let consumer = consumer_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                device_capabilities(&router),
            ))
            .await
            .expect("Failed to consume video");

        assert_eq!(consumer.kind(), MediaKind::Video);
        assert_eq!(consumer.r#type(), ConsumerType::Simple);
        assert_eq!(consumer.producer_id(), producer.id());
        assert_eq!(consumer.rtp_parameters().mid, Some("0".to_string()));
        assert_eq!(
            consumer.rtp_parameters().codecs[0].mime_type,
            MimeType::Video(MimeTypeVideo::Vp8),
        );
        assert_eq!(
            consumer.rtp_parameters().rtcp.cname,
            Some("video-1".to_string()),
        );
        assert_eq!(fake_worker.consumer_count(), 1);
    });
}

#[test]
fn produce_with_codec_unknown_to_router_fails() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;

        let transport = create_webrtc_transport(&router, false).await;

        assert_eq!(
            transport
                .produce(audio_producer_options(MimeTypeAudio::Pcmu, 0))
                .await
                .err(),
            Some(ProduceError::FailedRtpParametersMapping(
                RtpParametersMappingError::UnsupportedCodec {
                    mime_type: MimeType::Audio(MimeTypeAudio::Pcmu),
                    payload_type: 0,
                }
            )),
        );

        // Nothing reached the worker and nothing was registered.
        assert_eq!(fake_worker.count("transport.produce"), 0);
        assert_eq!(fake_worker.producer_count(), 0);

        let dump = transport.dump().await.expect("Failed to dump transport");
        assert_eq!(dump["producerIds"], json!([]));
    });
}

#[test]
fn worker_side_producer_close_closes_consumer() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;

        let producer_transport = create_webrtc_transport(&router, false).await;
        let consumer_transport = create_webrtc_transport(&router, false).await;

        let producer = producer_transport
            .produce(audio_producer_options(MimeTypeAudio::Opus, 111))
            .await
            .expect("Failed to produce audio");

        let consumer = consumer_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                device_capabilities(&router),
            ))
            .await
            .expect("Failed to consume audio");

        let dump = consumer_transport
            .dump()
            .await
            .expect("Failed to dump transport");
        assert_eq!(dump["consumerIds"], json!([consumer.id()]));

        let (mut producer_close_tx, producer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.on_producer_close(move || {
            let _ = producer_close_tx.send(());
        });
        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.observer().on_close(move || {
            let _ = close_tx.send(());
        });

        fake_worker.notify(consumer.id(), "producerclose", json!(null));

        producer_close_rx
            .await
            .expect("Failed to receive producer_close event");
        close_rx.await.expect("Failed to receive close event");
        assert!(consumer.closed());
        assert!(!producer.closed());

        let dump = consumer_transport
            .dump()
            .await
            .expect("Failed to dump transport");
        assert_eq!(dump["consumerIds"], json!([]));

        // Already closed by the worker, closing again sends nothing.
        consumer.close();
        assert_eq!(fake_worker.count("consumer.close"), 0);
    });
}

#[test]
fn consumer_of_paused_producer() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (_fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![opus()]).await;

        let producer_transport = create_webrtc_transport(&router, false).await;
        let consumer_transport = create_webrtc_transport(&router, false).await;

        let producer = producer_transport
            .produce({
                let mut options = audio_producer_options(MimeTypeAudio::Opus, 111);
                options.paused = true;
                options
            })
            .await
            .expect("Failed to produce audio");

        let consumer = consumer_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                device_capabilities(&router),
            ))
            .await
            .expect("Failed to consume audio");

        assert!(!consumer.paused());
        assert!(consumer.producer_paused());

        let observer_resume_count = Arc::new(AtomicUsize::new(0));
        let _handler = consumer.observer().on_resume({
            let observer_resume_count = Arc::clone(&observer_resume_count);

            move || {
                observer_resume_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Consumer side is not paused, the producer still is.
        consumer.resume().await.expect("Failed to resume consumer");
        assert!(!consumer.paused());
        assert_eq!(observer_resume_count.load(Ordering::SeqCst), 0);

        let (producer_resume_tx, producer_resume_rx) = async_oneshot::oneshot::<()>();
        let producer_resume_tx = Mutex::new(Some(producer_resume_tx));
        let _handler = consumer.on_producer_resume(move || {
            if let Some(mut producer_resume_tx) = producer_resume_tx.lock().take() {
                let _ = producer_resume_tx.send(());
            }
        });

        producer.resume().await.expect("Failed to resume producer");

        producer_resume_rx
            .await
            .expect("Failed to receive producer_resume event");
        assert!(!consumer.producer_paused());
        assert_eq!(observer_resume_count.load(Ordering::SeqCst), 1);
    });
}
