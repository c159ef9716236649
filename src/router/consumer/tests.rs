use crate::consumer::{ConsumerLayers, ConsumerOptions, ConsumerScore, ConsumerType};
use crate::data_structures::TransportListenIp;
use crate::fake_worker::FakeWorker;
use crate::ortc::RtpParametersError;
use crate::producer::{Producer, ProducerId, ProducerOptions};
use crate::router::{Router, RouterOptions};
use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtpCapabilities, RtpCodecCapability,
    RtpCodecParameters, RtpCodecParametersParameters, RtpEncodingParameters, RtpParameters,
};
use crate::transport::{ConsumeError, Transport};
use crate::webrtc_transport::{TransportListenIps, WebRtcTransport, WebRtcTransportOptions};
use crate::worker::{Worker, WorkerSettings};
use crate::worker_manager::WorkerManager;
use futures_lite::future;
use parking_lot::Mutex;
use serde_json::json;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::num::{NonZeroU32, NonZeroU8};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct TestContext {
    fake_worker: FakeWorker,
    // Closing the worker would close everything else.
    _worker: Worker,
    router: Router,
    producer_transport: WebRtcTransport,
    consumer_transport: WebRtcTransport,
    producer: Producer,
}

fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability::audio(
            MimeTypeAudio::Opus,
            NonZeroU32::new(48000).unwrap(),
            NonZeroU8::new(2).unwrap(),
        ),
        RtpCodecCapability::video(MimeTypeVideo::Vp8, NonZeroU32::new(90000).unwrap()),
    ]
}

fn audio_producer_options() -> ProducerOptions {
    ProducerOptions::new(
        MediaKind::Audio,
        RtpParameters {
            mid: Some("AUDIO".to_string()),
            codecs: vec![RtpCodecParameters {
                mime_type: MimeType::Audio(MimeTypeAudio::Opus),
                payload_type: 111,
                clock_rate: NonZeroU32::new(48000).unwrap(),
                channels: NonZeroU8::new(2),
                parameters: RtpCodecParametersParameters::from([
                    ("useinbandfec", 1_u32),
                    ("usedtx", 1_u32),
                ]),
                rtcp_feedback: vec![],
            }],
            encodings: vec![RtpEncodingParameters {
                ssrc: Some(11111111),
                ..RtpEncodingParameters::default()
            }],
            ..RtpParameters::default()
        },
    )
}

fn consumer_device_capabilities() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![RtpCodecCapability::audio(
            MimeTypeAudio::Opus,
            NonZeroU32::new(48000).unwrap(),
            NonZeroU8::new(2).unwrap(),
        )
        .with_preferred_payload_type(100)],
        header_extensions: vec![],
    }
}

async fn init() -> TestContext {
    {
        let mut builder = env_logger::builder();
        if env::var(env_logger::DEFAULT_FILTER_ENV).is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }
        let _ = builder.is_test(true).try_init();
    }

    let worker_manager = WorkerManager::new();
    let (fake_worker, ends) = FakeWorker::spawn(1);

    let worker = worker_manager
        .create_worker(ends.into(), WorkerSettings::default())
        .await
        .expect("Failed to create worker");

    let router = worker
        .create_router(RouterOptions::new(media_codecs()))
        .await
        .expect("Failed to create router");

    let transport_options = WebRtcTransportOptions::new(TransportListenIps::new(
        TransportListenIp {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            announced_ip: None,
        },
    ));

    let producer_transport = router
        .create_webrtc_transport(transport_options.clone())
        .await
        .expect("Failed to create transport");

    let consumer_transport = router
        .create_webrtc_transport(transport_options)
        .await
        .expect("Failed to create transport");

    let producer = producer_transport
        .produce(audio_producer_options())
        .await
        .expect("Failed to produce audio");

    TestContext {
        fake_worker,
        _worker: worker,
        router,
        producer_transport,
        consumer_transport,
        producer,
    }
}

#[test]
fn consume_succeeds() {
    future::block_on(async move {
        let context = init().await;

        let new_consumers = Arc::new(AtomicUsize::new(0));
        let _handler = context.consumer_transport.observer().on_new_consumer({
            let new_consumers = Arc::clone(&new_consumers);

            move |_consumer| {
                new_consumers.fetch_add(1, Ordering::SeqCst);
            }
        });

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        assert_eq!(new_consumers.load(Ordering::SeqCst), 1);
        assert_eq!(consumer.producer_id(), context.producer.id());
        assert_eq!(consumer.kind(), MediaKind::Audio);
        assert_eq!(consumer.r#type(), ConsumerType::Simple);
        assert!(!consumer.paused());
        assert!(!consumer.producer_paused());
        assert_eq!(consumer.priority(), 1);
        assert_eq!(
            consumer.score(),
            ConsumerScore {
                score: 10,
                producer_score: 0,
                producer_scores: vec![],
            },
        );
        assert_eq!(consumer.current_layers(), None);

        let rtp_parameters = consumer.rtp_parameters();
        assert_eq!(rtp_parameters.mid, Some("0".to_string()));
        assert_eq!(rtp_parameters.codecs.len(), 1);
        assert_eq!(rtp_parameters.codecs[0].payload_type, 100);
        assert_eq!(rtp_parameters.encodings.len(), 1);
        assert!(rtp_parameters.encodings[0].ssrc.is_some());

        let second_consumer = context
            .consumer_transport
            .consume({
                let mut options =
                    ConsumerOptions::new(context.producer.id(), consumer_device_capabilities());
                options.paused = true;
                options
            })
            .await
            .expect("Failed to consume audio");

        assert!(second_consumer.paused());
        assert_eq!(second_consumer.rtp_parameters().mid, Some("1".to_string()));

        let request = context
            .fake_worker
            .last_request("transport.consume")
            .expect("No consume request");
        assert_eq!(request["data"]["paused"], true);
        assert_eq!(request["data"]["type"], "simple");
    });
}

#[test]
fn consume_errors() {
    future::block_on(async move {
        let context = init().await;

        let unknown_producer_id = ProducerId::from(uuid::Uuid::new_v4());
        assert_eq!(
            context
                .consumer_transport
                .consume(ConsumerOptions::new(
                    unknown_producer_id,
                    consumer_device_capabilities(),
                ))
                .await
                .err(),
            Some(ConsumeError::ProducerNotFound(unknown_producer_id)),
        );

        let video_only = RtpCapabilities {
            codecs: vec![
                RtpCodecCapability::video(MimeTypeVideo::Vp8, NonZeroU32::new(90000).unwrap())
                    .with_preferred_payload_type(101),
            ],
            header_extensions: vec![],
        };
        assert!(matches!(
            context
                .consumer_transport
                .consume(ConsumerOptions::new(context.producer.id(), video_only))
                .await,
            Err(ConsumeError::IncompatibleRemoteRtpCapabilities(_)),
        ));

        let rtx_without_apt = RtpCapabilities {
            codecs: vec![
                RtpCodecCapability::video(MimeTypeVideo::Rtx, NonZeroU32::new(90000).unwrap())
                    .with_preferred_payload_type(102),
            ],
            header_extensions: vec![],
        };
        assert_eq!(
            context
                .consumer_transport
                .consume(ConsumerOptions::new(context.producer.id(), rtx_without_apt))
                .await
                .err(),
            Some(ConsumeError::InvalidRtpCapabilities(
                RtpParametersError::InvalidAptParameter { payload_type: 102 },
            )),
        );

        // Nothing reached the worker.
        assert_eq!(context.fake_worker.count("transport.consume"), 0);

        context.consumer_transport.close();
        assert_eq!(
            context
                .consumer_transport
                .consume(ConsumerOptions::new(
                    context.producer.id(),
                    consumer_device_capabilities(),
                ))
                .await
                .err(),
            Some(ConsumeError::TransportClosed),
        );
    });
}

#[test]
fn pause_and_resume() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let events = Arc::new(Mutex::new(Vec::new()));
        let _handler = consumer.observer().on_pause({
            let events = Arc::clone(&events);

            move || {
                events.lock().push("pause");
            }
        });
        let _handler = consumer.observer().on_resume({
            let events = Arc::clone(&events);

            move || {
                events.lock().push("resume");
            }
        });

        consumer.pause().await.expect("Failed to pause consumer");
        assert!(consumer.paused());

        // Pausing again doesn't emit another event.
        consumer.pause().await.expect("Failed to pause consumer");

        consumer.resume().await.expect("Failed to resume consumer");
        assert!(!consumer.paused());

        assert_eq!(events.lock().as_slice(), &["pause", "resume"]);
        assert_eq!(context.fake_worker.count("consumer.pause"), 2);
        assert_eq!(context.fake_worker.count("consumer.resume"), 1);
    });
}

#[test]
fn producer_pause_is_propagated() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let (producer_pause_tx, producer_pause_rx) = async_oneshot::oneshot::<()>();
        let producer_pause_tx = Mutex::new(Some(producer_pause_tx));
        let _handler = consumer.on_producer_pause(move || {
            if let Some(mut producer_pause_tx) = producer_pause_tx.lock().take() {
                let _ = producer_pause_tx.send(());
            }
        });
        let observer_pauses = Arc::new(AtomicUsize::new(0));
        let _handler = consumer.observer().on_pause({
            let observer_pauses = Arc::clone(&observer_pauses);

            move || {
                observer_pauses.fetch_add(1, Ordering::SeqCst);
            }
        });

        context
            .producer
            .pause()
            .await
            .expect("Failed to pause producer");

        producer_pause_rx
            .await
            .expect("Failed to receive producer_pause event");

        assert!(consumer.producer_paused());
        assert!(!consumer.paused());
        assert_eq!(observer_pauses.load(Ordering::SeqCst), 1);

        // A consumer created now learns about the paused producer from the worker.
        let late_consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");
        assert!(late_consumer.producer_paused());
    });
}

#[test]
fn producer_close_closes_consumer() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let (mut producer_close_tx, producer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.on_producer_close(move || {
            let _ = producer_close_tx.send(());
        });
        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.observer().on_close(move || {
            let _ = close_tx.send(());
        });

        context.producer.close();

        producer_close_rx
            .await
            .expect("Failed to receive producer_close event");
        close_rx.await.expect("Failed to receive close event");

        assert!(consumer.closed());
        // Worker already closed it, no request is needed.
        assert_eq!(context.fake_worker.count("consumer.close"), 0);
    });
}

#[test]
fn transport_close_closes_consumer() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let (mut transport_close_tx, transport_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = consumer.on_transport_close(move || {
            let _ = transport_close_tx.send(());
        });

        context.consumer_transport.close();

        transport_close_rx
            .await
            .expect("Failed to receive transport_close event");
        assert!(consumer.closed());
        assert!(!context.producer.closed());

        context.producer_transport.close();
        assert!(context.producer.closed());

        // Router lost the producer.
        assert!(!context
            .router
            .can_consume(&context.producer.id(), &consumer_device_capabilities()));
    });
}

#[test]
fn score_and_layers_notifications() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let (score_tx, score_rx) = async_oneshot::oneshot::<ConsumerScore>();
        let score_tx = Mutex::new(Some(score_tx));
        let _handler = consumer.on_score(move |score| {
            if let Some(mut score_tx) = score_tx.lock().take() {
                let _ = score_tx.send(score.clone());
            }
        });

        let (layers_tx, layers_rx) = async_oneshot::oneshot::<Option<ConsumerLayers>>();
        let layers_tx = Mutex::new(Some(layers_tx));
        let _handler = consumer.observer().on_layers_change(move |layers| {
            if let Some(mut layers_tx) = layers_tx.lock().take() {
                let _ = layers_tx.send(*layers);
            }
        });

        context.fake_worker.notify(
            consumer.id(),
            "score",
            json!({ "score": 7, "producerScore": 9, "producerScores": [9] }),
        );
        let expected_score = ConsumerScore {
            score: 7,
            producer_score: 9,
            producer_scores: vec![9],
        };
        assert_eq!(score_rx.await.ok(), Some(expected_score.clone()));
        assert_eq!(consumer.score(), expected_score);

        context.fake_worker.notify(
            consumer.id(),
            "layerschange",
            json!({ "spatialLayer": 1, "temporalLayer": 0 }),
        );
        let expected_layers = Some(ConsumerLayers {
            spatial_layer: 1,
            temporal_layer: Some(0),
        });
        assert_eq!(layers_rx.await.ok(), Some(expected_layers));
        assert_eq!(consumer.current_layers(), expected_layers);
    });
}

#[test]
fn preferred_layers_and_priority() {
    future::block_on(async move {
        let context = init().await;

        let consumer = context
            .consumer_transport
            .consume(ConsumerOptions::new(
                context.producer.id(),
                consumer_device_capabilities(),
            ))
            .await
            .expect("Failed to consume audio");

        let layers = ConsumerLayers {
            spatial_layer: 2,
            temporal_layer: Some(1),
        };
        consumer
            .set_preferred_layers(layers)
            .await
            .expect("Failed to set preferred layers");
        assert_eq!(consumer.preferred_layers(), Some(layers));

        consumer
            .set_priority(3)
            .await
            .expect("Failed to set priority");
        assert_eq!(consumer.priority(), 3);

        consumer
            .unset_priority()
            .await
            .expect("Failed to unset priority");
        assert_eq!(consumer.priority(), 1);
    });
}
