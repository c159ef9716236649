use crate::common::{create_router, init_logging, start_worker, vp8, wait_for};
use futures_lite::future;
use serde_json::json;
use sfu_control::data_consumer::DataConsumerOptions;
use sfu_control::data_producer::DataProducerOptions;
use sfu_control::data_structures::TransportListenIp;
use sfu_control::router::{PipeToRouterOptions, Router};
use sfu_control::sctp_parameters::{NumSctpStreams, SctpStreamParameters};
use sfu_control::transport::{ConsumeDataError, Transport};
use sfu_control::webrtc_transport::{TransportListenIps, WebRtcTransport, WebRtcTransportOptions};
use sfu_control::worker_manager::WorkerManager;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

async fn create_transport(router: &Router, num_sctp_streams: NumSctpStreams) -> WebRtcTransport {
    router
        .create_webrtc_transport({
            let mut transport_options =
                WebRtcTransportOptions::new(TransportListenIps::new(TransportListenIp {
                    ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    announced_ip: None,
                }));
            transport_options.enable_sctp = true;
            transport_options.num_sctp_streams = num_sctp_streams;
            transport_options
        })
        .await
        .expect("Failed to create transport")
}

#[test]
fn concurrent_data_consumers_get_distinct_stream_ids() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![vp8()]).await;

        let producer_transport = create_transport(&router, NumSctpStreams::default()).await;
        let consumer_transport = create_transport(&router, NumSctpStreams { os: 4, mis: 4 }).await;

        let data_producer = producer_transport
            .produce_data(DataProducerOptions::new_sctp(
                SctpStreamParameters::new_ordered(0),
            ))
            .await
            .expect("Failed to produce data");

        // Both requests are in flight at the same time.
        fake_worker.hold("transport.consumeData");
        let consume = future::zip(
            consumer_transport.consume_data(DataConsumerOptions::new_sctp(data_producer.id())),
            consumer_transport.consume_data(DataConsumerOptions::new_sctp(data_producer.id())),
        );
        let release = async {
            wait_for(|| fake_worker.held_count() == 2).await;
            fake_worker.release("transport.consumeData");
        };
        let ((data_consumer_1, data_consumer_2), ()) = future::zip(consume, release).await;

        let data_consumer_1 = data_consumer_1.expect("Failed to consume data");
        let data_consumer_2 = data_consumer_2.expect("Failed to consume data");

        let stream_ids = [&data_consumer_1, &data_consumer_2]
            .iter()
            .map(|data_consumer| data_consumer.sctp_stream_parameters().stream_id())
            .collect::<HashSet<_>>();
        assert_eq!(stream_ids, [0, 1].into_iter().collect::<HashSet<_>>());

        let dump = consumer_transport
            .dump()
            .await
            .expect("Failed to dump transport");
        assert_eq!(
            dump["dataConsumerIds"].as_array().map(Vec::len),
            Some(2),
        );
    });
}

#[test]
fn data_producer_close_releases_stream_ids() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (_fake_worker, worker) = start_worker(&worker_manager, 1).await;
        let router = create_router(&worker, vec![vp8()]).await;

        let producer_transport = create_transport(&router, NumSctpStreams::default()).await;
        let consumer_transport = create_transport(&router, NumSctpStreams { os: 1, mis: 1 }).await;

        let data_producer_1 = producer_transport
            .produce_data(DataProducerOptions::new_sctp(
                SctpStreamParameters::new_ordered(0),
            ))
            .await
            .expect("Failed to produce data");
        let data_producer_2 = producer_transport
            .produce_data(DataProducerOptions::new_sctp(
                SctpStreamParameters::new_ordered(1),
            ))
            .await
            .expect("Failed to produce data");

        let data_consumer = consumer_transport
            .consume_data(DataConsumerOptions::new_sctp(data_producer_1.id()))
            .await
            .expect("Failed to consume data");
        assert_eq!(data_consumer.sctp_stream_parameters().stream_id(), 0);

        assert_eq!(
            consumer_transport
                .consume_data(DataConsumerOptions::new_sctp(data_producer_2.id()))
                .await
                .err(),
            Some(ConsumeDataError::NoSctpStreamId),
        );

        let (mut data_producer_close_tx, data_producer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = data_consumer.on_data_producer_close(move || {
            let _ = data_producer_close_tx.send(());
        });
        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _handler = data_consumer.observer().on_close(move || {
            let _ = close_tx.send(());
        });

        data_producer_1.close();

        data_producer_close_rx
            .await
            .expect("Failed to receive data_producer_close event");
        close_rx.await.expect("Failed to receive close event");
        assert!(data_consumer.closed());

        let data_consumer = consumer_transport
            .consume_data(DataConsumerOptions::new_sctp(data_producer_2.id()))
            .await
            .expect("Failed to consume data");
        assert_eq!(data_consumer.sctp_stream_parameters().stream_id(), 0);

        let dump = consumer_transport
            .dump()
            .await
            .expect("Failed to dump transport");
        assert_eq!(dump["dataConsumerIds"], json!([data_consumer.id()]));
    });
}

#[test]
fn pipe_data_producer_to_other_worker() {
    future::block_on(async move {
        init_logging();

        let worker_manager = WorkerManager::new();
        let (fake_worker_1, worker_1) = start_worker(&worker_manager, 1).await;
        let (fake_worker_2, worker_2) = start_worker(&worker_manager, 2).await;
        let router_1 = create_router(&worker_1, vec![vp8()]).await;
        let router_2 = create_router(&worker_2, vec![vp8()]).await;

        let transport = create_transport(&router_1, NumSctpStreams::default()).await;
        let data_producer = transport
            .produce_data({
                let mut options =
                    DataProducerOptions::new_sctp(SctpStreamParameters::new_ordered(3));
                options.label = "chat".to_string();
                options
            })
            .await
            .expect("Failed to produce data");

        let pair = router_1
            .pipe_data_producer_to_router(
                data_producer.id(),
                PipeToRouterOptions::new(router_2.clone()),
            )
            .await
            .expect("Failed to pipe data producer");

        assert_eq!(pair.pipe_data_producer.id(), data_producer.id());
        assert_eq!(pair.pipe_data_producer.label(), "chat");
        assert_eq!(fake_worker_1.count("router.createPipeTransport"), 1);
        assert_eq!(fake_worker_2.count("router.createPipeTransport"), 1);

        // Piped data producer is consumable in the other router.
        let consumer_transport = create_transport(&router_2, NumSctpStreams::default()).await;
        let data_consumer = consumer_transport
            .consume_data(DataConsumerOptions::new_sctp(data_producer.id()))
            .await
            .expect("Failed to consume piped data producer");
        assert_eq!(data_consumer.label(), "chat");

        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _handler = pair.pipe_data_producer.observer().on_close(move || {
            let _ = close_tx.send(());
        });

        data_producer.close();

        close_rx
            .await
            .expect("Failed to receive pipe data producer close event");
        assert!(pair.pipe_data_consumer.closed());
    });
}
