use crate::consumer::ConsumerOptions;
use crate::data_structures::{SctpState, TransportListenIp, TransportProtocol, TransportTuple};
use crate::fake_worker::FakeWorker;
use crate::plain_transport::{PlainTransportOptions, PlainTransportRemoteParameters};
use crate::producer::ProducerId;
use crate::router::{NewTransport, Router, RouterOptions};
use crate::rtp_parameters::RtpCapabilities;
use crate::transport::{ConsumeError, Transport};
use crate::worker::{RequestError, Worker, WorkerSettings};
use crate::worker_manager::WorkerManager;
use async_io::Timer;
use futures_lite::future;
use parking_lot::Mutex;
use serde_json::json;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

async fn init() -> (FakeWorker, Worker, Router) {
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
        .create_router(RouterOptions::default())
        .await
        .expect("Failed to create router");

    (fake_worker, worker, router)
}

fn listen_ip() -> TransportListenIp {
    TransportListenIp {
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        announced_ip: None,
    }
}

#[test]
fn create_succeeds() {
    future::block_on(async move {
        let (fake_worker, _worker, router) = init().await;

        let (new_transport_tx, new_transport_rx) = async_oneshot::oneshot::<()>();
        let new_transport_tx = Mutex::new(Some(new_transport_tx));
        let _handler = router.on_new_transport(move |transport| {
            if matches!(transport, NewTransport::Plain(_)) {
                if let Some(mut new_transport_tx) = new_transport_tx.lock().take() {
                    let _ = new_transport_tx.send(());
                }
            }
        });

        let transport = router
            .create_plain_transport({
                let mut transport_options = PlainTransportOptions::new(TransportListenIp {
                    ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    announced_ip: Some(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 1))),
                });
                transport_options.enable_sctp = true;
                transport_options
            })
            .await
            .expect("Failed to create plain transport");

        new_transport_rx
            .await
            .expect("Failed to receive new_transport event");

        assert!(!transport.closed());
        assert_eq!(transport.router_id(), router.id());

        let tuple = transport.tuple();
        assert_eq!(tuple.local_ip, IpAddr::V4(Ipv4Addr::new(9, 9, 9, 1)));
        assert_eq!(tuple.protocol, TransportProtocol::Udp);
        assert_eq!(tuple.remote_ip, None);
        assert_eq!(transport.rtcp_tuple(), None);

        let sctp_parameters = transport
            .sctp_parameters()
            .expect("SCTP parameters must be present");
        assert_eq!(sctp_parameters.port, 5000);
        assert_eq!(sctp_parameters.max_message_size, 262_144);
        assert_eq!(transport.sctp_state(), Some(SctpState::New));

        let request = fake_worker
            .last_request("router.createPlainRtpTransport")
            .expect("No createPlainRtpTransport request");
        assert_eq!(request["data"]["rtcpMux"], true);
        assert_eq!(request["data"]["comedia"], false);
        assert_eq!(request["data"]["isDataChannel"], false);
    });
}

#[test]
fn create_without_rtcp_mux() {
    future::block_on(async move {
        let (_fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport({
                let mut transport_options = PlainTransportOptions::new(listen_ip());
                transport_options.rtcp_mux = false;
                transport_options
            })
            .await
            .expect("Failed to create plain transport");

        assert!(transport.rtcp_tuple().is_some());
        assert_eq!(transport.sctp_parameters(), None);
        assert_eq!(transport.sctp_state(), None);
    });
}

#[test]
fn multi_source_transport_only_receives() {
    future::block_on(async move {
        let (fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport({
                let mut transport_options = PlainTransportOptions::new(listen_ip());
                transport_options.comedia = true;
                transport_options.multi_source = true;
                transport_options
            })
            .await
            .expect("Failed to create plain transport");

        assert!(transport.multi_source());

        let request = fake_worker
            .last_request("router.createPlainRtpTransport")
            .expect("No create request");
        assert_eq!(request["data"]["multiSource"], true);
        assert_eq!(request["data"]["comedia"], false);

        assert_eq!(
            transport
                .consume(ConsumerOptions::new(
                    ProducerId::from(uuid::Uuid::new_v4()),
                    RtpCapabilities::default(),
                ))
                .await
                .err(),
            Some(ConsumeError::ReceiveOnly),
        );
        assert_eq!(fake_worker.count("transport.consume"), 0);
    });
}

#[test]
fn connect_sets_remote_tuples() {
    future::block_on(async move {
        let (_fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport({
                let mut transport_options = PlainTransportOptions::new(listen_ip());
                transport_options.rtcp_mux = false;
                transport_options
            })
            .await
            .expect("Failed to create plain transport");

        transport
            .connect(PlainTransportRemoteParameters {
                ip: Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))),
                port: Some(1234),
                rtcp_port: Some(1235),
            })
            .await
            .expect("Failed to connect plain transport");

        let tuple = transport.tuple();
        assert_eq!(tuple.remote_ip, Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
        assert_eq!(tuple.remote_port, Some(1234));

        let rtcp_tuple = transport.rtcp_tuple().expect("RTCP tuple must be present");
        assert_eq!(rtcp_tuple.remote_port, Some(1235));
    });
}

#[test]
fn connect_rejected_by_worker() {
    future::block_on(async move {
        let (fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport(PlainTransportOptions::new(listen_ip()))
            .await
            .expect("Failed to create plain transport");

        let tuple_before = transport.tuple();

        fake_worker.reject("transport.connect", "missing port");

        assert_eq!(
            transport
                .connect(PlainTransportRemoteParameters::default())
                .await
                .err(),
            Some(RequestError::Response {
                reason: "missing port".to_string(),
            }),
        );
        assert_eq!(transport.tuple(), tuple_before);
    });
}

#[test]
fn comedia_tuple_notifications() {
    future::block_on(async move {
        let (fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport({
                let mut transport_options = PlainTransportOptions::new(listen_ip());
                transport_options.comedia = true;
                transport_options.rtcp_mux = false;
                transport_options
            })
            .await
            .expect("Failed to create plain transport");

        let (tuple_tx, tuple_rx) = async_oneshot::oneshot::<TransportTuple>();
        let tuple_tx = Mutex::new(Some(tuple_tx));
        let _handler = transport.on_tuple(move |tuple| {
            if let Some(mut tuple_tx) = tuple_tx.lock().take() {
                let _ = tuple_tx.send(*tuple);
            }
        });

        let (rtcp_tuple_tx, rtcp_tuple_rx) = async_oneshot::oneshot::<TransportTuple>();
        let rtcp_tuple_tx = Mutex::new(Some(rtcp_tuple_tx));
        let _handler = transport.on_rtcp_tuple(move |rtcp_tuple| {
            if let Some(mut rtcp_tuple_tx) = rtcp_tuple_tx.lock().take() {
                let _ = rtcp_tuple_tx.send(*rtcp_tuple);
            }
        });

        let local_port = transport.tuple().local_port;

        fake_worker.notify(
            transport.id(),
            "tuple",
            json!({
                "tuple": {
                    "localIp": "127.0.0.1",
                    "localPort": local_port,
                    "remoteIp": "5.6.7.8",
                    "remotePort": 20000,
                    "protocol": "udp",
                },
            }),
        );

        let tuple = tuple_rx.await.expect("Failed to receive tuple event");
        assert_eq!(tuple.remote_ip, Some(IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8))));
        assert_eq!(transport.tuple(), tuple);

        fake_worker.notify(
            transport.id(),
            "rtcptuple",
            json!({
                "rtcpTuple": {
                    "localIp": "127.0.0.1",
                    "localPort": local_port + 1,
                    "remoteIp": "5.6.7.8",
                    "remotePort": 20001,
                    "protocol": "udp",
                },
            }),
        );

        let rtcp_tuple = rtcp_tuple_rx
            .await
            .expect("Failed to receive rtcp_tuple event");
        assert_eq!(rtcp_tuple.remote_port, Some(20001));
        assert_eq!(transport.rtcp_tuple(), Some(rtcp_tuple));
    });
}

#[test]
fn router_close_event() {
    future::block_on(async move {
        let (fake_worker, _worker, router) = init().await;

        let transport = router
            .create_plain_transport(PlainTransportOptions::new(listen_ip()))
            .await
            .expect("Failed to create plain transport");

        let (mut router_close_tx, router_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = transport.on_router_close(Box::new(move || {
            let _ = router_close_tx.send(());
        }));

        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _handler = transport.observer().on_close(move || {
            let _ = close_tx.send(());
        });

        router.close();

        router_close_rx
            .await
            .expect("Failed to receive router_close event");
        close_rx.await.expect("Failed to receive close event");
        assert!(transport.closed());

        Timer::after(Duration::from_millis(50)).await;
        assert_eq!(fake_worker.count("transport.close"), 0);
    });
}
