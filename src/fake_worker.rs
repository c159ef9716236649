//! In-process stand-in for the media worker process.
//!
//! Speaks the JSON channel protocol over a pair of `async_channel` queues, keeps just enough
//! state to answer requests the way the real worker does and reproduces the notifications the
//! worker sends on its own (`producerclose`, `producerpause`, `dataproducerclose`, ...).
#![allow(dead_code)]

use futures_lite::future;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;
use std::thread;

/// Library side ends of a fake worker, turned into a `WorkerConnection` by tests.
pub struct FakeWorkerEnds {
    pub pid: u32,
    pub sender: async_channel::Sender<Vec<u8>>,
    pub receiver: async_channel::Receiver<Vec<u8>>,
    pub exit: async_oneshot::Receiver<i32>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum TransportKind {
    WebRtc,
    Plain,
    Pipe,
}

struct FakeTransport {
    router_id: String,
    kind: TransportKind,
    tuple: Value,
}

struct FakeProducer {
    transport_id: String,
    paused: bool,
    consumers: HashSet<String>,
}

struct FakeDataProducer {
    transport_id: String,
    data_consumers: HashSet<String>,
}

struct FakeEntity {
    transport_id: String,
    parent_id: String,
}

#[derive(Default)]
struct State {
    requests: Vec<Value>,
    rejections: HashMap<String, String>,
    overrides: HashMap<String, Value>,
    holds: HashSet<String>,
    held: Vec<Value>,
    routers: HashSet<String>,
    transports: HashMap<String, FakeTransport>,
    producers: HashMap<String, FakeProducer>,
    consumers: HashMap<String, FakeEntity>,
    data_producers: HashMap<String, FakeDataProducer>,
    data_consumers: HashMap<String, FakeEntity>,
    rtp_observers: HashMap<String, String>,
    next_port: u16,
    next_ice_generation: u32,
}

struct Core {
    pid: u32,
    state: Mutex<State>,
    to_lib: async_channel::Sender<Vec<u8>>,
    exit: Mutex<Option<async_oneshot::Sender<i32>>>,
}

/// Handle to control a running fake worker.
#[derive(Clone)]
pub struct FakeWorker {
    core: Arc<Core>,
}

impl FakeWorker {
    /// Starts a fake worker that reports being ready right away.
    pub fn spawn(pid: u32) -> (Self, FakeWorkerEnds) {
        let (fake_worker, ends) = Self::spawn_not_ready(pid);
        fake_worker.announce_running();
        (fake_worker, ends)
    }

    /// Starts a fake worker that doesn't report being ready until
    /// [`FakeWorker::announce_running`] is called.
    pub fn spawn_not_ready(pid: u32) -> (Self, FakeWorkerEnds) {
        let (to_worker_sender, to_worker_receiver) = async_channel::unbounded::<Vec<u8>>();
        let (to_lib_sender, to_lib_receiver) = async_channel::unbounded::<Vec<u8>>();
        let (exit_sender, exit_receiver) = async_oneshot::oneshot::<i32>();

        let core = Arc::new(Core {
            pid,
            state: Mutex::new(State {
                next_port: 40000,
                ..State::default()
            }),
            to_lib: to_lib_sender,
            exit: Mutex::new(Some(exit_sender)),
        });

        {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                while let Ok(bytes) = future::block_on(to_worker_receiver.recv()) {
                    match serde_json::from_slice::<Value>(&bytes) {
                        Ok(request) => core.receive(request),
                        Err(error) => panic!("fake worker received invalid JSON: {}", error),
                    }
                }

                // The library closed its end, which is how a worker process gets killed.
                core.exit(0);
            });
        }

        let ends = FakeWorkerEnds {
            pid,
            sender: to_worker_sender,
            receiver: to_lib_receiver,
            exit: exit_receiver,
        };

        (Self { core }, ends)
    }

    pub fn announce_running(&self) {
        self.notify(self.core.pid, "running", Value::Null);
    }

    /// Sends a notification to the library.
    pub fn notify(&self, target_id: impl Display, event: &str, data: Value) {
        self.core.notify(&target_id.to_string(), event, data);
    }

    /// Sends raw bytes to the library, as if the worker wrote garbage into the channel.
    pub fn send_raw(&self, bytes: &[u8]) {
        let _ = future::block_on(self.core.to_lib.send(bytes.to_vec()));
    }

    /// Every request with this method is answered with an error carrying `reason`.
    pub fn reject(&self, method: &str, reason: &str) {
        self.core
            .state
            .lock()
            .rejections
            .insert(method.to_string(), reason.to_string());
    }

    /// Fields of `overrides` replace the ones of every successful response with this method.
    pub fn override_response(&self, method: &str, overrides: Value) {
        self.core
            .state
            .lock()
            .overrides
            .insert(method.to_string(), overrides);
    }

    /// Requests with this method are not answered until [`FakeWorker::release`] is called.
    pub fn hold(&self, method: &str) {
        self.core.state.lock().holds.insert(method.to_string());
    }

    /// Answers held requests with this method and stops holding new ones.
    pub fn release(&self, method: &str) {
        let held = {
            let mut state = self.core.state.lock();
            state.holds.remove(method);
            let (released, held) = std::mem::take(&mut state.held)
                .into_iter()
                .partition::<Vec<_>, _>(|request| request["method"] == method);
            state.held = held;
            released
        };

        for request in held {
            self.core.answer(request);
        }
    }

    /// Number of requests currently held back.
    pub fn held_count(&self) -> usize {
        self.core.state.lock().held.len()
    }

    /// The worker process exits with the given code.
    pub fn exit(&self, code: i32) {
        self.core.exit(code);
    }

    /// Methods of all received requests, in order.
    pub fn methods(&self) -> Vec<String> {
        self.core
            .state
            .lock()
            .requests
            .iter()
            .filter_map(|request| request["method"].as_str().map(str::to_string))
            .collect()
    }

    /// How many requests with this method were received.
    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    /// Last received request with this method.
    pub fn last_request(&self, method: &str) -> Option<Value> {
        self.core
            .state
            .lock()
            .requests
            .iter()
            .rev()
            .find(|request| request["method"] == method)
            .cloned()
    }

    pub fn transport_count(&self) -> usize {
        self.core.state.lock().transports.len()
    }

    pub fn producer_count(&self) -> usize {
        self.core.state.lock().producers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.core.state.lock().consumers.len()
    }
}

impl Core {
    fn send(&self, message: Value) {
        let _ = future::block_on(self.to_lib.send(message.to_string().into_bytes()));
    }

    fn notify(&self, target_id: &str, event: &str, data: Value) {
        let mut message = json!({
            "targetId": target_id,
            "event": event,
        });
        if !data.is_null() {
            message["data"] = data;
        }
        self.send(message);
    }

    fn exit(&self, code: i32) {
        let exit = self.exit.lock().take();
        if let Some(mut exit) = exit {
            let _ = exit.send(code);
            self.to_lib.close();
        }
    }

    fn receive(&self, request: Value) {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            if state.holds.contains(&method) {
                state.held.push(request);
                return;
            }
        }

        self.answer(request);
    }

    fn answer(&self, request: Value) {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default().to_string();

        let rejection = self.state.lock().rejections.get(&method).cloned();
        if let Some(reason) = rejection {
            self.send(json!({ "id": id, "error": "Error", "reason": reason }));
            return;
        }

        let (data, notifications) = {
            let mut state = self.state.lock();
            let mut notifications = Vec::new();
            let mut data = state.handle(self.pid, &method, &request, &mut notifications);
            if let (Ok(Value::Object(fields)), Some(Value::Object(overrides))) =
                (&mut data, state.overrides.get(&method))
            {
                for (key, value) in overrides {
                    fields.insert(key.clone(), value.clone());
                }
            }
            (data, notifications)
        };

        for (target_id, event) in notifications {
            self.notify(&target_id, event, Value::Null);
        }

        match data {
            Ok(Value::Null) => self.send(json!({ "id": id, "accepted": true })),
            Ok(data) => self.send(json!({ "id": id, "accepted": true, "data": data })),
            Err(reason) => self.send(json!({ "id": id, "error": "Error", "reason": reason })),
        }
    }
}

fn id_of(request: &Value, key: &str) -> String {
    request["internal"][key]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Producers are scoped to their router, a piped producer reuses the id of the original one.
fn scoped_id_of(request: &Value, key: &str) -> String {
    format!("{}/{}", id_of(request, "routerId"), id_of(request, key))
}

fn fingerprint() -> Value {
    let value = (0..32_u8)
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":");
    json!({ "algorithm": "sha-256", "value": value })
}

fn sctp_parameters(data: &Value) -> Option<Value> {
    if data["enableSctp"].as_bool() != Some(true) {
        return None;
    }

    Some(json!({
        "port": 5000,
        "OS": data["numSctpStreams"]["OS"],
        "MIS": data["numSctpStreams"]["MIS"],
        "maxMessageSize": data["maxSctpMessageSize"],
    }))
}

fn announced(listen_ip: &Value) -> Value {
    if listen_ip["announcedIp"].is_string() {
        listen_ip["announcedIp"].clone()
    } else {
        listen_ip["ip"].clone()
    }
}

type Notifications = Vec<(String, &'static str)>;

impl State {
    fn port(&mut self) -> u16 {
        let port = self.next_port;
        self.next_port = self.next_port.wrapping_add(1);
        port
    }

    fn ice_parameters(&mut self) -> Value {
        self.next_ice_generation += 1;
        json!({
            "usernameFragment": format!("ufrag{}", self.next_ice_generation),
            "password": format!("password{}", self.next_ice_generation),
            "iceLite": true,
        })
    }

    fn add_transport(&mut self, request: &Value, kind: TransportKind, tuple: Value) {
        self.transports.insert(
            id_of(request, "transportId"),
            FakeTransport {
                router_id: id_of(request, "routerId"),
                kind,
                tuple,
            },
        );
    }

    fn handle(
        &mut self,
        pid: u32,
        method: &str,
        request: &Value,
        notifications: &mut Notifications,
    ) -> Result<Value, String> {
        let data = &request["data"];

        match method {
            "worker.dump" => Ok(json!({
                "pid": pid,
                "routerIds": self.routers.iter().collect::<Vec<_>>(),
            })),
            "worker.createRouter" => {
                self.routers.insert(id_of(request, "routerId"));
                Ok(Value::Null)
            }
            "router.close" => {
                let router_id = id_of(request, "routerId");
                self.routers.remove(&router_id);
                let transport_ids = self
                    .transports
                    .iter()
                    .filter(|(_, transport)| transport.router_id == router_id)
                    .map(|(transport_id, _)| transport_id.clone())
                    .collect::<Vec<_>>();
                for transport_id in transport_ids {
                    self.close_transport(&transport_id, notifications);
                }
                self.rtp_observers.retain(|_, id| *id != router_id);
                Ok(Value::Null)
            }
            "router.dump" => {
                let router_id = id_of(request, "routerId");
                let transport_ids = self
                    .transports
                    .iter()
                    .filter(|(_, transport)| transport.router_id == router_id)
                    .map(|(transport_id, _)| transport_id.clone())
                    .collect::<Vec<_>>();
                let rtp_observer_ids = self
                    .rtp_observers
                    .iter()
                    .filter(|(_, id)| **id == router_id)
                    .map(|(rtp_observer_id, _)| rtp_observer_id.clone())
                    .collect::<Vec<_>>();
                Ok(json!({
                    "id": router_id,
                    "transportIds": transport_ids,
                    "rtpObserverIds": rtp_observer_ids,
                }))
            }
            "router.createWebRtcTransport" => {
                let mut ice_candidates = Vec::new();
                let mut priority = 1_000_u32;
                for listen_ip in data["listenIps"].as_array().cloned().unwrap_or_default() {
                    if data["enableUdp"].as_bool() == Some(true) {
                        let port = self.port();
                        ice_candidates.push(json!({
                            "foundation": format!("udpcandidate{}", port),
                            "priority": priority,
                            "ip": announced(&listen_ip),
                            "protocol": "udp",
                            "port": port,
                            "type": "host",
                        }));
                        priority -= 1;
                    }
                    if data["enableTcp"].as_bool() == Some(true) {
                        let port = self.port();
                        ice_candidates.push(json!({
                            "foundation": format!("tcpcandidate{}", port),
                            "priority": priority,
                            "ip": announced(&listen_ip),
                            "protocol": "tcp",
                            "port": port,
                            "type": "host",
                            "tcpType": "passive",
                        }));
                        priority -= 1;
                    }
                }

                let sctp_parameters = sctp_parameters(data);
                let mut response = json!({
                    "iceRole": "controlled",
                    "iceParameters": self.ice_parameters(),
                    "iceCandidates": ice_candidates,
                    "iceState": "new",
                    "dtlsParameters": {
                        "role": "auto",
                        "fingerprints": [fingerprint()],
                    },
                    "dtlsState": "new",
                });
                if let Some(sctp_parameters) = sctp_parameters {
                    response["sctpParameters"] = sctp_parameters;
                    response["sctpState"] = json!("new");
                }

                self.add_transport(request, TransportKind::WebRtc, Value::Null);
                Ok(response)
            }
            "router.createPlainRtpTransport" => {
                let tuple = json!({
                    "localIp": announced(&data["listenIp"]),
                    "localPort": self.port(),
                    "protocol": "udp",
                });
                let mut response = json!({ "tuple": tuple });
                if data["rtcpMux"].as_bool() != Some(true) {
                    response["rtcpTuple"] = json!({
                        "localIp": announced(&data["listenIp"]),
                        "localPort": self.port(),
                        "protocol": "udp",
                    });
                }
                if let Some(sctp_parameters) = sctp_parameters(data) {
                    response["sctpParameters"] = sctp_parameters;
                    response["sctpState"] = json!("new");
                }

                self.add_transport(request, TransportKind::Plain, tuple);
                Ok(response)
            }
            "router.createPipeTransport" => {
                let tuple = json!({
                    "localIp": announced(&data["listenIp"]),
                    "localPort": self.port(),
                    "protocol": "udp",
                });
                let mut response = json!({ "tuple": tuple });
                if let Some(sctp_parameters) = sctp_parameters(data) {
                    response["sctpParameters"] = sctp_parameters;
                    response["sctpState"] = json!("new");
                }

                self.add_transport(request, TransportKind::Pipe, tuple);
                Ok(response)
            }
            "router.createAudioLevelObserver" => {
                self.rtp_observers.insert(
                    id_of(request, "rtpObserverId"),
                    id_of(request, "routerId"),
                );
                Ok(Value::Null)
            }
            "transport.close" => {
                self.close_transport(&id_of(request, "transportId"), notifications);
                Ok(Value::Null)
            }
            "transport.connect" => {
                let transport = self
                    .transports
                    .get_mut(&id_of(request, "transportId"))
                    .ok_or_else(|| "transport not found".to_string())?;

                match transport.kind {
                    TransportKind::WebRtc => {
                        let dtls_local_role = match data["dtlsParameters"]["role"].as_str() {
                            Some("client") => "server",
                            _ => "client",
                        };
                        Ok(json!({ "dtlsLocalRole": dtls_local_role }))
                    }
                    TransportKind::Plain => {
                        let mut tuple = transport.tuple.clone();
                        tuple["remoteIp"] = data["ip"].clone();
                        tuple["remotePort"] = data["port"].clone();
                        transport.tuple = tuple.clone();
                        let mut response = json!({ "tuple": tuple });
                        if data["rtcpPort"].is_u64() {
                            response["rtcpTuple"] = json!({
                                "localIp": tuple["localIp"],
                                "localPort": tuple["localPort"].as_u64().unwrap_or_default() + 1,
                                "remoteIp": data["ip"],
                                "remotePort": data["rtcpPort"],
                                "protocol": "udp",
                            });
                        }
                        Ok(response)
                    }
                    TransportKind::Pipe => {
                        let mut tuple = transport.tuple.clone();
                        tuple["remoteIp"] = data["ip"].clone();
                        tuple["remotePort"] = data["port"].clone();
                        transport.tuple = tuple.clone();
                        Ok(json!({ "tuple": tuple }))
                    }
                }
            }
            "transport.restartIce" => Ok(json!({ "iceParameters": self.ice_parameters() })),
            "transport.produce" => {
                let encodings = data["rtpParameters"]["encodings"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                let r#type = if encodings.len() > 1 {
                    "simulcast"
                } else if encodings
                    .first()
                    .and_then(|encoding| encoding["scalabilityMode"].as_str())
                    .map_or(false, |mode| mode.starts_with('L'))
                {
                    "svc"
                } else {
                    "simple"
                };

                self.producers.insert(
                    scoped_id_of(request, "producerId"),
                    FakeProducer {
                        transport_id: id_of(request, "transportId"),
                        paused: data["paused"].as_bool().unwrap_or_default(),
                        consumers: HashSet::new(),
                    },
                );
                Ok(json!({ "type": r#type }))
            }
            "transport.consume" => {
                let producer_id = scoped_id_of(request, "producerId");
                let consumer_id = id_of(request, "consumerId");
                let producer = self
                    .producers
                    .get_mut(&producer_id)
                    .ok_or_else(|| "producer not found".to_string())?;
                producer.consumers.insert(consumer_id.clone());
                let producer_paused = producer.paused;

                self.consumers.insert(
                    consumer_id,
                    FakeEntity {
                        transport_id: id_of(request, "transportId"),
                        parent_id: producer_id,
                    },
                );

                let mut response = json!({
                    "paused": data["paused"].as_bool().unwrap_or_default(),
                    "producerPaused": producer_paused,
                    "score": { "score": 10, "producerScore": 0, "producerScores": [] },
                });
                if data["preferredLayers"].is_object() {
                    response["preferredLayers"] = data["preferredLayers"].clone();
                }
                Ok(response)
            }
            "transport.produceData" => {
                self.data_producers.insert(
                    scoped_id_of(request, "dataProducerId"),
                    FakeDataProducer {
                        transport_id: id_of(request, "transportId"),
                        data_consumers: HashSet::new(),
                    },
                );
                Ok(json!({
                    "type": data["type"],
                    "sctpStreamParameters": data["sctpStreamParameters"],
                    "label": data["label"],
                    "protocol": data["protocol"],
                }))
            }
            "transport.consumeData" => {
                let data_producer_id = scoped_id_of(request, "dataProducerId");
                let data_consumer_id = id_of(request, "dataConsumerId");
                let data_producer = self
                    .data_producers
                    .get_mut(&data_producer_id)
                    .ok_or_else(|| "data producer not found".to_string())?;
                data_producer.data_consumers.insert(data_consumer_id.clone());

                self.data_consumers.insert(
                    data_consumer_id,
                    FakeEntity {
                        transport_id: id_of(request, "transportId"),
                        parent_id: data_producer_id,
                    },
                );
                Ok(json!({
                    "sctpStreamParameters": data["sctpStreamParameters"],
                    "label": data["label"],
                    "protocol": data["protocol"],
                }))
            }
            "producer.close" => {
                self.close_producer(&scoped_id_of(request, "producerId"), None, notifications);
                Ok(Value::Null)
            }
            "producer.pause" | "producer.resume" => {
                let paused = method == "producer.pause";
                if let Some(producer) = self.producers.get_mut(&scoped_id_of(request, "producerId")) {
                    if producer.paused != paused {
                        producer.paused = paused;
                        let event = if paused { "producerpause" } else { "producerresume" };
                        for consumer_id in &producer.consumers {
                            notifications.push((consumer_id.clone(), event));
                        }
                    }
                }
                Ok(Value::Null)
            }
            "consumer.close" => {
                let consumer_id = id_of(request, "consumerId");
                if let Some(consumer) = self.consumers.remove(&consumer_id) {
                    if let Some(producer) = self.producers.get_mut(&consumer.parent_id) {
                        producer.consumers.remove(&consumer_id);
                    }
                }
                Ok(Value::Null)
            }
            "consumer.setPreferredLayers" => Ok(data.clone()),
            "consumer.setPriority" => Ok(json!({ "priority": data["priority"] })),
            "dataProducer.close" => {
                self.close_data_producer(
                    &scoped_id_of(request, "dataProducerId"),
                    None,
                    notifications,
                );
                Ok(Value::Null)
            }
            "dataConsumer.close" => {
                let data_consumer_id = id_of(request, "dataConsumerId");
                if let Some(data_consumer) = self.data_consumers.remove(&data_consumer_id) {
                    if let Some(data_producer) =
                        self.data_producers.get_mut(&data_consumer.parent_id)
                    {
                        data_producer.data_consumers.remove(&data_consumer_id);
                    }
                }
                Ok(Value::Null)
            }
            "rtpObserver.close" => {
                self.rtp_observers.remove(&id_of(request, "rtpObserverId"));
                Ok(Value::Null)
            }
            "transport.dump" => Ok(json!({ "id": id_of(request, "transportId") })),
            "producer.dump" => Ok(json!({ "id": id_of(request, "producerId") })),
            "consumer.dump" => Ok(json!({ "id": id_of(request, "consumerId") })),
            "dataProducer.dump" => Ok(json!({ "id": id_of(request, "dataProducerId") })),
            "dataConsumer.dump" => Ok(json!({ "id": id_of(request, "dataConsumerId") })),
            method if method.ends_with(".getStats") => Ok(json!([])),
            _ => Ok(Value::Null),
        }
    }

    fn close_transport(&mut self, transport_id: &str, notifications: &mut Notifications) {
        if self.transports.remove(transport_id).is_none() {
            return;
        }

        let producer_ids = self
            .producers
            .iter()
            .filter(|(_, producer)| producer.transport_id == transport_id)
            .map(|(producer_id, _)| producer_id.clone())
            .collect::<Vec<_>>();
        for producer_id in producer_ids {
            self.close_producer(&producer_id, Some(transport_id), notifications);
        }

        let data_producer_ids = self
            .data_producers
            .iter()
            .filter(|(_, data_producer)| data_producer.transport_id == transport_id)
            .map(|(data_producer_id, _)| data_producer_id.clone())
            .collect::<Vec<_>>();
        for data_producer_id in data_producer_ids {
            self.close_data_producer(&data_producer_id, Some(transport_id), notifications);
        }

        self.consumers
            .retain(|_, consumer| consumer.transport_id != transport_id);
        self.data_consumers
            .retain(|_, data_consumer| data_consumer.transport_id != transport_id);
    }

    /// Consumers on `closing_transport_id` are closed together with it and not notified.
    fn close_producer(
        &mut self,
        producer_id: &str,
        closing_transport_id: Option<&str>,
        notifications: &mut Notifications,
    ) {
        if let Some(producer) = self.producers.remove(producer_id) {
            for consumer_id in producer.consumers {
                if let Some(consumer) = self.consumers.remove(&consumer_id) {
                    if Some(consumer.transport_id.as_str()) != closing_transport_id {
                        notifications.push((consumer_id, "producerclose"));
                    }
                }
            }
        }
    }

    fn close_data_producer(
        &mut self,
        data_producer_id: &str,
        closing_transport_id: Option<&str>,
        notifications: &mut Notifications,
    ) {
        if let Some(data_producer) = self.data_producers.remove(data_producer_id) {
            for data_consumer_id in data_producer.data_consumers {
                if let Some(data_consumer) = self.data_consumers.remove(&data_consumer_id) {
                    if Some(data_consumer.transport_id.as_str()) != closing_transport_id {
                        notifications.push((data_consumer_id, "dataproducerclose"));
                    }
                }
            }
        }
    }
}
