//! MQTT transport
//!
//! Publishes northbound payloads at QoS 1 and hands southbound commands to a
//! [`CommandHandler`]. The rumqttc event loop runs as a background task that
//! keeps reconnecting until [`MessageSender::shutdown`] is called.
//!
//! A send succeeds only once the broker has acknowledged the publish. Sends
//! take turns, so at most one publish is awaiting its PubAck at a time.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use contracts::{CommandHandler, MessageSender, MqttSettings};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{Result, TransportError};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Broker endpoint parsed from the `server` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// Parse `tcp://`, `mqtt://` (plain) or `tls://`, `ssl://`, `mqtts://` URLs
    pub fn parse(server: &str) -> Result<Self> {
        let url =
            Url::parse(server).map_err(|e| TransportError::invalid_endpoint(server, e.to_string()))?;

        let tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "tls" | "ssl" | "mqtts" => true,
            other => {
                return Err(TransportError::invalid_endpoint(
                    server,
                    format!("unsupported scheme '{other}'"),
                ))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::invalid_endpoint(server, "missing host"))?
            .to_string();

        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self { host, port, tls })
    }
}

/// Encoded size of a QoS 1 PUBLISH packet
fn publish_packet_len(topic: &str, payload_len: usize) -> usize {
    // topic length prefix + topic + packet id + payload
    let remaining = 2 + topic.len() + 2 + payload_len;
    let length_bytes = match remaining {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    1 + length_bytes + remaining
}

/// Build client options from settings
fn build_options(settings: &MqttSettings, endpoint: &BrokerEndpoint) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
    options.set_clean_session(true);
    options.set_keep_alive(settings.keep_alive());
    options.set_max_packet_size(settings.max_packet_size, settings.max_packet_size);

    if !settings.user_name.is_empty() {
        options.set_credentials(&settings.user_name, &settings.password);
    }

    if endpoint.tls {
        options.set_transport(tls_transport(settings)?);
    } else if settings.cert_file.is_some() || settings.ca_file.is_some() {
        warn!(server = %settings.server, "TLS files configured for a plain connection, ignoring");
    }

    Ok(options)
}

/// TLS transport: explicit CA (optionally with client certificate) or system roots
fn tls_transport(settings: &MqttSettings) -> Result<Transport> {
    let client_auth = match (&settings.cert_file, &settings.key_file) {
        (Some(cert), Some(key)) => Some((fs::read(cert)?, fs::read(key)?)),
        _ => None,
    };

    match (&settings.ca_file, client_auth) {
        (Some(ca), client_auth) => Ok(Transport::tls_with_config(TlsConfiguration::Simple {
            ca: fs::read(ca)?,
            alpn: None,
            client_auth,
        })),
        (None, None) => Ok(Transport::tls_with_default_config()),
        (None, Some(_)) => Err(TransportError::tls(
            "ca_file is required when a client certificate is configured",
        )),
    }
}

/// The publish awaiting its PubAck
struct PendingAck {
    /// Assigned by rumqttc once the publish is written
    pkid: Option<u16>,
    done: oneshot::Sender<bool>,
}

type AckSlot = Arc<Mutex<Option<PendingAck>>>;

fn settle(slot: &AckSlot, acked: bool) {
    let pending = slot.lock().ok().and_then(|mut pending| pending.take());
    if let Some(pending) = pending {
        let _ = pending.done.send(acked);
    }
}

/// MQTT implementation of [`MessageSender`]
pub struct MqttTransport {
    name: String,
    client: AsyncClient,
    command_topic: String,
    max_packet_size: usize,
    ack_timeout: Duration,
    connected: Arc<AtomicBool>,
    pending: AckSlot,
    publish_turn: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect to the broker and subscribe to the command topic
    ///
    /// Waits for the first broker acknowledgement; failing to get one within
    /// `connect_timeout` is an error, later disconnects are retried forever.
    #[instrument(
        name = "mqtt_transport_connect",
        skip(settings, handler),
        fields(server = %settings.server, client_id = %settings.client_id)
    )]
    pub async fn connect<H>(settings: &MqttSettings, handler: H) -> Result<Self>
    where
        H: CommandHandler + 'static,
    {
        let endpoint = BrokerEndpoint::parse(&settings.server)?;
        let options = build_options(settings, &endpoint)?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let connected = Arc::new(AtomicBool::new(false));
        let pending: AckSlot = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker = EventLoopWorker {
            client: client.clone(),
            command_topic: settings.command_topic.clone(),
            handler,
            connected: Arc::clone(&connected),
            pending: Arc::clone(&pending),
            cancel: cancel.clone(),
            reconnect_interval: settings.reconnect_interval(),
            ready: Some(ready_tx),
        };
        let handle = tokio::spawn(worker.run(eventloop));

        let ready = tokio::time::timeout(settings.connect_timeout(), ready_rx).await;
        let outcome = match ready {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(message),
            Ok(Err(_)) => Err("event loop stopped before connecting".to_string()),
            Err(_) => Err(format!(
                "no acknowledgement within {:?}",
                settings.connect_timeout()
            )),
        };

        if let Err(message) = outcome {
            cancel.cancel();
            let _ = handle.await;
            return Err(TransportError::connection(&settings.server, message));
        }

        info!(
            host = %endpoint.host,
            port = endpoint.port,
            tls = endpoint.tls,
            "MQTT transport connected"
        );

        Ok(Self {
            name: format!("mqtt:{}", endpoint.host),
            client,
            command_topic: settings.command_topic.clone(),
            max_packet_size: settings.max_packet_size,
            ack_timeout: settings.ack_timeout(),
            connected,
            pending,
            publish_turn: tokio::sync::Mutex::new(()),
            cancel,
            event_loop: Mutex::new(Some(handle)),
        })
    }

    /// Whether the last broker exchange left the session up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl MessageSender for MqttTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, topic: &str, payload: Bytes) -> bool {
        let packet_len = publish_packet_len(topic, payload.len());
        if packet_len > self.max_packet_size {
            // rumqttc would drop it inside the event loop and reset the connection
            error!(
                topic = %topic,
                packet_len,
                max_packet_size = self.max_packet_size,
                "mqtt send to {topic} failed (packet too large)"
            );
            return false;
        }

        let _turn = self.publish_turn.lock().await;

        if !self.is_connected() {
            warn!(topic = %topic, "mqtt send to {topic} failed (not connected)");
            return false;
        }

        let (done_tx, done_rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(PendingAck {
                pkid: None,
                done: done_tx,
            });
        }

        if let Err(e) = self
            .client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            settle(&self.pending, false);
            warn!(topic = %topic, error = %e, "mqtt send to {topic} failed ({e})");
            return false;
        }

        match tokio::time::timeout(self.ack_timeout, done_rx).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) | Ok(Err(_)) => {
                warn!(topic = %topic, "mqtt send to {topic} failed (connection lost before acknowledgement)");
                false
            }
            Err(_) => {
                settle(&self.pending, false);
                warn!(
                    topic = %topic,
                    timeout_ms = self.ack_timeout.as_millis() as u64,
                    "mqtt send to {topic} failed (no acknowledgement)"
                );
                false
            }
        }
    }

    #[instrument(name = "mqtt_transport_shutdown", skip(self), fields(transport = %self.name))]
    async fn shutdown(&self) {
        // let an in-flight publish collect its acknowledgement first
        let _turn = self.publish_turn.lock().await;

        if let Err(e) = self.client.unsubscribe(self.command_topic.as_str()).await {
            error!(topic = %self.command_topic, error = %e, "Unsubscribe failed");
        }
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "Disconnect request not delivered");
        }

        // Give the event loop a moment to flush the unsubscribe and disconnect
        let handle = self.event_loop.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                self.cancel.cancel();
                let _ = handle.await;
            }
        }

        self.connected.store(false, Ordering::Release);
        info!("MQTT transport closed");
    }
}

/// Background task driving the rumqttc event loop
struct EventLoopWorker<H> {
    client: AsyncClient,
    command_topic: String,
    handler: H,
    connected: Arc<AtomicBool>,
    pending: AckSlot,
    cancel: CancellationToken,
    reconnect_interval: Duration,
    ready: Option<oneshot::Sender<std::result::Result<(), String>>>,
}

impl<H: CommandHandler> EventLoopWorker<H> {
    async fn run(mut self, mut eventloop: EventLoop) {
        debug!("MQTT event loop started");

        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.command_topic {
                        self.handler.receive(&String::from_utf8_lossy(&publish.payload));
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => self.on_publish_written(pkid),
                Ok(Event::Incoming(Packet::PubAck(ack))) => self.on_puback(ack.pkid),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.connected.store(false, Ordering::Release);
                    debug!("Disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    // clean session: the broker will never acknowledge it now
                    settle(&self.pending, false);
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(Err(e.to_string()));
                        break;
                    }
                    warn!(error = %e, "MQTT connection lost, reconnecting");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_interval) => {}
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        settle(&self.pending, false);
        debug!("MQTT event loop stopped");
    }

    fn on_publish_written(&self, pkid: u16) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(pending) = pending.as_mut().filter(|p| p.pkid.is_none()) {
                pending.pkid = Some(pkid);
            }
        }
    }

    fn on_puback(&self, pkid: u16) {
        let acked = self.pending.lock().ok().and_then(|mut pending| {
            if pending.as_ref().and_then(|p| p.pkid) == Some(pkid) {
                pending.take()
            } else {
                None
            }
        });
        match acked {
            Some(pending) => {
                let _ = pending.done.send(true);
            }
            None => debug!(pkid, "PubAck for a publish no longer awaited"),
        }
    }

    fn on_connected(&mut self) {
        self.connected.store(true, Ordering::Release);

        // clean sessions drop subscriptions, so subscribe on every acknowledgement
        match self
            .client
            .try_subscribe(self.command_topic.as_str(), QoS::AtLeastOnce)
        {
            Ok(()) => debug!(topic = %self.command_topic, "Subscribed to command topic"),
            Err(e) => error!(topic = %self.command_topic, error = %e, "Subscribe failed"),
        }

        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        } else {
            info!("MQTT connection re-established");
        }
    }
}
