// src/session.rs
//! Secure MQTT session: TLS credentials, connection lifecycle and events
//!
//! The rumqttc event loop runs in its own task. It keeps [`SessionState`]
//! current and reports what happens on the network as [`SessionEvent`]s, so
//! the acquisition loop never waits on the broker.

use crate::{
    config::BrokerConfig,
    error::{Result, TrackerError},
};
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};
use std::{
    future::Future,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        Notify,
    },
    task::JoinHandle,
    time::{sleep, timeout},
};

/// Requests buffered between the client handle and the event loop
const REQUEST_CAPACITY: usize = 10;

/// How long shutdown waits for the DISCONNECT to go out
const DISCONNECT_GRACE: Duration = Duration::from_secs(3);

/// Sink for serialized records
pub trait Publisher: Send {
    /// Hand a payload to the network layer without waiting for delivery
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Disconnect and stop background processing
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection notifications from the network task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connecting { endpoint: String },
    Connected,
    ConnectRefused(String),
    Published { pkid: u16 },
    Dropped { reason: String },
    Disconnected,
}

impl SessionEvent {
    pub fn log(&self) {
        match self {
            SessionEvent::Connecting { endpoint } => info!("Attempting to connect to {}...", endpoint),
            SessionEvent::Connected => info!("Connected to broker"),
            SessionEvent::ConnectRefused(code) => error!("Failed to connect to broker, return code {}", code),
            SessionEvent::Published { pkid } => debug!("Message {} successfully published", pkid),
            SessionEvent::Dropped { reason } => warn!("Disconnected unexpectedly: {}; reconnecting", reason),
            SessionEvent::Disconnected => info!("Disconnected from broker"),
        }
    }
}

/// Log session events until every sender is gone
pub async fn log_events(mut events: UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        event.log();
    }
}

/// Fail if any credential file is missing. Every missing file is logged.
pub fn check_credentials(config: &BrokerConfig) -> Result<()> {
    let missing: Vec<&Path> = config
        .credential_paths()
        .into_iter()
        .filter(|path| !path.is_file())
        .collect();

    for path in &missing {
        error!("Error: {} not found!", path.display());
    }

    match missing.first() {
        Some(path) => Err(TrackerError::MissingCredential(path.to_path_buf())),
        None => Ok(()),
    }
}

/// PEM material for a mutually authenticated TLS session
pub struct TlsMaterial {
    pub ca: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl TlsMaterial {
    pub fn load(config: &BrokerConfig) -> Result<Self> {
        check_credentials(config)?;

        Ok(Self {
            ca: std::fs::read(&config.ca_cert)?,
            client_cert: std::fs::read(&config.client_cert)?,
            client_key: std::fs::read(&config.private_key)?,
        })
    }

    fn into_transport(self) -> Transport {
        Transport::tls_with_config(TlsConfiguration::Simple {
            ca: self.ca,
            alpn: None,
            client_auth: Some((self.client_cert, self.client_key)),
        })
    }
}

fn mqtt_options(config: &BrokerConfig, tls: TlsMaterial) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.endpoint, config.port);
    options
        .set_keep_alive(config.keep_alive())
        .set_clean_session(true)
        .set_transport(tls.into_transport());
    options
}

/// Validate credentials and open the session.
///
/// Returns as soon as the network task is running; the connection outcome is
/// reported on `events`. Must be called from within a tokio runtime.
pub fn start(config: &BrokerConfig, events: UnboundedSender<SessionEvent>) -> Result<MqttSession> {
    let tls = TlsMaterial::load(config)?;
    let _ = events.send(SessionEvent::Connecting {
        endpoint: format!("{}:{}", config.endpoint, config.port),
    });

    Ok(MqttSession::spawn(
        mqtt_options(config, tls),
        config.reconnect_delay(),
        events,
    ))
}

/// Handle to a running MQTT session
pub struct MqttSession {
    client: AsyncClient,
    state: Arc<RwLock<SessionState>>,
    stopping: Arc<AtomicBool>,
    stop: Arc<Notify>,
    event_loop: Option<JoinHandle<()>>,
}

impl MqttSession {
    fn spawn(options: MqttOptions, reconnect_delay: Duration, events: UnboundedSender<SessionEvent>) -> Self {
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let state = Arc::new(RwLock::new(SessionState::Connecting));
        let stopping = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());

        let network = NetworkTask {
            state: Arc::clone(&state),
            stopping: Arc::clone(&stopping),
            stop: Arc::clone(&stop),
            events,
            reconnect_delay,
        };
        let handle = tokio::spawn(network.run(event_loop));

        Self {
            client,
            state,
            stopping,
            stop,
            event_loop: Some(handle),
        }
    }

    pub fn state(&self) -> SessionState {
        read_state(&self.state)
    }
}

impl Publisher for MqttSession {
    /// QoS 0 enqueue. Nothing is buffered while the session is down.
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(TrackerError::Connection(format!(
                "session is {:?}, message dropped",
                state
            )));
        }

        self.client.try_publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.event_loop.take() else {
            return Ok(());
        };

        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_one();
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not queued: {}", e);
        }

        let abort = handle.abort_handle();
        if timeout(DISCONNECT_GRACE, handle).await.is_err() {
            warn!("Network loop did not stop within {:?}, aborting it", DISCONNECT_GRACE);
            abort.abort();
        }

        write_state(&self.state, SessionState::Disconnected);
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
    }
}

struct NetworkTask {
    state: Arc<RwLock<SessionState>>,
    stopping: Arc<AtomicBool>,
    stop: Arc<Notify>,
    events: UnboundedSender<SessionEvent>,
    reconnect_delay: Duration,
}

impl NetworkTask {
    async fn run(self, mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.transition(SessionState::Connected, SessionEvent::Connected);
                    } else {
                        self.transition(
                            SessionState::Connecting,
                            SessionEvent::ConnectRefused(format!("{:?}", ack.code)),
                        );
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    self.emit(SessionEvent::Published { pkid });
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.transition(SessionState::Disconnected, SessionEvent::Disconnected);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if self.finish_if_stopping() {
                        break;
                    }

                    let event = match e {
                        ConnectionError::ConnectionRefused(code) => {
                            SessionEvent::ConnectRefused(format!("{:?}", code))
                        }
                        other => SessionEvent::Dropped {
                            reason: other.to_string(),
                        },
                    };
                    self.transition(SessionState::Connecting, event);

                    tokio::select! {
                        _ = sleep(self.reconnect_delay) => {}
                        _ = self.stop.notified() => {}
                    }
                    if self.finish_if_stopping() {
                        break;
                    }
                    // the next poll reconnects
                }
            }
        }
    }

    /// Report the final disconnect if shutdown has been requested
    fn finish_if_stopping(&self) -> bool {
        let stopping = self.stopping.load(Ordering::SeqCst);
        if stopping {
            self.transition(SessionState::Disconnected, SessionEvent::Disconnected);
        }
        stopping
    }

    fn transition(&self, state: SessionState, event: SessionEvent) {
        write_state(&self.state, state);
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn read_state(state: &RwLock<SessionState>) -> SessionState {
    match state.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn write_state(state: &RwLock<SessionState>, next: SessionState) {
    match state.write() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}
