// src/tracker.rs
//! Periodic acquire-and-publish loop

use crate::{
    config::TrackerConfig,
    error::{Result, TrackerError},
    gps::FixRecord,
    modem::ModemDriver,
    session::Publisher,
};
use chrono::Utc;
use chrono_tz::Tz;
use log::{error, info, warn};
use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::Mutex,
    time::sleep,
};

/// Per-run settings derived from the configuration
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub device_id: String,
    pub topic: String,
    pub timezone: Tz,
    pub interval: Duration,
    pub max_consecutive_faults: Option<u32>,
}

impl TrackerSettings {
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Ok(Self {
            device_id: config.device_id.clone(),
            topic: config.broker.topic.clone(),
            timezone: config.tz()?,
            interval: config.publish_interval(),
            max_consecutive_faults: config.max_consecutive_faults,
        })
    }
}

/// What one tick did
#[derive(Debug)]
pub enum TickOutcome {
    Published(FixRecord),
    /// Built but not accepted by the network layer
    Dropped(FixRecord),
    NoFix,
    Fault(TrackerError),
}

/// Owns the modem driver and the publisher for the lifetime of a run
pub struct Tracker<S, P> {
    driver: Mutex<ModemDriver<S>>,
    publisher: Mutex<Option<P>>,
    settings: TrackerSettings,
    stopped: AtomicBool,
}

impl<S, P> Tracker<S, P>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: Publisher,
{
    pub fn new(driver: ModemDriver<S>, publisher: P, settings: TrackerSettings) -> Self {
        Self {
            driver: Mutex::new(driver),
            publisher: Mutex::new(Some(publisher)),
            settings,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Acquire once and publish the fix if there is one
    pub async fn tick(&self) -> TickOutcome {
        let acquired = self.driver.lock().await.acquire().await;

        let fields = match acquired {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                warn!("Failed to get GPS data: no fix");
                return TickOutcome::NoFix;
            }
            Err(e) => {
                warn!("Failed to get GPS data: {}", e);
                return TickOutcome::Fault(e);
            }
        };

        let acquired_at = Utc::now().with_timezone(&self.settings.timezone);
        let record = FixRecord::new(fields, &self.settings.device_id, acquired_at);
        let payload = match record.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize record: {}", e);
                return TickOutcome::Fault(e);
            }
        };

        info!("Sending GPS data: {}", String::from_utf8_lossy(&payload));

        let mut publisher = self.publisher.lock().await;
        let sent = match publisher.as_mut() {
            Some(publisher) => publisher.publish(&self.settings.topic, payload),
            None => Err(TrackerError::Connection("session already shut down".to_string())),
        };

        match sent {
            Ok(()) => TickOutcome::Published(record),
            Err(e) => {
                warn!("Publish failed, record dropped: {}", e);
                TickOutcome::Dropped(record)
            }
        }
    }

    /// Tick every interval until `shutdown_signal` resolves or the fault cap
    /// is reached. Resources are released before returning on every path.
    pub async fn run<F>(&self, shutdown_signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown_signal);
        let mut consecutive_faults: u32 = 0;

        let result = loop {
            if self.is_stopped() {
                break Ok(());
            }

            let outcome = tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Exiting...");
                    break Ok(());
                }
                outcome = self.tick() => outcome,
            };

            match outcome {
                TickOutcome::Fault(e) if e.is_modem_fault() => {
                    consecutive_faults += 1;
                    if let Some(max) = self.settings.max_consecutive_faults {
                        if consecutive_faults >= max {
                            error!("Giving up after {} consecutive modem faults", consecutive_faults);
                            break Err(e);
                        }
                    }
                }
                // the modem answered; the record was lost after acquisition
                TickOutcome::Fault(_) => {}
                _ => consecutive_faults = 0,
            }

            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Exiting...");
                    break Ok(());
                }
                _ = sleep(self.settings.interval) => {}
            }
        };

        let cleanup = self.shutdown().await.map(|_| ());
        result.and(cleanup)
    }

    /// Close the serial channel, then the network session.
    ///
    /// Only the first call does the work; it returns `Ok(true)`. Later or
    /// concurrent calls return `Ok(false)`.
    pub async fn shutdown(&self) -> Result<bool> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        info!("Shutting down");
        self.driver.lock().await.close();

        let publisher = self.publisher.lock().await.take();
        if let Some(mut publisher) = publisher {
            publisher.shutdown().await?;
        }

        Ok(true)
    }
}
