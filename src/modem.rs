// src/modem.rs
//! Serial request/response exchange with the GNSS modem

use crate::{
    config::SerialConfig,
    error::{Result, TrackerError},
    gps::{cgpsinfo, FixFields},
};
use log::{debug, info};
use std::{io, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{sleep, timeout},
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Query for the current position fix
pub const CGPSINFO_COMMAND: &[u8] = b"AT+CGPSINFO\r";

/// Upper bound on one reply snapshot
const MAX_REPLY_BYTES: usize = 4096;

/// Polls the modem for fixes over an exclusively owned channel
pub struct ModemDriver<S> {
    port: Option<S>,
    settle: Duration,
    read_timeout: Duration,
}

impl ModemDriver<SerialStream> {
    /// Open the modem's AT serial port
    pub fn open(config: &SerialConfig) -> Result<Self> {
        info!("Opening modem on {} at {} baud", config.port, config.baudrate);

        let serial = tokio_serial::new(&config.port, config.baudrate)
            .timeout(config.read_timeout())
            .open_native_async()?;

        Ok(Self::new(serial, config.settle(), config.read_timeout()))
    }
}

impl<S> ModemDriver<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(port: S, settle: Duration, read_timeout: Duration) -> Self {
        Self {
            port: Some(port),
            settle,
            read_timeout,
        }
    }

    /// Run one `AT+CGPSINFO` exchange.
    ///
    /// `Ok(None)` means the modem answered without a usable fix. Channel
    /// failures come back as [`TrackerError::Modem`].
    pub async fn acquire(&mut self) -> Result<Option<FixFields>> {
        let settle = self.settle;
        let read_timeout = self.read_timeout;
        let port = self.port.as_mut().ok_or_else(|| {
            TrackerError::Modem(io::Error::new(io::ErrorKind::NotConnected, "serial channel is closed"))
        })?;

        port.write_all(CGPSINFO_COMMAND).await.map_err(TrackerError::Modem)?;
        port.flush().await.map_err(TrackerError::Modem)?;

        sleep(settle).await;

        let raw = read_snapshot(port, read_timeout).await.map_err(TrackerError::Modem)?;
        debug!("Modem reply: {:?}", String::from_utf8_lossy(&raw));

        Ok(cgpsinfo::parse_reply(&cgpsinfo::split_lines(&raw)))
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Release the channel. Returns false if it was already released.
    pub fn close(&mut self) -> bool {
        match self.port.take() {
            Some(port) => {
                drop(port);
                info!("Serial channel closed");
                true
            }
            None => false,
        }
    }
}

/// Read whatever the modem has buffered, stopping once the line goes quiet
async fn read_snapshot<S>(port: &mut S, quiet: Duration) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    let mut chunk = [0u8; 256];

    while raw.len() < MAX_REPLY_BYTES {
        match timeout(quiet, port.read(&mut chunk)).await {
            Err(_) => break, // quiet for a full read timeout
            Ok(Ok(0)) if raw.is_empty() => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "modem closed the channel"));
            }
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => raw.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
            Ok(Err(e)) => return Err(e),
        }
    }

    raw.truncate(MAX_REPLY_BYTES);
    Ok(raw)
}
