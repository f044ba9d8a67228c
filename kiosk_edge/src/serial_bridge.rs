//! The serial bridge owns the link to the pulse decoder.
//!
//! [`SerialBridge::run`] keeps the link open for as long as it is not cancelled. Every line read from the decoder is
//! classified; cash lines and cancel presses become [`AcceptorEvent`]s on the dispatcher channel, everything else is
//! logged. Lines longer than [`MAX_LINE_LEN`] are discarded as malformed. A link that fails
//! to open, reaches EOF or errors is closed and reopened after `reconnect_delay`, forever. Insertions made while the link
//! is down are lost.
//!
//! Other tasks talk to the decoder through a cloneable [`BridgeHandle`]. Commands are fire-and-forget and fail fast
//! when the link is down.
use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use kiosk_common::Money;
use log::*;
use tokio::{
    io::{split, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{broadcast, mpsc, watch, Mutex},
    time::{sleep, Instant},
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AcceptorPort, EdgeConfig},
    decoder::{classify_line, CashKind, DecoderCommand, DecoderLine, StatusLine, VirtualAcceptor, MAX_COMMAND_LEN},
    errors::BridgeError,
};

const COMMAND_QUEUE_SIZE: usize = 32;
const STATUS_CHANNEL_SIZE: usize = 16;
/// No decoder line comes close to this. Longer lines are line noise.
pub const MAX_LINE_LEN: usize = 256;

/// One physical insertion, as reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashEvent {
    pub kind: CashKind,
    pub amount: Money,
    pub observed_at: DateTime<Utc>,
    /// Sent with every attempt to forward this event, so the cloud can recognise a replay.
    pub event_id: String,
}

impl CashEvent {
    pub fn new(kind: CashKind, amount: Money) -> Self {
        let observed_at = Utc::now();
        let event_id = format!("CE-{}-{:08x}", observed_at.format("%Y%m%d%H%M%S%3f"), rand::random::<u32>());
        Self { kind, amount, observed_at, event_id }
    }
}

/// Everything the bridge forwards to the dispatcher, in the order the decoder reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorEvent {
    Cash(CashEvent),
    /// The customer pressed cancel on the kiosk.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialLink for T {}

pub type BoxedLink = Box<dyn SerialLink>;

/// Opens a fresh link to a decoder.
pub trait LinkOpener: Send + Sync {
    fn describe(&self) -> String;

    fn open(&self) -> impl Future<Output = Result<BoxedLink, BridgeError>> + Send;
}

/// A decoder on a real serial port.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    pub path: String,
    pub baud_rate: u32,
}

impl LinkOpener for SerialPortOpener {
    fn describe(&self) -> String {
        format!("{} at {} baud", self.path, self.baud_rate)
    }

    async fn open(&self) -> Result<BoxedLink, BridgeError> {
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(|e| BridgeError::OpenFailed { port: self.path.clone(), reason: e.to_string() })?;
        Ok(Box::new(port))
    }
}

impl LinkOpener for VirtualAcceptor {
    fn describe(&self) -> String {
        "the virtual acceptor".to_string()
    }

    async fn open(&self) -> Result<BoxedLink, BridgeError> {
        Ok(Box::new(self.connect()))
    }
}

/// The link selected by `KIOSK_SERIAL_PORT`.
#[derive(Clone)]
pub enum AcceptorLink {
    Serial(SerialPortOpener),
    Virtual(VirtualAcceptor),
}

impl AcceptorLink {
    pub fn from_config(config: &EdgeConfig, acceptor: &VirtualAcceptor) -> Self {
        match &config.serial_port {
            AcceptorPort::Device(path) => {
                Self::Serial(SerialPortOpener { path: path.clone(), baud_rate: config.baud_rate })
            },
            AcceptorPort::Virtual => Self::Virtual(acceptor.clone()),
        }
    }
}

impl LinkOpener for AcceptorLink {
    fn describe(&self) -> String {
        match self {
            Self::Serial(opener) => opener.describe(),
            Self::Virtual(acceptor) => acceptor.describe(),
        }
    }

    async fn open(&self) -> Result<BoxedLink, BridgeError> {
        match self {
            Self::Serial(opener) => opener.open().await,
            Self::Virtual(acceptor) => acceptor.open().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub reconnect_delay: Duration,
    pub settle: Duration,
    pub silence_timeout: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            settle: config.serial_settle,
            silence_timeout: config.silence_timeout,
        }
    }
}

pub struct SerialBridge<O> {
    opener: O,
    settings: BridgeSettings,
    events: mpsc::Sender<AcceptorEvent>,
    commands: Mutex<mpsc::Receiver<String>>,
    state: watch::Sender<LinkState>,
    status: broadcast::Sender<StatusLine>,
}

#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<String>,
    state: watch::Receiver<LinkState>,
    status: broadcast::Sender<StatusLine>,
}

impl<O: LinkOpener> SerialBridge<O> {
    pub fn new(opener: O, settings: BridgeSettings, events: mpsc::Sender<AcceptorEvent>) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_SIZE);
        let handle = BridgeHandle { commands: command_tx, state: state_rx, status: status_tx.clone() };
        let bridge = Self {
            opener,
            settings,
            events,
            commands: Mutex::new(command_rx),
            state: state_tx,
            status: status_tx,
        };
        (bridge, handle)
    }

    /// Keeps the link open until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut commands = self.commands.lock().await;
        let target = self.opener.describe();
        let mut attempt = 0u64;
        while !token.is_cancelled() {
            attempt += 1;
            info!("🔌️ Opening {target} (attempt {attempt})");
            match self.opener.open().await {
                Ok(link) => {
                    info!("🔌️ Opened {target}");
                    attempt = 0;
                    match self.run_connection(link, &mut commands, &token).await {
                        Ok(()) => info!("🔌️ Closed {target}"),
                        Err(e) => warn!("🔌️ Lost {target}. {e}"),
                    }
                    self.state.send_replace(LinkState::Disconnected);
                    let mut dropped = 0;
                    while commands.try_recv().is_ok() {
                        dropped += 1;
                    }
                    if dropped > 0 {
                        warn!("🔌️ {dropped} commands for the acceptor were dropped with the link");
                    }
                },
                Err(e) => warn!("🔌️ {e}"),
            }
            if token.is_cancelled() {
                break;
            }
            debug!("🔌️ Reconnecting in {}s", self.settings.reconnect_delay.as_secs_f32());
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.settings.reconnect_delay) => {},
            }
        }
        self.state.send_replace(LinkState::Disconnected);
        info!("🔌️ Serial bridge stopped");
    }

    async fn run_connection(
        &self,
        link: BoxedLink,
        commands: &mut mpsc::Receiver<String>,
        token: &CancellationToken,
    ) -> Result<(), BridgeError> {
        let (reader, mut writer) = split(link);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(64);
        let mut overlong = false;
        let settle = sleep(self.settings.settle);
        tokio::pin!(settle);
        let mut settled = false;
        let silence = sleep(self.settings.silence_timeout);
        tokio::pin!(silence);
        let mut silent = false;
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = &mut settle, if !settled => {
                    settled = true;
                    self.state.send_replace(LinkState::Connected);
                    write_line(&mut writer, &DecoderCommand::Ping.to_string()).await?;
                },
                read = read_line_capped(&mut reader, &mut buf) => {
                    match read? {
                        LineRead::Closed => return Err(BridgeError::LinkClosed),
                        LineRead::Partial => overlong = true,
                        LineRead::Line if overlong => {
                            overlong = false;
                            warn!("🔌️ Ignoring malformed line: longer than {MAX_LINE_LEN} bytes");
                        },
                        LineRead::Line => {
                            let line = String::from_utf8_lossy(&buf).into_owned();
                            self.handle_line(&line).await;
                        },
                    }
                    buf.clear();
                    silence.as_mut().reset(Instant::now() + self.settings.silence_timeout);
                    silent = false;
                },
                Some(command) = commands.recv(), if settled => {
                    trace!("🔌️ -> {command}");
                    write_line(&mut writer, &command).await?;
                },
                _ = &mut silence, if !silent => {
                    silent = true;
                    warn!(
                        "🔌️ Nothing heard from the acceptor for {}s. Is it powered and wired up?",
                        self.settings.silence_timeout.as_secs()
                    );
                    if settled {
                        write_line(&mut writer, &DecoderCommand::Ping.to_string()).await?;
                    }
                },
            }
        }
    }

    async fn handle_line(&self, raw: &str) {
        match classify_line(raw) {
            DecoderLine::Empty => {},
            DecoderLine::Comment(text) => debug!("🔌️ # {text}"),
            DecoderLine::Status(status) => {
                info!("🔌️ Acceptor: {status}");
                // Nobody listening is fine
                let _ = self.status.send(status);
            },
            DecoderLine::Cash { kind, amount } => {
                let event = CashEvent::new(kind, amount);
                info!("💵️ {kind} of {amount} inserted ({})", event.event_id);
                if self.events.send(AcceptorEvent::Cash(event)).await.is_err() {
                    error!("💵️ The cash dispatcher has stopped. {amount} in {kind}s was not forwarded.");
                }
            },
            DecoderLine::Cancel => {
                info!("🛑️ Cancel pressed on the kiosk");
                if self.events.send(AcceptorEvent::Cancel).await.is_err() {
                    error!("🛑️ The cash dispatcher has stopped. The cancel press was not forwarded.");
                }
            },
            DecoderLine::Malformed { line, reason } => warn!("🔌️ Ignoring malformed line '{line}': {reason}"),
            DecoderLine::Unknown(line) => warn!("🔌️ Ignoring unrecognised line '{line}'"),
        }
    }
}

enum LineRead {
    Line,
    /// [`MAX_LINE_LEN`] bytes arrived without a newline.
    Partial,
    Closed,
}

/// Reads up to the next `\n` into `buf`, but never lets `buf` grow past [`MAX_LINE_LEN`].
async fn read_line_capped<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
    let room = MAX_LINE_LEN.saturating_sub(buf.len()) as u64;
    let read = (&mut *reader).take(room).read_until(b'\n', buf).await?;
    if buf.last() == Some(&b'\n') {
        Ok(LineRead::Line)
    } else if buf.len() >= MAX_LINE_LEN {
        Ok(LineRead::Partial)
    } else if read == 0 {
        Ok(LineRead::Closed)
    } else {
        // EOF mid-line. The next read reports the close.
        Ok(LineRead::Line)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), BridgeError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

impl BridgeHandle {
    /// Queues `command` for the decoder. Fails immediately if the link is down or the queue is full.
    pub fn send_command(&self, command: &DecoderCommand) -> Result<(), BridgeError> {
        let text = command.to_string();
        if text.len() > MAX_COMMAND_LEN {
            return Err(BridgeError::CommandTooLong(text.len()));
        }
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.commands.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::Busy,
            mpsc::error::TrySendError::Closed(_) => BridgeError::NotConnected,
        })
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Resolves once the link is up and settled.
    pub async fn wait_connected(&self) -> Result<(), BridgeError> {
        let mut state = self.state.clone();
        state.wait_for(|s| *s == LinkState::Connected).await.map(|_| ()).map_err(|_| BridgeError::LinkClosed)
    }

    /// Status lines (`READY`, `PONG`, `STATS:`) received after this call.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusLine> {
        self.status.subscribe()
    }
}
