//! An acceptor that lives in memory.
//!
//! [`VirtualAcceptor::connect`] starts a [`PulseDecoder`] on one end of an in-memory duplex stream and returns the
//! other end, which behaves exactly like the serial port of a real decoder. Pulses are injected through the
//! [`VirtualAcceptor`] handle, as are presses of the cancel button. The handle stays valid across reconnections: pulses always go to the latest decoder, and
//! the decoder it replaces shuts down and closes its link.
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use kiosk_common::Money;
use log::*;
use tokio::{
    io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream},
    sync::mpsc,
    time::Instant,
};

use super::{
    protocol::CashKind,
    pulse::{PulseDecoder, PulseDecoderConfig},
};
use crate::errors::BridgeError;

const LINK_BUFFER_SIZE: usize = 4096;
const TICK: Duration = Duration::from_millis(50);

/// What the outside world can do to the acceptor.
#[derive(Debug, Clone, Copy)]
enum Input {
    Pulse(CashKind),
    CancelButton,
}

#[derive(Debug, Clone)]
pub struct VirtualAcceptor {
    config: PulseDecoderConfig,
    inputs: Arc<Mutex<Option<mpsc::UnboundedSender<Input>>>>,
    printed: Arc<Mutex<Vec<Vec<String>>>>,
}

impl VirtualAcceptor {
    pub fn new(config: PulseDecoderConfig) -> Self {
        Self { config, inputs: Arc::new(Mutex::new(None)), printed: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Boots a fresh decoder and returns the edge's end of its link. Any previous decoder is abandoned.
    pub fn connect(&self) -> DuplexStream {
        let (edge_end, decoder_end) = tokio::io::duplex(LINK_BUFFER_SIZE);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inputs.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        tokio::spawn(run_decoder(decoder_end, self.config.clone(), rx, Arc::clone(&self.printed)));
        edge_end
    }

    /// True once the edge has opened the link and the decoder behind it is still running.
    pub fn is_connected(&self) -> bool {
        let inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        inputs.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    pub fn pulse(&self, kind: CashKind) -> Result<(), BridgeError> {
        self.send(Input::Pulse(kind))
    }

    /// Presses the cancel button. The decoder answers with `CANCEL`.
    pub fn press_cancel(&self) -> Result<(), BridgeError> {
        self.send(Input::CancelButton)
    }

    fn send(&self, input: Input) -> Result<(), BridgeError> {
        let inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = inputs.as_ref().ok_or(BridgeError::NotConnected)?;
        sender.send(input).map_err(|_| BridgeError::NotConnected)
    }

    /// Feeds the pulses that make up `amount`. Returns the number of pulses sent.
    pub fn insert(&self, kind: CashKind, amount: Money) -> Result<u32, BridgeError> {
        let per_pulse = match kind {
            CashKind::Bill => self.config.bill_pulse_value,
            CashKind::Coin => self.config.coin_pulse_value,
        };
        let pulses = match per_pulse.centavos() {
            0 => None,
            value if amount.is_positive() && amount.centavos() % value == 0 => u32::try_from(amount.centavos() / value).ok(),
            _ => None,
        }
        .ok_or_else(|| BridgeError::InvalidAmount(format!("{amount} in {per_pulse} {kind} pulses")))?;
        for _ in 0..pulses {
            self.pulse(kind)?;
        }
        Ok(pulses)
    }

    /// Every receipt the virtual printer has produced so far.
    pub fn printed_receipts(&self) -> Vec<Vec<String>> {
        self.printed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

async fn run_decoder(
    link: DuplexStream,
    config: PulseDecoderConfig,
    mut inputs: mpsc::UnboundedReceiver<Input>,
    printed: Arc<Mutex<Vec<Vec<String>>>>,
) {
    let (reader, mut writer) = split(link);
    let mut reader = BufReader::new(reader);
    let mut decoder = PulseDecoder::new(config, Instant::now().into_std());
    let mut ticker = tokio::time::interval(TICK);
    let mut buf = Vec::new();
    let mut out = decoder.startup_lines();
    debug!("🎰️ Virtual acceptor booted");
    loop {
        for line in out.drain(..) {
            if let Err(e) = writer.write_all(format!("{line}\n").as_bytes()).await {
                debug!("🎰️ Virtual acceptor link closed. {e}");
                return;
            }
        }
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let command = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    out = decoder.handle_command(&command);
                    let receipts = decoder.take_printed();
                    if !receipts.is_empty() {
                        printed.lock().unwrap_or_else(PoisonError::into_inner).extend(receipts);
                    }
                },
            },
            input = inputs.recv() => match input {
                Some(Input::Pulse(kind)) => decoder.pulse(kind, Instant::now().into_std()),
                Some(Input::CancelButton) => out = decoder.cancel_pressed(),
                // A newer decoder has taken over the handle
                None => break,
            },
            _ = ticker.tick() => out = decoder.poll(Instant::now().into_std()),
        }
    }
    debug!("🎰️ Virtual acceptor shut down");
}
