//! Receipt printer back ends.
//!
//! * [`FilePrinter`] appends receipts to a text file. Useful on a bench without hardware.
//! * [`SerialPrinter`] drives a thermal printer on its own serial port with a minimal ESC/POS sequence.
//! * [`BridgePrinter`] sends the receipt through the acceptor's microcontroller using `PRINT:*` commands.
use std::{future::Future, path::PathBuf, time::Duration};

use chrono::Utc;
use log::*;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt},
    time::sleep,
};
use tokio_serial::SerialPortBuilderExt;

use crate::{
    config::{EdgeConfig, PrinterKind},
    decoder::DecoderCommand,
    errors::{EdgeError, PrinterError},
    serial_bridge::BridgeHandle,
};

const ESC_INIT: &[u8] = &[0x1b, b'@'];
const ESC_FEED_4: &[u8] = &[0x1b, b'd', 4];
const GS_CUT: &[u8] = &[0x1d, b'V', 0];

pub trait ReceiptPrinter: Send + Sync {
    fn describe(&self) -> String;

    fn print(&self, lines: &[String]) -> impl Future<Output = Result<(), PrinterError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FilePrinter {
    path: PathBuf,
}

impl FilePrinter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ReceiptPrinter for FilePrinter {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn print(&self, lines: &[String]) -> Result<(), PrinterError> {
        let mut text = format!("----- {} -----\n", Utc::now().to_rfc3339());
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SerialPrinter {
    port: String,
    baud_rate: u32,
}

impl SerialPrinter {
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self { port: port.to_string(), baud_rate }
    }
}

impl ReceiptPrinter for SerialPrinter {
    fn describe(&self) -> String {
        format!("serial printer on {} at {} baud", self.port, self.baud_rate)
    }

    async fn print(&self, lines: &[String]) -> Result<(), PrinterError> {
        let mut port = tokio_serial::new(&self.port, self.baud_rate)
            .open_native_async()
            .map_err(|e| PrinterError::NotConnected(format!("{}: {e}", self.port)))?;
        write_escpos(&mut port, lines).await?;
        Ok(())
    }
}

/// Initialise, print `lines`, feed and cut.
pub async fn write_escpos<W: AsyncWrite + Unpin>(out: &mut W, lines: &[String]) -> std::io::Result<()> {
    out.write_all(ESC_INIT).await?;
    for line in lines {
        let ascii: Vec<u8> = line.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect();
        out.write_all(&ascii).await?;
        out.write_all(b"\n").await?;
    }
    out.write_all(ESC_FEED_4).await?;
    out.write_all(GS_CUT).await?;
    out.flush().await
}

#[derive(Clone)]
pub struct BridgePrinter {
    bridge: BridgeHandle,
    line_delay: Duration,
}

impl BridgePrinter {
    pub fn new(bridge: BridgeHandle, line_delay: Duration) -> Self {
        Self { bridge, line_delay }
    }

    /// The microcontroller prints as it receives, with a 64 byte buffer. Commands are paced so it never overflows.
    fn pause_after(&self, line: &str) -> Duration {
        if line.is_empty() {
            self.line_delay / 3
        } else {
            self.line_delay
        }
    }
}

impl ReceiptPrinter for BridgePrinter {
    fn describe(&self) -> String {
        "printer attached to the acceptor".to_string()
    }

    async fn print(&self, lines: &[String]) -> Result<(), PrinterError> {
        if !self.bridge.is_connected() {
            return Err(PrinterError::NotConnected("the acceptor link is down".into()));
        }
        self.bridge.send_command(&DecoderCommand::PrintStart)?;
        sleep(self.line_delay * 3).await;
        for line in lines {
            self.bridge.send_command(&DecoderCommand::print_line(line))?;
            sleep(self.pause_after(line)).await;
        }
        self.bridge.send_command(&DecoderCommand::PrintEnd)?;
        sleep(self.line_delay * 3).await;
        Ok(())
    }
}

/// The printer selected by `KIOSK_PRINTER`.
#[derive(Clone)]
pub enum Printer {
    File(FilePrinter),
    Serial(SerialPrinter),
    Bridge(BridgePrinter),
}

impl Printer {
    pub fn from_config(config: &EdgeConfig, bridge: Option<&BridgeHandle>) -> Result<Self, EdgeError> {
        match config.printer {
            PrinterKind::File => Ok(Self::File(FilePrinter::new(config.printer_file.clone()))),
            PrinterKind::Serial => Ok(Self::Serial(SerialPrinter::new(&config.printer_port, config.printer_baud))),
            PrinterKind::Bridge => {
                let bridge = bridge.ok_or_else(|| {
                    EdgeError::Configuration(
                        "KIOSK_PRINTER=bridge needs the cash reader. Enable it or choose another printer.".into(),
                    )
                })?;
                Ok(Self::Bridge(BridgePrinter::new(bridge.clone(), config.print_line_delay)))
            },
        }
    }
}

impl ReceiptPrinter for Printer {
    fn describe(&self) -> String {
        match self {
            Self::File(p) => p.describe(),
            Self::Serial(p) => p.describe(),
            Self::Bridge(p) => p.describe(),
        }
    }

    async fn print(&self, lines: &[String]) -> Result<(), PrinterError> {
        trace!("🖨️ Sending {} lines to the {}", lines.len(), self.describe());
        match self {
            Self::File(p) => p.print(lines).await,
            Self::Serial(p) => p.print(lines).await,
            Self::Bridge(p) => p.print(lines).await,
        }
    }
}
