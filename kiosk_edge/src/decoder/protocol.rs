//! The line protocol spoken by the pulse decoder.
//!
//! The decoder sits between the bill/coin acceptor and the edge computer. It counts the acceptor's pulses and reports
//! each insertion as one `\n`-terminated ASCII line:
//!
//! | Line              | Meaning                                                     |
//! |-------------------|-------------------------------------------------------------|
//! | `BILL:<amount>`   | A banknote was accepted                                     |
//! | `COIN:<amount>`   | A coin was accepted                                         |
//! | `CANCEL`          | The customer pressed the cancel button                      |
//! | `READY`           | The decoder has (re)started                                 |
//! | `PONG`            | Reply to `PING`                                             |
//! | `STATS:<text>`    | Reply to `STATUS`                                           |
//! | `# <text>`        | Comment, heartbeat or diagnostics. Never carries cash.      |
//!
//! Anything else the decoder sends is reported as [`DecoderLine::Unknown`]. Classifying a line never fails.
use std::fmt::{self, Display};

use kiosk_common::{Money, MoneyError};

/// The decoder's serial buffer is 64 bytes. Commands are kept well below that.
pub const MAX_COMMAND_LEN: usize = 50;

const PRINT_LINE_PREFIX: &str = "PRINT:LINE:";

pub const CANCEL_LINE: &str = "CANCEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CashKind {
    Bill,
    Coin,
}

impl CashKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Bill => "BILL",
            Self::Coin => "COIN",
        }
    }
}

impl Display for CashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bill => f.write_str("bill"),
            Self::Coin => f.write_str("coin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Ready,
    Pong,
    Stats(String),
}

impl Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("READY"),
            Self::Pong => f.write_str("PONG"),
            Self::Stats(s) => write!(f, "STATS:{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderLine {
    Empty,
    Comment(String),
    Status(StatusLine),
    Cash { kind: CashKind, amount: Money },
    /// The customer gave up on the order at the kiosk.
    Cancel,
    Malformed { line: String, reason: String },
    Unknown(String),
}

/// Classifies one line received from the decoder. Surrounding whitespace (including the `\r` of `\r\n` endings) is
/// ignored.
pub fn classify_line(raw: &str) -> DecoderLine {
    let line = raw.trim();
    if line.is_empty() {
        return DecoderLine::Empty;
    }
    if let Some(comment) = line.strip_prefix('#') {
        return DecoderLine::Comment(comment.trim().to_string());
    }
    match line {
        "READY" => return DecoderLine::Status(StatusLine::Ready),
        "PONG" => return DecoderLine::Status(StatusLine::Pong),
        CANCEL_LINE => return DecoderLine::Cancel,
        _ => {},
    }
    if let Some(stats) = line.strip_prefix("STATS:") {
        return DecoderLine::Status(StatusLine::Stats(stats.trim().to_string()));
    }
    let cash = line
        .strip_prefix("BILL:")
        .map(|amount| (CashKind::Bill, amount))
        .or_else(|| line.strip_prefix("COIN:").map(|amount| (CashKind::Coin, amount)));
    match cash {
        Some((kind, amount)) => match parse_cash_amount(amount) {
            Ok(amount) => DecoderLine::Cash { kind, amount },
            Err(reason) => DecoderLine::Malformed { line: line.to_string(), reason },
        },
        None => DecoderLine::Unknown(line.to_string()),
    }
}

fn parse_cash_amount(s: &str) -> Result<Money, String> {
    let amount = s.parse::<Money>().map_err(|e| match e {
        MoneyError::Empty => "missing amount".to_string(),
        e => e.to_string(),
    })?;
    if amount.is_zero() {
        return Err("amount is zero".to_string());
    }
    Ok(amount)
}

/// Commands the edge sends to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderCommand {
    Ping,
    Status,
    Reset,
    /// A synthetic insertion. The decoder reports it exactly like a real one.
    Test { kind: CashKind, amount: Money },
    PrintStart,
    PrintLine(String),
    PrintEnd,
}

impl DecoderCommand {
    /// A `PRINT:LINE` command, cut so that the whole command fits in [`MAX_COMMAND_LEN`].
    pub fn print_line(text: &str) -> Self {
        let room = MAX_COMMAND_LEN - PRINT_LINE_PREFIX.len();
        let mut cut = String::with_capacity(room);
        for c in text.chars().filter(|c| *c != '\n' && *c != '\r') {
            if cut.len() + c.len_utf8() > room {
                break;
            }
            cut.push(c);
        }
        Self::PrintLine(cut)
    }

    /// Parses a command as received by a decoder. Used by the in-process decoder.
    pub fn parse(raw: &str) -> Option<Self> {
        let line = raw.trim_end_matches(['\r', '\n']);
        match line.trim() {
            "PING" => return Some(Self::Ping),
            "STATUS" => return Some(Self::Status),
            "RESET" => return Some(Self::Reset),
            "PRINT:START" => return Some(Self::PrintStart),
            "PRINT:END" => return Some(Self::PrintEnd),
            _ => {},
        }
        if let Some(text) = line.strip_prefix(PRINT_LINE_PREFIX) {
            return Some(Self::PrintLine(text.to_string()));
        }
        let test = line.trim().strip_prefix("TEST:")?;
        match classify_line(test) {
            DecoderLine::Cash { kind, amount } => Some(Self::Test { kind, amount }),
            _ => None,
        }
    }
}

impl Display for DecoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("PING"),
            Self::Status => f.write_str("STATUS"),
            Self::Reset => f.write_str("RESET"),
            Self::Test { kind, amount } => write!(f, "TEST:{}:{}", kind.tag(), amount.to_plain_string()),
            Self::PrintStart => f.write_str("PRINT:START"),
            Self::PrintLine(text) => write!(f, "{PRINT_LINE_PREFIX}{text}"),
            Self::PrintEnd => f.write_str("PRINT:END"),
        }
    }
}

/// The line a decoder emits for one insertion, e.g. `BILL:100`.
pub fn cash_line(kind: CashKind, amount: Money) -> String {
    format!("{}:{}", kind.tag(), amount.to_plain_string())
}
