//! A software pulse decoder.
//!
//! Acceptors signal an insertion as a burst of pulses, one pulse per unit of value. The decoder counts pulses per
//! channel and, once a channel has been quiet for [`PulseDecoderConfig::quiet_interval`], reports the burst as a single
//! `BILL:`/`COIN:` line. This is the same contract the microcontroller firmware implements; running it in-process lets
//! the edge be exercised without hardware.
//!
//! The decoder never reads a clock. Callers pass the current [`Instant`] in, which keeps it deterministic under test.
use std::time::{Duration, Instant};

use kiosk_common::Money;

use super::protocol::{cash_line, CashKind, DecoderCommand, CANCEL_LINE};

#[derive(Debug, Clone)]
pub struct PulseDecoderConfig {
    pub quiet_interval: Duration,
    pub bill_pulse_value: Money,
    pub coin_pulse_value: Money,
    pub heartbeat_interval: Duration,
}

impl Default for PulseDecoderConfig {
    fn default() -> Self {
        Self {
            quiet_interval: Duration::from_millis(300),
            bill_pulse_value: Money::from_units(10),
            coin_pulse_value: Money::from_units(1),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct Channel {
    pulses: u32,
    last_pulse: Option<Instant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderCounters {
    pub bills: u32,
    pub coins: u32,
    pub total: Money,
}

#[derive(Debug)]
pub struct PulseDecoder {
    config: PulseDecoderConfig,
    bill: Channel,
    coin: Channel,
    counters: DecoderCounters,
    started_at: Instant,
    last_heartbeat: Instant,
    receipt: Option<Vec<String>>,
    printed: Vec<Vec<String>>,
}

impl PulseDecoder {
    pub fn new(config: PulseDecoderConfig, now: Instant) -> Self {
        Self {
            config,
            bill: Channel::default(),
            coin: Channel::default(),
            counters: DecoderCounters::default(),
            started_at: now,
            last_heartbeat: now,
            receipt: None,
            printed: Vec::new(),
        }
    }

    /// What the decoder prints when it boots.
    pub fn startup_lines(&self) -> Vec<String> {
        vec![
            "READY".to_string(),
            format!(
                "# pulse decoder ready. bill={}/pulse coin={}/pulse",
                self.config.bill_pulse_value.to_plain_string(),
                self.config.coin_pulse_value.to_plain_string()
            ),
        ]
    }

    pub fn pulse_value(&self, kind: CashKind) -> Money {
        match kind {
            CashKind::Bill => self.config.bill_pulse_value,
            CashKind::Coin => self.config.coin_pulse_value,
        }
    }

    pub fn pulse(&mut self, kind: CashKind, now: Instant) {
        let channel = self.channel_mut(kind);
        channel.pulses += 1;
        channel.last_pulse = Some(now);
    }

    /// The cancel button. Bursts still being counted are reported first, so cash inserted before the press is never
    /// reported after it.
    pub fn cancel_pressed(&mut self) -> Vec<String> {
        let mut lines: Vec<String> =
            [CashKind::Bill, CashKind::Coin].into_iter().filter_map(|kind| self.take_burst(kind)).collect();
        lines.push(CANCEL_LINE.to_string());
        lines
    }

    /// Emits every burst that has gone quiet, then a heartbeat if one is due.
    pub fn poll(&mut self, now: Instant) -> Vec<String> {
        let mut lines = Vec::new();
        for kind in [CashKind::Bill, CashKind::Coin] {
            if let Some(line) = self.flush_channel(kind, now) {
                lines.push(line);
            }
        }
        if now.saturating_duration_since(self.last_heartbeat) >= self.config.heartbeat_interval {
            self.last_heartbeat = now;
            lines.push(format!("# heartbeat uptime={}s", now.saturating_duration_since(self.started_at).as_secs()));
        }
        lines
    }

    pub fn handle_command(&mut self, raw: &str) -> Vec<String> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        let Some(command) = DecoderCommand::parse(raw) else {
            return vec![format!("# unknown command: {}", raw.trim())];
        };
        match command {
            DecoderCommand::Ping => vec!["PONG".to_string()],
            DecoderCommand::Status => vec![format!(
                "STATS:bills={} coins={} total={}",
                self.counters.bills,
                self.counters.coins,
                self.counters.total.to_plain_string()
            )],
            DecoderCommand::Reset => {
                self.counters = DecoderCounters::default();
                vec!["# counters reset".to_string()]
            },
            DecoderCommand::Test { kind, amount } => {
                self.count(kind, amount);
                vec![cash_line(kind, amount)]
            },
            DecoderCommand::PrintStart => {
                self.receipt = Some(Vec::new());
                vec!["# print started".to_string()]
            },
            DecoderCommand::PrintLine(text) => match self.receipt.as_mut() {
                Some(receipt) => {
                    receipt.push(text);
                    Vec::new()
                },
                None => vec!["# PRINT:LINE without PRINT:START ignored".to_string()],
            },
            DecoderCommand::PrintEnd => match self.receipt.take() {
                Some(receipt) => {
                    let n = receipt.len();
                    self.printed.push(receipt);
                    vec![format!("# printed {n} lines")]
                },
                None => vec!["# PRINT:END without PRINT:START ignored".to_string()],
            },
        }
    }

    pub fn counters(&self) -> &DecoderCounters {
        &self.counters
    }

    /// Receipts completed with `PRINT:END` since the last call.
    pub fn take_printed(&mut self) -> Vec<Vec<String>> {
        std::mem::take(&mut self.printed)
    }

    fn flush_channel(&mut self, kind: CashKind, now: Instant) -> Option<String> {
        let quiet = self.config.quiet_interval;
        let last = self.channel_mut(kind).last_pulse?;
        if now.saturating_duration_since(last) < quiet {
            return None;
        }
        self.take_burst(kind)
    }

    fn take_burst(&mut self, kind: CashKind) -> Option<String> {
        let value = self.pulse_value(kind);
        let channel = self.channel_mut(kind);
        if channel.pulses == 0 {
            return None;
        }
        let amount = Money::from_centavos(value.centavos().saturating_mul(i64::from(channel.pulses)));
        *channel = Channel::default();
        self.count(kind, amount);
        Some(cash_line(kind, amount))
    }

    fn count(&mut self, kind: CashKind, amount: Money) {
        match kind {
            CashKind::Bill => self.counters.bills += 1,
            CashKind::Coin => self.counters.coins += 1,
        }
        self.counters.total += amount;
    }

    fn channel_mut(&mut self, kind: CashKind) -> &mut Channel {
        match kind {
            CashKind::Bill => &mut self.bill,
            CashKind::Coin => &mut self.coin,
        }
    }
}
