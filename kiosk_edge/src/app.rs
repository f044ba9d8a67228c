//! Wires the edge components together.
use std::{sync::Arc, time::Duration};

use kiosk_common::Money;
use log::*;
use tokio::sync::{broadcast::error::RecvError, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    attribution::CurrentOrder,
    cloud_client::CloudClient,
    config::EdgeConfig,
    decoder::{CashKind, DecoderCommand, PulseDecoderConfig, StatusLine, VirtualAcceptor},
    dispatcher::{AcceptorEvents, DispatchOutcome, Dispatcher, RetryPolicy},
    errors::{BridgeError, EdgeError},
    print_poller::PrintPoller,
    printer::Printer,
    serial_bridge::{AcceptorEvent, AcceptorLink, BridgeHandle, BridgeSettings, CashEvent, SerialBridge},
    session_poller::SessionPoller,
    supervisor::Supervisor,
};

const EVENT_QUEUE_SIZE: usize = 64;

/// State the running edge shares with its caller.
#[derive(Debug, Clone)]
pub struct EdgeHandles {
    /// Used when `KIOSK_SERIAL_PORT=virtual`.
    pub acceptor: VirtualAcceptor,
    pub current: CurrentOrder,
}

impl EdgeHandles {
    pub fn new(decoder: PulseDecoderConfig) -> Self {
        Self { acceptor: VirtualAcceptor::new(decoder), current: CurrentOrder::new() }
    }
}

/// Runs the edge until `token` is cancelled.
pub async fn run_edge(config: EdgeConfig, token: CancellationToken) -> Result<(), EdgeError> {
    run_edge_with(config, EdgeHandles::new(PulseDecoderConfig::default()), token).await
}

pub async fn run_edge_with(config: EdgeConfig, handles: EdgeHandles, token: CancellationToken) -> Result<(), EdgeError> {
    if !config.enable_cash_reader && !config.enable_printer {
        return Err(EdgeError::Configuration("Both the cash reader and the printer are disabled".into()));
    }
    config.log_summary();
    let cloud = Arc::new(CloudClient::from_config(&config)?);
    let mut supervisor = Supervisor::new(token, config.restart_delay);
    let mut bridge_handle = None;

    if config.enable_cash_reader {
        let current = handles.current.clone();
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (bridge, handle) = start_bridge(&config, &handles.acceptor, tx);
        let bridge = Arc::new(bridge);
        supervisor.spawn("serial bridge", move |token| {
            let bridge = Arc::clone(&bridge);
            async move { bridge.run(token).await }
        });

        let poller = Arc::new(SessionPoller::new(Arc::clone(&cloud), current.clone(), config.session_poll_interval));
        supervisor.spawn("session poller", move |token| {
            let poller = Arc::clone(&poller);
            async move { poller.run(token).await }
        });

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&cloud), current, retry_policy(&config)));
        let events: Arc<AcceptorEvents> = Arc::new(Mutex::new(rx));
        supervisor.spawn("cash dispatcher", move |token| {
            let dispatcher = Arc::clone(&dispatcher);
            let events = Arc::clone(&events);
            async move { dispatcher.run(&events, token).await }
        });
        bridge_handle = Some(handle);
    }

    if config.enable_printer {
        let printer = Printer::from_config(&config, bridge_handle.as_ref())?;
        let poller = Arc::new(PrintPoller::new(Arc::clone(&cloud), printer, config.print_poll_interval));
        supervisor.spawn("print poller", move |token| {
            let poller = Arc::clone(&poller);
            async move { poller.run(token).await }
        });
    }

    info!("🚀️ Kiosk edge running with {} tasks", supervisor.task_count());
    supervisor.wait().await;
    info!("🚀️ Kiosk edge stopped");
    Ok(())
}

/// Opens the acceptor link, sends `PING` and waits for `PONG`.
pub async fn probe(config: &EdgeConfig, timeout: Duration) -> Result<(), EdgeError> {
    let (tx, _rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let (bridge, handle) = start_bridge(config, &VirtualAcceptor::new(PulseDecoderConfig::default()), tx);
    let token = CancellationToken::new();
    let task = tokio::spawn({
        let token = token.clone();
        async move { bridge.run(token).await }
    });
    let result = tokio::time::timeout(timeout, ping(&handle))
        .await
        .map_err(|_| EdgeError::Timeout(format!("PONG from the acceptor on {}", config.serial_port)))
        .and_then(|r| r);
    token.cancel();
    let _ = task.await;
    result
}

/// Asks the acceptor for a synthetic insertion and reports it to the cloud like a real one.
pub async fn simulate(
    config: &EdgeConfig,
    kind: CashKind,
    amount: Money,
    timeout: Duration,
) -> Result<DispatchOutcome, EdgeError> {
    let cloud = Arc::new(CloudClient::from_config(config)?);
    let current = CurrentOrder::new();
    let poller = SessionPoller::new(Arc::clone(&cloud), current.clone(), config.session_poll_interval);
    match poller.poll_once().await? {
        Some(order_id) => info!("🧪️ Simulated cash will go to order {order_id}"),
        None => warn!("🧪️ No session is waiting for cash. The simulated {kind} will not be credited."),
    }

    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let (bridge, handle) = start_bridge(config, &VirtualAcceptor::new(PulseDecoderConfig::default()), tx);
    let token = CancellationToken::new();
    let task = tokio::spawn({
        let token = token.clone();
        async move { bridge.run(token).await }
    });
    let event = tokio::time::timeout(timeout, request_test_insertion(&handle, &mut rx, kind, amount))
        .await
        .map_err(|_| EdgeError::Timeout(format!("the acceptor to report the simulated {kind}")))
        .and_then(|r| r);
    token.cancel();
    let _ = task.await;

    let dispatcher = Dispatcher::new(cloud, current, retry_policy(config));
    Ok(dispatcher.dispatch(&event?).await)
}

async fn ping(handle: &BridgeHandle) -> Result<(), EdgeError> {
    handle.wait_connected().await?;
    let mut status = handle.subscribe_status();
    handle.send_command(&DecoderCommand::Ping)?;
    loop {
        match status.recv().await {
            Ok(StatusLine::Pong) => return Ok(()),
            Ok(_) | Err(RecvError::Lagged(_)) => {},
            Err(RecvError::Closed) => return Err(BridgeError::LinkClosed.into()),
        }
    }
}

async fn request_test_insertion(
    handle: &BridgeHandle,
    events: &mut mpsc::Receiver<AcceptorEvent>,
    kind: CashKind,
    amount: Money,
) -> Result<CashEvent, EdgeError> {
    handle.wait_connected().await?;
    handle.send_command(&DecoderCommand::Test { kind, amount })?;
    loop {
        match events.recv().await {
            Some(AcceptorEvent::Cash(event)) => return Ok(event),
            Some(AcceptorEvent::Cancel) => info!("🧪️ Ignoring a cancel press during the simulation"),
            None => return Err(BridgeError::LinkClosed.into()),
        }
    }
}

fn start_bridge(
    config: &EdgeConfig,
    acceptor: &VirtualAcceptor,
    events: mpsc::Sender<AcceptorEvent>,
) -> (SerialBridge<AcceptorLink>, BridgeHandle) {
    let link = AcceptorLink::from_config(config, acceptor);
    SerialBridge::new(link, BridgeSettings::from_config(config), events)
}

fn retry_policy(config: &EdgeConfig) -> RetryPolicy {
    RetryPolicy { attempts: config.retry_attempts, delay: config.retry_delay }
}
