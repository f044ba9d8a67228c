use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use cash_ledger::{
    events::{EventHandlers, EventHooks},
    PrintQueue,
    SessionStore,
};
use futures::FutureExt;
use kiosk_common::Secret;
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::ApiKeyMiddlewareFactory,
    routes::{
        active_sessions,
        cancel_session,
        cash_update,
        complete_print_job,
        create_session,
        fail_print_job,
        health,
        new_print_job,
        next_print_job,
        session_by_id,
    },
    workers::{start_maintenance_worker, MaintenanceSchedule},
};

const EVENT_BUFFER_SIZE: usize = 64;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, default_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();
    let queue = Arc::new(PrintQueue::new(config.print_max_attempts));
    let store = Arc::new(SessionStore::with_producers(Arc::clone(&queue), producers));
    let _worker =
        start_maintenance_worker(Arc::clone(&store), Arc::clone(&queue), MaintenanceSchedule::from_config(&config));
    let srv = create_server_instance(config, store, queue)?;
    srv.await.map_err(|e| ServerError::Stopped(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    store: Arc<SessionStore>,
    queue: Arc<PrintQueue>,
) -> Result<Server, ServerError> {
    let api_key = config.api_key.clone();
    let srv = HttpServer::new(move || {
        let api_key = api_key.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("kiosk::access_log"))
            .app_data(web::Data::from(Arc::clone(&store)))
            .app_data(web::Data::from(Arc::clone(&queue)))
            .configure(|cfg| configure_routes(cfg, api_key))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route. `/health` is open; everything else sits behind the API key check.
///
/// `/sessions/active` must be registered before `/sessions/{order_id}`, otherwise "active" is taken for an order id.
pub fn configure_routes(cfg: &mut web::ServiceConfig, api_key: Option<Secret<String>>) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
    cfg.app_data(json_config).service(health).service(
        web::scope("")
            .wrap(ApiKeyMiddlewareFactory::new(api_key))
            .service(create_session)
            .service(active_sessions)
            .service(session_by_id)
            .service(cash_update)
            .service(cancel_session)
            .service(new_print_job)
            .service(next_print_job)
            .service(complete_print_job)
            .service(fail_print_job),
    );
}

/// Hooks installed on a production server. Both only log for now; the cancelled hook is where a refund integration
/// would attach.
pub fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_session_completed(|ev| {
            async move {
                info!(
                    "🧾️ Order {} paid in cash ({} inserted for {}). Receipt {} is waiting for the printer.",
                    ev.session.order_id, ev.session.amount_inserted, ev.session.total_required, ev.print_job_id
                );
            }
            .boxed()
        })
        .on_session_cancelled(|ev| {
            async move {
                if ev.amount_returned.is_positive() {
                    warn!(
                        "💸️ Order {} was cancelled at {} with cash in the machine. {} must be returned to the customer.",
                        ev.session.order_id, ev.timestamp, ev.amount_returned
                    );
                } else {
                    info!("💸️ Order {} was cancelled before any cash was inserted.", ev.session.order_id);
                }
            }
            .boxed()
        });
    hooks
}
