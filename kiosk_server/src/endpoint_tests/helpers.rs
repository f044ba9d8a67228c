use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use cash_ledger::{PrintQueue, SessionStore};
use kiosk_common::{wire::API_KEY_HEADER, Secret};
use log::debug;
use serde_json::Value;

use crate::server::configure_routes;

/// A ledger that outlives individual requests, so that a test can make several calls against the same state.
pub struct TestContext {
    pub store: Arc<SessionStore>,
    pub queue: Arc<PrintQueue>,
    pub api_key: Option<Secret<String>>,
}

impl TestContext {
    pub fn new() -> Self {
        let _ = env_logger::try_init();
        let queue = Arc::new(PrintQueue::default());
        let store = Arc::new(SessionStore::new(Arc::clone(&queue)));
        Self { store, queue, api_key: None }
    }

    pub fn with_api_key(key: &str) -> Self {
        Self { api_key: Some(Secret::new(key.to_string())), ..Self::new() }
    }

    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let api_key = self.api_key.clone();
        let app = App::new()
            .app_data(web::Data::from(Arc::clone(&self.store)))
            .app_data(web::Data::from(Arc::clone(&self.queue)))
            .configure(|cfg| configure_routes(cfg, api_key));
        let service = test::init_service(app).await;
        debug!("Making request");
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn get(&self, path: &str) -> (StatusCode, String) {
        self.send(self.authorized(TestRequest::get().uri(path))).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, String) {
        self.send(self.authorized(TestRequest::post().uri(path).set_json(body))).await
    }

    pub async fn post_empty(&self, path: &str) -> (StatusCode, String) {
        self.send(self.authorized(TestRequest::post().uri(path))).await
    }

    fn authorized(&self, req: TestRequest) -> TestRequest {
        match &self.api_key {
            Some(key) => req.insert_header((API_KEY_HEADER, key.reveal().as_str())),
            None => req,
        }
    }
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response was not JSON ({e}): {body}"))
}
