//! Outbound HTTP calls to the kiosk cloud service.
//!
//! The edge never accepts connections. Everything it learns about sessions and print jobs comes from polling these
//! endpoints. [`CloudApi`] is the seam the pollers and the dispatcher are written against; [`CloudClient`] is the
//! reqwest implementation.
use std::{future::Future, time::Duration};

use kiosk_common::{
    wire::{
        ActiveSession,
        CancelResponse,
        CashUpdateRequest,
        CashUpdateResponse,
        PrintFailureRequest,
        PrintJobEnvelope,
        API_KEY_HEADER,
    },
    OrderId,
    Secret,
};
use log::*;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{config::EdgeConfig, errors::CloudError};

pub trait CloudApi: Send + Sync {
    /// `GET /sessions/active`
    fn active_sessions(&self) -> impl Future<Output = Result<Vec<ActiveSession>, CloudError>> + Send;

    /// `POST /sessions/{order_id}/cash`
    fn post_cash(
        &self,
        order_id: &OrderId,
        update: &CashUpdateRequest,
    ) -> impl Future<Output = Result<CashUpdateResponse, CloudError>> + Send;

    /// `POST /sessions/{order_id}/cancel`
    fn cancel_session(&self, order_id: &OrderId) -> impl Future<Output = Result<CancelResponse, CloudError>> + Send;

    /// `GET /print-jobs/next`. `None` when nothing is waiting.
    fn next_print_job(&self) -> impl Future<Output = Result<Option<PrintJobEnvelope>, CloudError>> + Send;

    fn complete_print_job(&self, job_id: &str) -> impl Future<Output = Result<(), CloudError>> + Send;

    /// `attempt` is the envelope's, so that a late report cannot fail a later dispatch of the same job.
    fn fail_print_job(
        &self,
        job_id: &str,
        attempt: Option<u32>,
        reason: &str,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
}

#[derive(Debug, Clone)]
pub struct CloudClient {
    http: Client,
    base_url: Url,
    api_key: Option<Secret<String>>,
}

impl CloudClient {
    pub fn new(base_url: Url, api_key: Option<Secret<String>>, timeout: Duration) -> Result<Self, CloudError> {
        if base_url.cannot_be_a_base() {
            return Err(CloudError::InvalidUrl(format!("{base_url} cannot be used as a base URL")));
        }
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| CloudError::InvalidUrl(format!("Could not build the HTTP client. {e}")))?;
        Ok(Self { http, base_url, api_key })
    }

    pub fn from_config(config: &EdgeConfig) -> Result<Self, CloudError> {
        Self::new(config.cloud_url.clone(), config.api_key.clone(), config.http_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` to the base URL. Each segment is percent-encoded, so order ids may contain `/` or spaces.
    fn url(&self, segments: &[&str]) -> Result<Url, CloudError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CloudError::InvalidUrl(format!("{} cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.reveal()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CloudError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or(body);
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(CloudError::Transient(format!("{status}. {message}")))
        } else {
            Err(CloudError::Rejected { status: status.as_u16(), message })
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CloudError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

/// The server's `{"error": "..."}` body, if that is what it sent.
fn error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value.get("error").and_then(Value::as_str).map(String::from)
}

impl CloudApi for CloudClient {
    async fn active_sessions(&self) -> Result<Vec<ActiveSession>, CloudError> {
        let url = self.url(&["sessions", "active"])?;
        trace!("☁️ GET {url}");
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn post_cash(&self, order_id: &OrderId, update: &CashUpdateRequest) -> Result<CashUpdateResponse, CloudError> {
        let url = self.url(&["sessions", order_id.as_str(), "cash"])?;
        debug!("☁️ POST {url} ({})", update.amount_added);
        self.send_json(self.request(Method::POST, url).json(update)).await
    }

    async fn cancel_session(&self, order_id: &OrderId) -> Result<CancelResponse, CloudError> {
        let url = self.url(&["sessions", order_id.as_str(), "cancel"])?;
        debug!("☁️ POST {url}");
        self.send_json(self.request(Method::POST, url)).await
    }

    async fn next_print_job(&self) -> Result<Option<PrintJobEnvelope>, CloudError> {
        let url = self.url(&["print-jobs", "next"])?;
        trace!("☁️ GET {url}");
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json::<PrintJobEnvelope>().await?))
    }

    async fn complete_print_job(&self, job_id: &str) -> Result<(), CloudError> {
        let url = self.url(&["print-jobs", job_id, "complete"])?;
        debug!("☁️ POST {url}");
        self.send(self.request(Method::POST, url)).await.map(|_| ())
    }

    async fn fail_print_job(&self, job_id: &str, attempt: Option<u32>, reason: &str) -> Result<(), CloudError> {
        let url = self.url(&["print-jobs", job_id, "failed"])?;
        debug!("☁️ POST {url}: {reason}");
        let body = PrintFailureRequest { reason: reason.to_string(), attempt };
        self.send(self.request(Method::POST, url).json(&body)).await.map(|_| ())
    }
}
