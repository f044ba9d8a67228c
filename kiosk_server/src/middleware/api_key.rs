//! Shared-secret middleware for Actix Web.
//!
//! The edge process authenticates itself by sending the configured `KIOSK_API_KEY` in the `X-API-Key` header. Wrap
//! every scope the edge talks to with [`ApiKeyMiddlewareFactory`]. Requests without the header, or with the wrong key,
//! are answered with `401 Unauthorized` and never reach the handler.
//!
//! When no key is configured, the middleware lets everything through.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    ResponseError,
};
use futures::future::LocalBoxFuture;
use kiosk_common::{wire::API_KEY_HEADER, Secret};
use log::{trace, warn};

use crate::errors::ServerError;

pub struct ApiKeyMiddlewareFactory {
    key: Option<Secret<String>>,
}

impl ApiKeyMiddlewareFactory {
    pub fn new(key: Option<Secret<String>>) -> Self {
        ApiKeyMiddlewareFactory { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<EitherBody<B>>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyMiddlewareService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct ApiKeyMiddlewareService<S> {
    key: Option<Secret<String>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<EitherBody<B>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let verdict = match &self.key {
            None => Ok(()),
            Some(key) => check_key(key, &req),
        };
        Box::pin(async move {
            match verdict {
                Ok(()) => service.call(req).await.map(ServiceResponse::map_into_left_body),
                Err(e) => {
                    let (req, _) = req.into_parts();
                    let res = e.error_response().map_into_right_body();
                    Ok(ServiceResponse::new(req, res))
                },
            }
        })
    }
}

fn check_key(key: &Secret<String>, req: &ServiceRequest) -> Result<(), ServerError> {
    trace!("🔐️ Checking API key for {}", req.path());
    let provided = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()).ok_or_else(|| {
        warn!("🔐️ No API key found in request to {}. Denying access.", req.path());
        ServerError::Unauthorized(format!("The {API_KEY_HEADER} header is required."))
    })?;
    if key.matches(provided) {
        trace!("🔐️ API key check for request ✅️");
        Ok(())
    } else {
        warn!("🔐️ Invalid API key in request to {}. Denying access.", req.path());
        Err(ServerError::Unauthorized(format!("The {API_KEY_HEADER} header does not match.")))
    }
}
