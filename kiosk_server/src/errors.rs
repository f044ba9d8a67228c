use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use cash_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Invalid order id. {0}")]
    InvalidOrderId(String),
    #[error("Could not listen for connections. {0}")]
    Listen(#[from] std::io::Error),
    #[error("The server stopped unexpectedly. {0}")]
    Stopped(String),
    #[error("Missing or invalid API key. {0}")]
    Unauthorized(String),
    #[error("Not found. {0}")]
    NotFound(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidOrderId(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Listen(_) | Self::Stopped(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::SessionNotFound(_) | LedgerError::JobNotFound(_) => Self::NotFound(e.to_string()),
            LedgerError::InvalidAmount(_) | LedgerError::AmountOverflow(_) => Self::InvalidRequestBody(e.to_string()),
        }
    }
}
