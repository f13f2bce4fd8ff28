use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use market_payment_engine::{CheckoutApiError, IssuanceApiError, PaymentGatewayError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(#[from] PaymentGatewayError),
    #[error("Checkout failed. {0}")]
    CheckoutError(#[from] CheckoutApiError),
    #[error("Issuance failed. {0}")]
    IssuanceError(#[from] IssuanceApiError),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidSignature,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::BackendError(e) => backend_status(e),
            Self::CheckoutError(e) => match e {
                CheckoutApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                CheckoutApiError::RailFailure(r) if r.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                CheckoutApiError::RailFailure(_) => StatusCode::BAD_GATEWAY,
                CheckoutApiError::Backend(e) => backend_status(e),
            },
            Self::IssuanceError(e) => match e {
                IssuanceApiError::NotIssuable(_, _) => StatusCode::CONFLICT,
                IssuanceApiError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
                IssuanceApiError::Chain(_) => StatusCode::BAD_GATEWAY,
                IssuanceApiError::Backend(e) => backend_status(e),
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn backend_status(e: &PaymentGatewayError) -> StatusCode {
    match e {
        PaymentGatewayError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        PaymentGatewayError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        PaymentGatewayError::AssetNotFound(_, _) => StatusCode::NOT_FOUND,
        PaymentGatewayError::OrderAlreadyExists(_) => StatusCode::CONFLICT,
        PaymentGatewayError::OutOfStock(_, _) => StatusCode::CONFLICT,
        PaymentGatewayError::OrderModificationForbidden(_) => StatusCode::CONFLICT,
        PaymentGatewayError::AssetAlreadyExists(_, _) => StatusCode::CONFLICT,
        PaymentGatewayError::MerchantConfigNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PaymentGatewayError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
