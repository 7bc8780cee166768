use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use matrix_commission::{CommissionError, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPolicy {
    Ignore,
    Report,
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub id: String,
    pub status_code: u16,
    pub public_code: String,
    pub summary: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    public_code: String,
    public_message: Option<String>,
    report_policy: ReportPolicy,
    report_summary: Option<String>,
    report_details: Option<String>,
}

impl ApiError {
    fn new(
        status: StatusCode,
        public_code: impl Into<String>,
        public_message: Option<String>,
        report_policy: ReportPolicy,
    ) -> Self {
        Self {
            status,
            public_code: public_code.into(),
            public_message,
            report_policy,
            report_summary: None,
            report_details: None,
        }
    }

    fn with_report(mut self, summary: impl Into<String>, details: Option<String>) -> Self {
        self.report_summary = Some(summary.into());
        self.report_details = details;
        self
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", Some(msg), ReportPolicy::Ignore)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Conflict: {}", msg);
        Self::new(StatusCode::CONFLICT, "CONFLICT", Some(msg), ReportPolicy::Ignore)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Service unavailable: {}", msg);
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            Some("Service unavailable".to_string()),
            ReportPolicy::Report,
        )
        .with_report(msg, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> {
            error: ErrorBody<'a>,
        }

        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
            message: &'a str,
        }

        let code = if self.public_code.is_empty() {
            match self.status {
                StatusCode::NOT_FOUND => "NOT_FOUND",
                StatusCode::CONFLICT => "CONFLICT",
                StatusCode::BAD_REQUEST => "BAD_REQUEST",
                _ => "ERROR",
            }
        } else {
            self.public_code.as_str()
        };

        let public_message = self
            .public_message
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error"));

        let mut error_id: Option<String> = None;
        if self.report_policy == ReportPolicy::Report {
            error_id = Some(matrix_commission::create_id());
        }

        let mut response = (
            self.status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    code,
                    id: error_id.as_deref(),
                    message: public_message,
                },
            }),
        )
            .into_response();

        if let Some(id) = error_id.as_deref() {
            if let Ok(v) = HeaderValue::from_str(id) {
                response.headers_mut().insert("x-error-id", v);
            }

            let report = ErrorReport {
                id: id.to_string(),
                status_code: self.status.as_u16(),
                public_code: code.to_string(),
                summary: self
                    .report_summary
                    .clone()
                    .unwrap_or_else(|| public_message.to_string()),
                details: self.report_details.clone(),
            };
            response.extensions_mut().insert(report);
        }

        response
    }
}

// Implement From for sea_orm::DbErr
impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DATABASE_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(format!("{:?}", err), Some(err.to_string()))
    }
}

impl From<stripe::WebhookError> for ApiError {
    fn from(err: stripe::WebhookError) -> Self {
        tracing::warn!("Webhook verification failed: {:?}", err);
        Self::bad_request(format!("Invalid webhook: {}", err))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(what),
            StoreError::Conflict(what) => Self::conflict(what),
            other => {
                tracing::error!("Store error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    None,
                    ReportPolicy::Report,
                )
                .with_report(format!("{:?}", other), Some(other.to_string()))
            }
        }
    }
}

impl From<CommissionError> for ApiError {
    fn from(err: CommissionError) -> Self {
        match err {
            CommissionError::NotFound { .. } => Self::not_found(err.to_string()),
            CommissionError::OrderNotPaid { .. } => Self::conflict(err.to_string()),
            CommissionError::CorruptGenealogy { .. } => {
                tracing::error!("Genealogy needs repair: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CORRUPT_GENEALOGY",
                    None,
                    ReportPolicy::Report,
                )
                .with_report(err.to_string(), None)
            }
            CommissionError::InvalidRuleSet(_) => {
                tracing::error!("Commission rules rejected: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVALID_RULE_SET",
                    None,
                    ReportPolicy::Report,
                )
                .with_report(err.to_string(), None)
            }
            CommissionError::Store(store_err) => store_err.into(),
        }
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.public_code.as_str())
    }
}

// Convenience macros for quick error creation
#[macro_export]
macro_rules! not_found {
    ($($arg:tt)*) => { $crate::error::ApiError::not_found(format!($($arg)*)) };
}

#[macro_export]
macro_rules! bad_request {
    ($($arg:tt)*) => { $crate::error::ApiError::bad_request(format!($($arg)*)) };
}
