//! Caller-facing error taxonomy.
//!
//! Every failure leaves the pipeline as a [`TokenError`] carrying one of seven
//! [`TokenErrorCode`]s. Ledger failures arrive already tagged with a [`LedgerError`] kind,
//! so classification only has to combine that kind with the [`Stage`] the pipeline was in.
//! Messages are composed from fixed text and caller input; raw node output is logged by
//! the pipeline and never echoed back.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

use crate::amount::AmountError;
use crate::ledger::{LedgerError, RejectReason, RevertReason};
use crate::types::ErrorResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenErrorCode {
    InvalidAddress,
    AddressNotFound,
    InsufficientAllowance,
    InsufficientFunds,
    ContractExecutionFailed,
    TransactionFailed,
    UnknownError,
}

impl TokenErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            TokenErrorCode::InvalidAddress => StatusCode::BAD_REQUEST,
            TokenErrorCode::AddressNotFound => StatusCode::NOT_FOUND,
            TokenErrorCode::InsufficientAllowance => StatusCode::FORBIDDEN,
            TokenErrorCode::InsufficientFunds => StatusCode::BAD_REQUEST,
            TokenErrorCode::ContractExecutionFailed => StatusCode::BAD_REQUEST,
            TokenErrorCode::TransactionFailed => StatusCode::BAD_REQUEST,
            TokenErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenErrorCode::InvalidAddress => "INVALID_ADDRESS",
            TokenErrorCode::AddressNotFound => "ADDRESS_NOT_FOUND",
            TokenErrorCode::InsufficientAllowance => "INSUFFICIENT_ALLOWANCE",
            TokenErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TokenErrorCode::ContractExecutionFailed => "CONTRACT_EXECUTION_FAILED",
            TokenErrorCode::TransactionFailed => "TRANSACTION_FAILED",
            TokenErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl Display for TokenErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step during which a failure was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadDecimals,
    CheckPrecondition,
    Simulate,
    Submit,
    AwaitConfirmation,
    /// Metadata reads behind `GET /api/token/info`.
    TokenInfo,
    /// Balance reads behind `GET /api/token/balance/{address}`.
    Balance,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let step = match self {
            Stage::ReadDecimals => "reading token decimals",
            Stage::CheckPrecondition => "checking the allowance",
            Stage::Simulate => "simulating the transaction",
            Stage::Submit => "submitting the transaction",
            Stage::AwaitConfirmation => "waiting for confirmation",
            Stage::TokenInfo => "fetching token information",
            Stage::Balance => "fetching the balance",
        };
        f.write_str(step)
    }
}

/// A classified failure, ready to be turned into an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TokenError {
    pub code: TokenErrorCode,
    pub message: String,
}

impl TokenError {
    pub fn new(code: TokenErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_address(field: &str) -> Self {
        Self::new(
            TokenErrorCode::InvalidAddress,
            format!("Invalid Ethereum address format for '{field}'"),
        )
    }

    pub fn zero_address(field: &str) -> Self {
        Self::new(
            TokenErrorCode::InvalidAddress,
            format!("'{field}' must not be the zero address"),
        )
    }

    /// Unit parsing failures surface as transaction failures, the category the service
    /// has always reported them under.
    pub fn malformed_amount(error: &AmountError) -> Self {
        Self::new(
            TokenErrorCode::TransactionFailed,
            format!("Transaction failed: invalid amount, {error}"),
        )
    }

    pub fn insufficient_allowance(spender: impl Display, amount: &str, owner: impl Display) -> Self {
        Self::new(
            TokenErrorCode::InsufficientAllowance,
            format!(
                "Insufficient allowance. The spender ({spender}) is not approved for {amount} tokens from {owner}."
            ),
        )
    }

    /// A request body that is not JSON or does not match the endpoint's schema.
    ///
    /// Grouped with malformed amounts: both are caller input rejected before any
    /// ledger access.
    pub fn malformed_body(rejection: &JsonRejection) -> Self {
        Self::new(
            TokenErrorCode::TransactionFailed,
            format!("Transaction failed: invalid request body, {}", rejection.body_text()),
        )
    }

    /// Map a tagged ledger failure observed at `stage` onto the caller-facing taxonomy.
    pub fn classify(stage: Stage, error: &LedgerError) -> Self {
        match stage {
            Stage::TokenInfo => {
                return Self::new(
                    TokenErrorCode::UnknownError,
                    "Failed to fetch token information from the contract.",
                );
            }
            Stage::Balance => {
                return Self::new(TokenErrorCode::AddressNotFound, "Failed to fetch balance.");
            }
            _ => {}
        }

        match error {
            LedgerError::Reverted(reason) => Self::reverted(reason),
            LedgerError::Rejected {
                reason: RejectReason::InsufficientFunds,
                ..
            } => Self::new(
                TokenErrorCode::InsufficientFunds,
                "Insufficient funds for this transaction",
            ),
            LedgerError::Rejected { reason, .. } => {
                let why = match reason {
                    RejectReason::NonceMismatch => "nonce mismatch",
                    RejectReason::Underpriced => "gas price too low",
                    RejectReason::InsufficientFunds | RejectReason::Other => "rejected by node",
                };
                Self::new(
                    TokenErrorCode::TransactionFailed,
                    format!("Transaction failed: {why} while {stage}"),
                )
            }
            LedgerError::ConfirmationTimeout(hash) => Self::new(
                TokenErrorCode::TransactionFailed,
                format!("Transaction failed: {hash} was not confirmed in time, query it before retrying"),
            ),
            LedgerError::Timeout(_) => Self::new(
                TokenErrorCode::TransactionFailed,
                format!("Transaction failed: ledger request timed out while {stage}"),
            ),
            LedgerError::Transport(_) => Self::new(
                TokenErrorCode::TransactionFailed,
                format!("Transaction failed: ledger unreachable while {stage}"),
            ),
            LedgerError::Decode(_) => Self::new(
                TokenErrorCode::TransactionFailed,
                format!("Transaction failed: unexpected ledger response while {stage}"),
            ),
        }
    }

    fn reverted(reason: &RevertReason) -> Self {
        match reason {
            RevertReason::InsufficientAllowance => Self::new(
                TokenErrorCode::InsufficientAllowance,
                "Contract execution failed: insufficient allowance",
            ),
            RevertReason::InvalidAccount(address) => Self::new(
                TokenErrorCode::InvalidAddress,
                format!("Contract execution failed: invalid account {address}"),
            ),
            other => Self::new(
                TokenErrorCode::ContractExecutionFailed,
                format!("Contract execution failed: {other}"),
            ),
        }
    }
}

impl From<JsonRejection> for TokenError {
    fn from(rejection: JsonRejection) -> Self {
        TokenError::malformed_body(&rejection)
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: true,
            message: self.message,
            error_code: self.code.as_str().to_string(),
        };
        (self.code.status(), Json(body)).into_response()
    }
}
