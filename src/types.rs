//! Wire types for the token HTTP API.
//!
//! Request bodies carry addresses and amounts as plain strings; they are validated by the
//! pipeline so that every rejection flows through the same error classification.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 20-byte account or contract address in `0x`-prefixed hex form.
///
/// Parsing is stricter than [`Address::from_str`]: the prefix is mandatory and exactly
/// 40 hex digits must follow. Mixed case is accepted without checksum validation, so
/// equality is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvmAddress(pub Address);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a 0x-prefixed 40 hex digit address")]
pub struct InvalidAddress(pub String);

impl EvmAddress {
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for EvmAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .filter(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| InvalidAddress(s.to_string()))?;
        Address::from_str(hex)
            .map(EvmAddress)
            .map_err(|_| InvalidAddress(s.to_string()))
    }
}

impl TryFrom<String> for EvmAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvmAddress> for String {
    fn from(value: EvmAddress) -> Self {
        value.to_string()
    }
}

impl From<Address> for EvmAddress {
    fn from(value: Address) -> Self {
        EvmAddress(value)
    }
}

impl From<EvmAddress> for Address {
    fn from(value: EvmAddress) -> Self {
        value.0
    }
}

impl Display for EvmAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `GET /api/token/info` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfoResponse {
    pub name: String,
    pub symbol: String,
    /// Formatted with the token's decimals; re-read on every request.
    pub total_supply: String,
    pub decimals: u8,
}

/// `GET /api/token/balance/{address}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: String,
}

/// `POST /api/token/transfer-from` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferFromRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

/// `POST /api/token/approve` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub spender: String,
    pub amount: String,
}

/// Result of a transaction that reached the ledger and was confirmed.
///
/// `success` is `false` when the transaction was mined but reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub success: bool,
    pub transaction_hash: TxHash,
    /// Decimal block number, as a string so JavaScript clients keep full precision.
    pub block_number: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: bool,
    pub message: String,
    pub error_code: String,
}
