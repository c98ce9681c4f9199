//! Environment variables read at startup and the signing credential they carry.
//!
//! Variables:
//! - `RPC_URL`: JSON-RPC endpoint of the chain (required)
//! - `PRIVATE_KEY`: `0x`-prefixed 32-byte hex key of the signing identity (required)
//! - `CONTRACT_ADDRESS`: ERC-20 token contract (required)
//! - `HOST`, `PORT`: bind address, default `0.0.0.0:3000`
//! - `CHAIN_ID`: expected chain, checked against the endpoint when set
//! - `CONFIG_FILE`: TOML settings file, default `config.toml`

use alloy::network::EthereumWallet;
use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use std::fmt::{self, Debug, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

pub const ENV_RPC_URL: &str = "RPC_URL";
pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ENV_CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CHAIN_ID: &str = "CHAIN_ID";
pub const ENV_CONFIG_FILE: &str = "CONFIG_FILE";

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("{ENV_PRIVATE_KEY} must be a 0x-prefixed hex string")]
    MissingPrefix,
    #[error("{ENV_PRIVATE_KEY} must be a valid 64-character hex string (with 0x prefix)")]
    InvalidHex,
    #[error("{ENV_PRIVATE_KEY} is not a valid secp256k1 secret key")]
    InvalidKey,
}

/// The private key of the process-wide signing identity.
///
/// Loaded once at startup and never rotated. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredential(B256);

impl SigningCredential {
    /// Build the wallet every transaction is signed with.
    pub fn make_evm_wallet(&self) -> Result<EthereumWallet, CredentialError> {
        let signer =
            PrivateKeySigner::from_bytes(&self.0).map_err(|_| CredentialError::InvalidKey)?;
        Ok(EthereumWallet::from(signer))
    }
}

impl FromStr for SigningCredential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().strip_prefix("0x").ok_or(CredentialError::MissingPrefix)?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CredentialError::InvalidHex);
        }
        B256::from_str(hex)
            .map(SigningCredential)
            .map_err(|_| CredentialError::InvalidHex)
    }
}

impl Debug for SigningCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SigningCredential(<redacted>)")
    }
}
