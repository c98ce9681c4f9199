//! The single EVM network this gateway talks to.
//!
//! A process serves exactly one chain. Its id is read from the RPC endpoint at startup and
//! rendered in [CAIP-2] form (`eip155:<id>`) in logs and in `/health`.
//!
//! [CAIP-2]: https://github.com/ChainAgnostic/CAIPs/blob/main/CAIPs/caip-2.md

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const EIP155: &str = "eip155";

/// Well-known chains, used only to give log lines a readable name.
const KNOWN_CHAINS: &[(u64, &str)] = &[
    (1, "ethereum"),
    (10, "optimism"),
    (56, "bsc"),
    (97, "bsc-testnet"),
    (137, "polygon"),
    (8453, "base"),
    (31337, "hardhat"),
    (42161, "arbitrum"),
    (43113, "avalanche-fuji"),
    (43114, "avalanche"),
    (80002, "polygon-amoy"),
    (84532, "base-sepolia"),
    (11155111, "sepolia"),
];

/// An EIP-155 chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmChain {
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainIdParseError {
    #[error("empty chain ID")]
    Empty,
    #[error("unsupported namespace '{0}', only eip155 chains are served")]
    UnsupportedNamespace(String),
    #[error("invalid chain reference '{0}'")]
    InvalidReference(String),
}

impl EvmChain {
    pub const fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Human-readable network name, if the chain is a well-known one.
    pub fn name(&self) -> Option<&'static str> {
        KNOWN_CHAINS
            .iter()
            .find(|(id, _)| *id == self.chain_id)
            .map(|(_, name)| *name)
    }
}

impl Display for EvmChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{EIP155}:{}", self.chain_id)
    }
}

/// Accepts either CAIP-2 form (`eip155:11155111`) or a bare decimal id (`11155111`).
impl FromStr for EvmChain {
    type Err = ChainIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChainIdParseError::Empty);
        }
        let reference = match s.split_once(':') {
            Some((EIP155, reference)) => reference,
            Some((namespace, _)) => {
                return Err(ChainIdParseError::UnsupportedNamespace(namespace.to_string()));
            }
            None => s,
        };
        reference
            .parse()
            .map(EvmChain::new)
            .map_err(|_| ChainIdParseError::InvalidReference(reference.to_string()))
    }
}

impl Serialize for EvmChain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmChain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
