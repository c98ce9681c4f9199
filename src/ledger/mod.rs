//! Ledger client: the read and transaction capabilities the token pipeline needs.
//!
//! The ledger is an ERC-20 contract behind a JSON-RPC endpoint. Reads are single attempts
//! with no retry. Writes go through three phases:
//!
//! 1. [`LedgerWriter::simulate`] dry-runs the call against current state (`eth_call`);
//! 2. [`LedgerWriter::submit`] broadcasts it and returns once the node accepted it;
//! 3. [`LedgerWriter::await_confirmation`] waits for the receipt, which is the only
//!    authority on whether the transaction took effect.
//!
//! Failures are tagged with a [`LedgerError`] kind where they are first observed, so the
//! caller never has to re-derive what went wrong from message text.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolInterface};
use std::fmt::{self, Display, Formatter};
use std::future::Future;

pub mod evm;
#[cfg(test)]
pub mod fake;
pub mod nonce;

pub use evm::EvmLedger;

sol!(
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transferFrom(address from, address to, uint256 value) external returns (bool);
        function approve(address spender, uint256 value) external returns (bool);

        error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
        error ERC20InvalidSender(address sender);
        error ERC20InvalidReceiver(address receiver);
        error ERC20InsufficientAllowance(address spender, uint256 allowance, uint256 needed);
        error ERC20InvalidApprover(address approver);
        error ERC20InvalidSpender(address spender);
    }
);

/// A state-changing token call, always sent by the gateway's signing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCall {
    TransferFrom { from: Address, to: Address, amount: U256 },
    Approve { spender: Address, amount: U256 },
}

impl TokenCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            TokenCall::TransferFrom { .. } => "transferFrom",
            TokenCall::Approve { .. } => "approve",
        }
    }

    /// ABI-encoded calldata for the token contract.
    pub fn calldata(&self) -> Bytes {
        match self {
            TokenCall::TransferFrom { from, to, amount } => IERC20::transferFromCall {
                from: *from,
                to: *to,
                value: *amount,
            }
            .abi_encode()
            .into(),
            TokenCall::Approve { spender, amount } => IERC20::approveCall {
                spender: *spender,
                value: *amount,
            }
            .abi_encode()
            .into(),
        }
    }
}

/// A call that simulated successfully and is ready to be broadcast.
///
/// Only [`LedgerWriter::simulate`] produces plans, so holding one proves the dry run passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    signer: Address,
    contract: Address,
    call: TokenCall,
}

impl CallPlan {
    pub(crate) fn new(signer: Address, contract: Address, call: TokenCall) -> Self {
        Self {
            signer,
            contract,
            call,
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn call(&self) -> &TokenCall {
        &self.call
    }
}

/// Final state of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub status: ConfirmationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Success,
    Reverted,
}

/// Why the node refused a request before executing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The signer cannot pay for gas.
    InsufficientFunds,
    NonceMismatch,
    Underpriced,
    Other,
}

/// Why contract execution reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    InsufficientAllowance,
    InsufficientBalance,
    InvalidAccount(Address),
    /// The token returned `false` instead of reverting.
    ReturnedFalse,
    Message(String),
    Unknown,
}

impl RevertReason {
    /// Decode revert data: OpenZeppelin v5 custom errors first, then `Error(string)`.
    pub fn decode(data: &[u8]) -> Self {
        use IERC20::IERC20Errors;

        match IERC20Errors::abi_decode(data) {
            Ok(IERC20Errors::ERC20InsufficientAllowance(_)) => return Self::InsufficientAllowance,
            Ok(IERC20Errors::ERC20InsufficientBalance(_)) => return Self::InsufficientBalance,
            Ok(IERC20Errors::ERC20InvalidSender(e)) => return Self::InvalidAccount(e.sender),
            Ok(IERC20Errors::ERC20InvalidReceiver(e)) => return Self::InvalidAccount(e.receiver),
            Ok(IERC20Errors::ERC20InvalidApprover(e)) => return Self::InvalidAccount(e.approver),
            Ok(IERC20Errors::ERC20InvalidSpender(e)) => return Self::InvalidAccount(e.spender),
            Err(_) => {}
        }
        match alloy::sol_types::decode_revert_reason(data) {
            Some(reason) => Self::from_message(&reason),
            None => Self::Unknown,
        }
    }

    /// Recognise the revert strings of pre-v5 OpenZeppelin tokens.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("insufficient allowance") {
            Self::InsufficientAllowance
        } else if lower.contains("exceeds balance") || lower.contains("insufficient balance") {
            Self::InsufficientBalance
        } else if message.trim().is_empty() {
            Self::Unknown
        } else {
            Self::Message(message.trim().to_string())
        }
    }
}

impl Display for RevertReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::InsufficientAllowance => f.write_str("insufficient allowance"),
            RevertReason::InsufficientBalance => f.write_str("insufficient balance"),
            RevertReason::InvalidAccount(address) => write!(f, "invalid account {address}"),
            RevertReason::ReturnedFalse => f.write_str("token returned false"),
            RevertReason::Message(message) => f.write_str(message),
            RevertReason::Unknown => f.write_str("no reason given"),
        }
    }
}

/// A failure observed while talking to the ledger, tagged by where it originated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Connection, DNS or HTTP-level failure.
    #[error("RPC transport error: {0}")]
    Transport(String),
    /// The transport gave up waiting for a reply.
    #[error("RPC request timed out: {0}")]
    Timeout(String),
    /// The node validated and refused the request.
    #[error("node rejected request ({reason:?}): {detail}")]
    Rejected { reason: RejectReason, detail: String },
    /// Execution reverted during simulation or gas estimation.
    #[error("execution reverted: {0}")]
    Reverted(RevertReason),
    #[error("transaction {0} was not confirmed in time")]
    ConfirmationTimeout(TxHash),
    /// The node answered with something that is not what the call promised.
    #[error("unexpected ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Classify a JSON-RPC error response that carried no revert data.
    pub fn from_node_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if let Some(index) = lower.find("execution reverted") {
            let rest = message
                .get(index + "execution reverted".len()..)
                .unwrap_or_default()
                .trim_start_matches([':', ' '])
                .trim_matches('\'');
            return LedgerError::Reverted(RevertReason::from_message(rest));
        }
        let reason = if lower.contains("insufficient funds") {
            RejectReason::InsufficientFunds
        } else if lower.contains("nonce too low") || lower.contains("nonce too high") {
            RejectReason::NonceMismatch
        } else if lower.contains("underpriced") {
            RejectReason::Underpriced
        } else {
            RejectReason::Other
        };
        LedgerError::Rejected {
            reason,
            detail: message.to_string(),
        }
    }
}

/// Read-only queries against the configured token contract.
pub trait LedgerReader {
    fn name(&self) -> impl Future<Output = Result<String, LedgerError>> + Send;
    fn symbol(&self) -> impl Future<Output = Result<String, LedgerError>> + Send;
    fn decimals(&self) -> impl Future<Output = Result<u8, LedgerError>> + Send;
    fn total_supply(&self) -> impl Future<Output = Result<U256, LedgerError>> + Send;
    fn balance_of(&self, account: Address) -> impl Future<Output = Result<U256, LedgerError>> + Send;
    fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>> + Send;
}

/// Transaction capability bound to one signing identity.
pub trait LedgerWriter {
    /// Address of the signing identity every transaction is sent from.
    fn signer(&self) -> Address;

    /// Dry-run `call` against current state without committing anything.
    fn simulate(&self, call: TokenCall) -> impl Future<Output = Result<CallPlan, LedgerError>> + Send;

    /// Broadcast a simulated call. Resolves once the node accepted it into its pool.
    fn submit(&self, plan: CallPlan) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    /// Wait until `transaction_hash` is mined with `confirmations` blocks on top.
    fn await_confirmation(
        &self,
        transaction_hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<Confirmation, LedgerError>> + Send;
}

/// Both capabilities against one endpoint; what the pipeline is generic over.
pub trait Ledger: LedgerReader + LedgerWriter + Send + Sync {}

impl<T> Ledger for T where T: LedgerReader + LedgerWriter + Send + Sync {}
