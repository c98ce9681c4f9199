//! Token operations exposed over HTTP.
//!
//! [`TokenService`] owns the ledger handle injected at startup and runs every request as
//! an independent, single attempt:
//!
//! ```text
//! READ_DECIMALS -> PARSE_AMOUNT -> CHECK_PRECONDITION -> SIMULATE -> SUBMIT -> AWAIT_CONFIRMATION
//! ```
//!
//! Any failure stops the sequence and is classified once into a [`TokenError`]. A
//! transaction that is mined but reverted is not a failure: it yields an outcome with
//! `success: false`.

use alloy::primitives::Address;
use std::sync::Arc;
use tracing::instrument;

use crate::amount::{self, Amount, Decimals, format_units, parse_units};
use crate::error::{Stage, TokenError};
use crate::ledger::{ConfirmationStatus, Ledger, LedgerError, TokenCall};
use crate::types::{
    ApproveRequest, BalanceResponse, EvmAddress, TokenInfoResponse, TransactionOutcome,
    TransferFromRequest,
};

/// Per-process knobs for the write path, taken from the `[transaction]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Blocks required on top of the including block before an outcome is reported.
    pub confirmations: u64,
    /// Read the allowance before simulating a delegated transfer and fail fast when it is
    /// too small. The ledger re-checks it either way.
    pub allowance_precheck: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confirmations: 1,
            allowance_precheck: true,
        }
    }
}

/// Runs token reads and writes against one injected [`Ledger`].
pub struct TokenService<L> {
    ledger: Arc<L>,
    settings: PipelineSettings,
}

impl<L> Clone for TokenService<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            settings: self.settings,
        }
    }
}

impl<L: Ledger> TokenService<L> {
    pub fn new(ledger: Arc<L>, settings: PipelineSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Name, symbol, decimals and the current total supply.
    ///
    /// Metadata is not cached: total supply can change between requests.
    #[instrument(skip_all)]
    pub async fn token_info(&self) -> Result<TokenInfoResponse, TokenError> {
        let ledger = self.ledger.as_ref();
        let (name, symbol, total_supply, decimals) = tokio::try_join!(
            ledger.name(),
            ledger.symbol(),
            ledger.total_supply(),
            ledger.decimals(),
        )
        .map_err(|e| fail(Stage::TokenInfo, e))?;

        let total_supply = format_units(total_supply, decimals);
        tracing::info!(%name, %symbol, %total_supply, decimals, "token info fetched");
        Ok(TokenInfoResponse {
            name,
            symbol,
            total_supply,
            decimals,
        })
    }

    /// Formatted balance of `address`; the zero address is a valid account here.
    #[instrument(skip_all, fields(address = %address))]
    pub async fn balance(&self, address: &str) -> Result<BalanceResponse, TokenError> {
        let account = parse_address("address", address, false)?;
        let ledger = self.ledger.as_ref();
        let (balance, decimals) = tokio::try_join!(ledger.balance_of(account), ledger.decimals())
            .map_err(|e| fail(Stage::Balance, e))?;

        let balance = format_units(balance, decimals);
        tracing::info!(%balance, "balance fetched");
        Ok(BalanceResponse { balance })
    }

    /// Move `amount` tokens from `from` to `to` using the allowance `from` granted to the
    /// gateway's signer.
    #[instrument(skip_all, fields(
        from = %request.from,
        to = %request.to,
        amount = %request.amount,
    ))]
    pub async fn transfer_from(
        &self,
        request: &TransferFromRequest,
    ) -> Result<TransactionOutcome, TokenError> {
        let from = parse_address("from", &request.from, true)?;
        let to = parse_address("to", &request.to, true)?;
        let amount = self.read_amount(&request.amount).await?;

        let signer = self.ledger.signer();
        if self.settings.allowance_precheck {
            self.assert_enough_allowance(from, signer, &amount, &request.amount)
                .await?;
        }

        self.execute(TokenCall::TransferFrom {
            from,
            to,
            amount: amount.raw(),
        })
        .await
    }

    /// Let `spender` move up to `amount` of the signer's tokens.
    #[instrument(skip_all, fields(spender = %request.spender, amount = %request.amount))]
    pub async fn approve(&self, request: &ApproveRequest) -> Result<TransactionOutcome, TokenError> {
        let spender = parse_address("spender", &request.spender, true)?;
        let amount = self.read_amount(&request.amount).await?;
        self.execute(TokenCall::Approve {
            spender,
            amount: amount.raw(),
        })
        .await
    }

    /// Reject malformed input locally, then parse at the token's precision.
    async fn read_amount(&self, value: &str) -> Result<Amount, TokenError> {
        amount::check_decimal(value).map_err(|e| TokenError::malformed_amount(&e))?;
        let decimals: Decimals = self
            .ledger
            .decimals()
            .await
            .map_err(|e| fail(Stage::ReadDecimals, e))?;
        let amount = parse_units(value, decimals).map_err(|e| {
            tracing::warn!(error = %e, "amount rejected");
            TokenError::malformed_amount(&e)
        })?;
        tracing::debug!(raw = %amount.raw(), decimals, "amount parsed");
        Ok(amount)
    }

    #[instrument(skip_all, fields(owner = %owner, spender = %spender))]
    async fn assert_enough_allowance(
        &self,
        owner: Address,
        spender: Address,
        required: &Amount,
        requested: &str,
    ) -> Result<(), TokenError> {
        let raw = self
            .ledger
            .allowance(owner, spender)
            .await
            .map_err(|e| fail(Stage::CheckPrecondition, e))?;
        let allowance = Amount::from_raw(raw, required.decimals());
        tracing::info!(%allowance, unlimited = allowance.is_unlimited(), "current allowance");

        if allowance.covers(required) == Some(true) {
            return Ok(());
        }
        tracing::warn!(
            available = %allowance.raw(),
            required = %required.raw(),
            "insufficient allowance"
        );
        Err(TokenError::insufficient_allowance(spender, requested, owner))
    }

    /// Simulate, submit and wait: the three-phase write.
    async fn execute(&self, call: TokenCall) -> Result<TransactionOutcome, TokenError> {
        let function = call.function_name();
        let ledger = self.ledger.as_ref();

        tracing::info!(function, "simulating transaction");
        let plan = ledger
            .simulate(call)
            .await
            .map_err(|e| fail(Stage::Simulate, e))?;

        let transaction_hash = ledger
            .submit(plan)
            .await
            .map_err(|e| fail(Stage::Submit, e))?;
        tracing::info!(function, %transaction_hash, "transaction sent, waiting for confirmation");

        let confirmation = ledger
            .await_confirmation(transaction_hash, self.settings.confirmations)
            .await
            .map_err(|e| fail(Stage::AwaitConfirmation, e))?;

        let success = confirmation.status == ConfirmationStatus::Success;
        if success {
            tracing::info!(
                function,
                %transaction_hash,
                block_number = confirmation.block_number,
                "transaction confirmed"
            );
        } else {
            tracing::warn!(
                function,
                %transaction_hash,
                block_number = confirmation.block_number,
                "transaction reverted on-chain"
            );
        }
        Ok(TransactionOutcome {
            success,
            transaction_hash: confirmation.transaction_hash,
            block_number: confirmation.block_number.to_string(),
        })
    }
}

fn parse_address(field: &str, value: &str, mutating: bool) -> Result<Address, TokenError> {
    let address: EvmAddress = value
        .parse()
        .map_err(|_| TokenError::invalid_address(field))?;
    if mutating && address.is_zero() {
        return Err(TokenError::zero_address(field));
    }
    Ok(address.into())
}

fn fail(stage: Stage, error: LedgerError) -> TokenError {
    let classified = TokenError::classify(stage, &error);
    tracing::error!(
        %stage,
        error = %error,
        code = %classified.code,
        "token operation failed"
    );
    classified
}
