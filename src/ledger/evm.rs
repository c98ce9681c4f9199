//! ERC-20 ledger client over Ethereum JSON-RPC.
//!
//! - **Reads** are `eth_call`s against the configured token contract.
//! - **Simulate** is an `eth_call` of the state-changing function from the signer.
//! - **Submit** signs with the local wallet and broadcasts; gas, nonce and chain id are
//!   filled by the provider stack.
//! - **Confirm** watches the transaction until the requested depth or the receipt timeout.
//!
//! Every alloy error is converted to a [`LedgerError`] at the call site that observed it.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy::providers::{
    Identity, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
    RootProvider, WalletProvider, WatchTxError,
};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{BlockNumberOrTag, TransactionRequest};
use alloy::transports::http::reqwest;
use alloy::transports::{RpcError, TransportErrorKind};
use std::time::Duration;
use tracing::Instrument;
use url::Url;

use super::nonce::PendingNonceManager;
use super::{
    CallPlan, Confirmation, ConfirmationStatus, IERC20, LedgerError, LedgerReader, LedgerWriter,
    RevertReason, TokenCall,
};
use crate::chain::EvmChain;

/// Gas, blob gas, nonce and chain id fillers, in that order.
type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// The composed provider: fillers plus wallet signing over a plain [`RootProvider`].
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Connection parameters for [`EvmLedger::connect`].
#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub rpc_url: Url,
    pub contract: Address,
    /// When set, startup fails unless the endpoint reports this chain.
    pub expected_chain: Option<EvmChain>,
    pub connection_timeout: Duration,
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,
}

/// Ledger client for one token contract, one endpoint and one signing identity.
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug)]
pub struct EvmLedger {
    inner: InnerProvider,
    contract: Address,
    signer: Address,
    chain: EvmChain,
    /// Legacy networks need an explicit gas price.
    eip1559: bool,
    nonce_manager: PendingNonceManager,
    receipt_timeout: Duration,
}

impl EvmLedger {
    /// Build the provider stack, then check the endpoint is reachable and on the right chain.
    pub async fn connect(
        settings: EvmSettings,
        wallet: EthereumWallet,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::debug!(
            rpc_timeout_secs = settings.rpc_timeout.as_secs(),
            connection_timeout_secs = settings.connection_timeout.as_secs(),
            "configuring RPC client"
        );
        let http_client = reqwest::Client::builder()
            .connect_timeout(settings.connection_timeout)
            .timeout(settings.rpc_timeout)
            .build()?;
        let client = RpcClient::builder().http_with_client(http_client, settings.rpc_url.clone());

        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let inner = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);
        let signer = inner.default_signer_address();

        let chain_id = inner
            .get_chain_id()
            .instrument(tracing::info_span!("get_chain_id", otel.kind = "client"))
            .await
            .map_err(rpc_failure)?;
        let chain = EvmChain::new(chain_id);
        if let Some(expected) = settings.expected_chain {
            if expected != chain {
                return Err(format!(
                    "RPC endpoint serves {chain}, but CHAIN_ID is configured as {expected}"
                )
                .into());
            }
        }

        let eip1559 = inner
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(rpc_failure)?
            .is_some_and(|block: alloy::rpc::types::Block| block.header.base_fee_per_gas.is_some());

        tracing::info!(
            chain = %chain,
            network = chain.name().unwrap_or("custom"),
            rpc = %redacted_url(&settings.rpc_url),
            contract = %settings.contract,
            %signer,
            eip1559,
            "connected to ledger"
        );

        Ok(Self {
            inner,
            contract: settings.contract,
            signer,
            chain,
            eip1559,
            nonce_manager,
            receipt_timeout: settings.receipt_timeout,
        })
    }

    pub fn chain(&self) -> EvmChain {
        self.chain
    }

    fn token(&self) -> IERC20::IERC20Instance<&RootProvider> {
        IERC20::new(self.contract, self.inner.root())
    }

    fn request_for(&self, call: &TokenCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.signer)
            .with_to(self.contract)
            .with_input(call.calldata())
    }

    async fn read<T>(
        &self,
        function: &'static str,
        call: impl IntoFuture<Output = Result<T, alloy::contract::Error>>,
    ) -> Result<T, LedgerError> {
        call.into_future()
            .instrument(tracing::info_span!(
                "erc20_read",
                function,
                token_contract = %self.contract,
                otel.kind = "client",
            ))
            .await
            .map_err(|e| {
                let error = contract_failure(e);
                tracing::warn!(function, %error, "token read failed");
                error
            })
    }
}

impl LedgerReader for EvmLedger {
    async fn name(&self) -> Result<String, LedgerError> {
        self.read("name", self.token().name().call()).await
    }

    async fn symbol(&self) -> Result<String, LedgerError> {
        self.read("symbol", self.token().symbol().call()).await
    }

    async fn decimals(&self) -> Result<u8, LedgerError> {
        self.read("decimals", self.token().decimals().call()).await
    }

    async fn total_supply(&self) -> Result<U256, LedgerError> {
        self.read("totalSupply", self.token().totalSupply().call()).await
    }

    async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
        self.read("balanceOf", self.token().balanceOf(account).call()).await
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, LedgerError> {
        self.read("allowance", self.token().allowance(owner, spender).call())
            .await
    }
}

impl LedgerWriter for EvmLedger {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn simulate(&self, call: TokenCall) -> Result<CallPlan, LedgerError> {
        let output = self
            .inner
            .root()
            .call(self.request_for(&call))
            .into_future()
            .instrument(tracing::info_span!(
                "simulate",
                function = call.function_name(),
                token_contract = %self.contract,
                otel.kind = "client",
            ))
            .await
            .map_err(rpc_failure)?;
        if returned_false(&output) {
            return Err(LedgerError::Reverted(RevertReason::ReturnedFalse));
        }
        Ok(CallPlan::new(self.signer, self.contract, call))
    }

    /// Broadcast a simulated call.
    ///
    /// Any failure clears the signer's cached nonce: the node may or may not have seen the
    /// transaction, so the next one must ask again.
    async fn submit(&self, plan: CallPlan) -> Result<TxHash, LedgerError> {
        let mut request = self
            .request_for(plan.call())
            .with_from(plan.signer())
            .with_to(plan.contract());
        if !self.eip1559 {
            let gas_price = self
                .inner
                .get_gas_price()
                .instrument(tracing::info_span!("get_gas_price", otel.kind = "client"))
                .await
                .map_err(rpc_failure)?;
            request.set_gas_price(gas_price);
        }

        let sent = self
            .inner
            .send_transaction(request)
            .instrument(tracing::info_span!(
                "send_transaction",
                function = plan.call().function_name(),
                from = %plan.signer(),
                token_contract = %plan.contract(),
                otel.kind = "client",
            ))
            .await;
        match sent {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => {
                let error = rpc_failure(e);
                if matches!(error, LedgerError::Rejected { .. }) {
                    tracing::warn!(from = %plan.signer(), %error, "node rejected transaction");
                }
                self.nonce_manager.reset_nonce(plan.signer()).await;
                Err(error)
            }
        }
    }

    async fn await_confirmation(
        &self,
        transaction_hash: TxHash,
        confirmations: u64,
    ) -> Result<Confirmation, LedgerError> {
        let watcher = PendingTransactionBuilder::new(self.inner.root().clone(), transaction_hash)
            .with_required_confirmations(confirmations)
            .with_timeout(Some(self.receipt_timeout));

        let receipt = watcher
            .get_receipt()
            .instrument(tracing::info_span!(
                "await_receipt",
                tx = %transaction_hash,
                confirmations,
                otel.kind = "client",
            ))
            .await;
        let receipt = match receipt {
            Ok(receipt) => receipt,
            Err(e) => {
                self.nonce_manager.reset_nonce(self.signer).await;
                return Err(pending_failure(transaction_hash, e));
            }
        };

        let block_number = receipt.block_number.ok_or_else(|| {
            LedgerError::Decode(format!("receipt for {transaction_hash} has no block number"))
        })?;
        let status = if receipt.status() {
            ConfirmationStatus::Success
        } else {
            ConfirmationStatus::Reverted
        };
        Ok(Confirmation {
            transaction_hash,
            block_number,
            status,
        })
    }
}

/// A `bool`-returning token function that answered `false` without reverting.
fn returned_false(output: &Bytes) -> bool {
    output.len() == 32 && output.iter().all(|byte| *byte == 0)
}

/// Tag a JSON-RPC failure by origin: remote revert, node validation, or transport.
fn rpc_failure(error: RpcError<TransportErrorKind>) -> LedgerError {
    match error {
        RpcError::ErrorResp(payload) => match payload.as_revert_data() {
            Some(data) => LedgerError::Reverted(RevertReason::decode(&data)),
            None => LedgerError::from_node_message(&payload.message),
        },
        RpcError::Transport(kind) => transport_failure(kind),
        RpcError::NullResp => LedgerError::Decode("null response from node".to_string()),
        RpcError::DeserError { err, .. } => LedgerError::Decode(err.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}

fn transport_failure(kind: TransportErrorKind) -> LedgerError {
    if let TransportErrorKind::Custom(source) = &kind {
        if let Some(error) = source.downcast_ref::<reqwest::Error>() {
            if error.is_timeout() {
                return LedgerError::Timeout(error.to_string());
            }
        }
    }
    LedgerError::Transport(kind.to_string())
}

fn contract_failure(error: alloy::contract::Error) -> LedgerError {
    match error {
        alloy::contract::Error::TransportError(error) => rpc_failure(error),
        alloy::contract::Error::ZeroData(..) => LedgerError::Decode(
            "contract returned no data; is the configured address an ERC-20 token?".to_string(),
        ),
        other => LedgerError::Decode(other.to_string()),
    }
}

fn pending_failure(transaction_hash: TxHash, error: PendingTransactionError) -> LedgerError {
    match error {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            LedgerError::ConfirmationTimeout(transaction_hash)
        }
        PendingTransactionError::TransportError(error) => rpc_failure(error),
        other => LedgerError::Transport(other.to_string()),
    }
}

/// RPC URLs often embed API keys in the path or query; log only scheme and host.
fn redacted_url(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or("unknown"))
}
