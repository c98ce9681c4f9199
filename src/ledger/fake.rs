//! In-memory ledger for tests.
//!
//! Behaves like a standard ERC-20 token: `transferFrom` needs allowance and balance,
//! spending an unlimited (`uint256::MAX`) allowance leaves it untouched, and state only
//! changes when a submitted transaction is confirmed. Every call is recorded so tests can
//! assert which remote round-trips happened.

use alloy::primitives::{Address, B256, TxHash, U256};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    CallPlan, Confirmation, ConfirmationStatus, LedgerError, LedgerReader, LedgerWriter,
    RevertReason, TokenCall,
};

/// A call the pipeline made against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    BalanceOf(Address),
    Allowance(Address, Address),
    Simulate(TokenCall),
    Submit(TokenCall),
    AwaitConfirmation(TxHash, u64),
}

/// Where a scripted failure is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Name,
    Decimals,
    TotalSupply,
    BalanceOf,
    Allowance,
    Simulate,
    Submit,
    Confirm,
}

#[derive(Debug)]
struct State {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    block_number: u64,
    /// Last transaction sequence handed out; hashes are derived from it.
    sequence: u64,
    submitted: HashMap<TxHash, TokenCall>,
    calls: Vec<LedgerCall>,
    failures: HashMap<FailurePoint, LedgerError>,
    revert_on_confirm: bool,
}

#[derive(Debug)]
pub struct FakeLedger {
    signer: Address,
    state: Mutex<State>,
}

impl FakeLedger {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            state: Mutex::new(State {
                name: "Gateway Token".to_string(),
                symbol: "GWT".to_string(),
                decimals: 18,
                total_supply: U256::ZERO,
                balances: HashMap::new(),
                allowances: HashMap::new(),
                block_number: 100,
                sequence: 0,
                submitted: HashMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                revert_on_confirm: false,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_decimals(self, decimals: u8) -> Self {
        self.state().decimals = decimals;
        self
    }

    pub fn with_total_supply(self, raw: U256) -> Self {
        self.state().total_supply = raw;
        self
    }

    pub fn with_balance(self, account: Address, raw: U256) -> Self {
        self.state().balances.insert(account, raw);
        self
    }

    pub fn with_allowance(self, owner: Address, spender: Address, raw: U256) -> Self {
        self.state().allowances.insert((owner, spender), raw);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.state().block_number = block_number;
        self
    }

    pub fn fail_at(self, point: FailurePoint, error: LedgerError) -> Self {
        self.state().failures.insert(point, error);
        self
    }

    /// Make every confirmed transaction come back reverted, as if state moved on
    /// between simulation and inclusion.
    pub fn reverting_on_confirm(self) -> Self {
        self.state().revert_on_confirm = true;
        self
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&LedgerCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn simulate_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, LedgerCall::Simulate(_)))
    }

    pub fn submit_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, LedgerCall::Submit(_)))
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.state().balances.get(&account).copied().unwrap_or_default()
    }

    pub fn allowance_of(&self, owner: Address, spender: Address) -> U256 {
        self.state()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn record(&self, call: LedgerCall, point: Option<FailurePoint>) -> Result<(), LedgerError> {
        let mut state = self.state();
        state.calls.push(call);
        match point.and_then(|point| state.failures.get(&point)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check(&self, state: &State, call: &TokenCall) -> Result<(), RevertReason> {
        match call {
            TokenCall::TransferFrom { from, to, amount } => {
                if from.is_zero() {
                    return Err(RevertReason::InvalidAccount(*from));
                }
                if to.is_zero() {
                    return Err(RevertReason::InvalidAccount(*to));
                }
                let allowance = state
                    .allowances
                    .get(&(*from, self.signer))
                    .copied()
                    .unwrap_or_default();
                if allowance < *amount {
                    return Err(RevertReason::InsufficientAllowance);
                }
                let balance = state.balances.get(from).copied().unwrap_or_default();
                if balance < *amount {
                    return Err(RevertReason::InsufficientBalance);
                }
                Ok(())
            }
            TokenCall::Approve { spender, .. } if spender.is_zero() => {
                Err(RevertReason::InvalidAccount(*spender))
            }
            TokenCall::Approve { .. } => Ok(()),
        }
    }

    fn apply(&self, state: &mut State, call: &TokenCall) {
        match call {
            TokenCall::TransferFrom { from, to, amount } => {
                let key = (*from, self.signer);
                let allowance = state.allowances.get(&key).copied().unwrap_or_default();
                if allowance != U256::MAX {
                    state.allowances.insert(key, allowance - *amount);
                }
                *state.balances.entry(*from).or_default() -= *amount;
                *state.balances.entry(*to).or_default() += *amount;
            }
            TokenCall::Approve { spender, amount } => {
                state.allowances.insert((self.signer, *spender), *amount);
            }
        }
    }
}

impl LedgerReader for FakeLedger {
    async fn name(&self) -> Result<String, LedgerError> {
        self.record(LedgerCall::Name, Some(FailurePoint::Name))?;
        Ok(self.state().name.clone())
    }

    async fn symbol(&self) -> Result<String, LedgerError> {
        self.record(LedgerCall::Symbol, None)?;
        Ok(self.state().symbol.clone())
    }

    async fn decimals(&self) -> Result<u8, LedgerError> {
        self.record(LedgerCall::Decimals, Some(FailurePoint::Decimals))?;
        Ok(self.state().decimals)
    }

    async fn total_supply(&self) -> Result<U256, LedgerError> {
        self.record(LedgerCall::TotalSupply, Some(FailurePoint::TotalSupply))?;
        Ok(self.state().total_supply)
    }

    async fn balance_of(&self, account: Address) -> Result<U256, LedgerError> {
        self.record(LedgerCall::BalanceOf(account), Some(FailurePoint::BalanceOf))?;
        Ok(self.balance(account))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, LedgerError> {
        self.record(
            LedgerCall::Allowance(owner, spender),
            Some(FailurePoint::Allowance),
        )?;
        Ok(self.allowance_of(owner, spender))
    }
}

impl LedgerWriter for FakeLedger {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn simulate(&self, call: TokenCall) -> Result<CallPlan, LedgerError> {
        self.record(LedgerCall::Simulate(call.clone()), Some(FailurePoint::Simulate))?;
        let state = self.state();
        self.check(&state, &call).map_err(LedgerError::Reverted)?;
        Ok(CallPlan::new(self.signer, Address::repeat_byte(0xee), call))
    }

    async fn submit(&self, plan: CallPlan) -> Result<TxHash, LedgerError> {
        let call = plan.call().clone();
        self.record(LedgerCall::Submit(call.clone()), Some(FailurePoint::Submit))?;
        let mut state = self.state();
        state.sequence += 1;
        let hash = B256::left_padding_from(&state.sequence.to_be_bytes());
        state.submitted.insert(hash, call);
        Ok(hash)
    }

    async fn await_confirmation(
        &self,
        transaction_hash: TxHash,
        confirmations: u64,
    ) -> Result<Confirmation, LedgerError> {
        self.record(
            LedgerCall::AwaitConfirmation(transaction_hash, confirmations),
            Some(FailurePoint::Confirm),
        )?;
        let mut state = self.state();
        let call = state
            .submitted
            .get(&transaction_hash)
            .cloned()
            .ok_or_else(|| LedgerError::Decode(format!("unknown transaction {transaction_hash}")))?;
        state.block_number += 1;
        let block_number = state.block_number;

        let executes = !state.revert_on_confirm && self.check(&state, &call).is_ok();
        let status = if executes {
            self.apply(&mut state, &call);
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
