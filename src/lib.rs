//! HTTP gateway for delegated ERC-20 transfers and allowance grants.
//!
//! The gateway holds one signing key and talks to one token contract on one chain. It
//! turns `transferFrom`/`approve` requests into confirmed transactions and exposes token
//! metadata and balances, normalising fixed-point amounts and translating ledger failures
//! into a small, stable set of error codes.
//!
//! Layers, leaf first: [`amount`] (decimal codec), [`ledger`] (JSON-RPC client),
//! [`error`] (classification), [`pipeline`] (request sequencing), [`handlers`] (axum).

pub mod amount;
pub mod chain;
pub mod config;
pub mod error;
pub mod from_env;
pub mod handlers;
pub mod ledger;
pub mod pipeline;
pub mod sig_down;
pub mod telemetry;
pub mod types;
