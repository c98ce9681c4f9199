//! Nonce allocation for the gateway's signing identity.
//!
//! Nonces are fetched once with the `pending` tag (falling back to `latest` on endpoints
//! that do not support it) and then incremented locally, so concurrent requests never
//! share a nonce. When a submission or confirmation fails, the on-chain state is
//! unknown: the slot is cleared and the next transaction asks the node again.

use alloy::network::Network;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::providers::fillers::NonceManager;
use alloy::transports::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-address nonce cache shared by every clone of the manager.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    /// `None` means the next allocation must query the node.
    slots: Arc<DashMap<Address, Arc<Mutex<Option<u64>>>>>,
}

impl PendingNonceManager {
    fn slot(&self, address: Address) -> Arc<Mutex<Option<u64>>> {
        // Clone the Arc out so the map shard is not locked across an await.
        let entry = self.slots.entry(address).or_default();
        Arc::clone(entry.value())
    }

    /// Forget the cached nonce for `address`.
    pub async fn reset_nonce(&self, address: Address) {
        let Some(slot) = self.slots.get(&address).map(|entry| Arc::clone(entry.value())) else {
            return;
        };
        *slot.lock().await = None;
        tracing::debug!(%address, "nonce cache cleared, next transaction will requery");
    }

    /// Most recently allocated nonce, if one is cached.
    pub async fn current(&self, address: Address) -> Option<u64> {
        let slot = self.slots.get(&address).map(|entry| Arc::clone(entry.value()))?;
        *slot.lock().await
    }

    /// Allocate from the cache, or seed the cache with `fetch` when it is empty.
    async fn allocate<F, Fut>(&self, address: Address, fetch: F) -> TransportResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TransportResult<u64>>,
    {
        let slot = self.slot(address);
        let mut cached = slot.lock().await;
        let nonce = match *cached {
            Some(previous) => previous + 1,
            None => fetch().await?,
        };
        *cached = Some(nonce);
        tracing::debug!(%address, nonce, "nonce allocated");
        Ok(nonce)
    }
}

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        self.allocate(address, || async move {
            match provider.get_transaction_count(address).pending().await {
                Ok(nonce) => {
                    tracing::info!(%address, nonce, block_tag = "pending", "nonce fetched");
                    Ok(nonce)
                }
                Err(error) => {
                    tracing::warn!(
                        %address,
                        error = ?error,
                        "pending block tag not supported by RPC, falling back to latest"
                    );
                    provider.get_transaction_count(address).latest().await
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use alloy::transports::TransportErrorKind;

    const SIGNER: Address = address!("0x00000000000000000000000000000000000000a1");

    #[tokio::test]
    async fn test_first_allocation_fetches_then_increments() {
        let manager = PendingNonceManager::default();
        assert_eq!(manager.allocate(SIGNER, || async { Ok(7) }).await.unwrap(), 7);
        let nonce = manager
            .allocate(SIGNER, || async { Ok(999) })
            .await
            .unwrap();
        assert_eq!(nonce, 8);
        assert_eq!(manager.current(SIGNER).await, Some(8));
    }

    #[tokio::test]
    async fn test_reset_forces_requery() {
        let manager = PendingNonceManager::default();
        manager.allocate(SIGNER, || async { Ok(3) }).await.unwrap();
        manager.reset_nonce(SIGNER).await;
        assert_eq!(manager.current(SIGNER).await, None);
        assert_eq!(manager.allocate(SIGNER, || async { Ok(10) }).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_reset_unknown_address_is_noop() {
        let manager = PendingNonceManager::default();
        manager.reset_nonce(SIGNER).await;
        assert!(!manager.slots.contains_key(&SIGNER));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_slot_empty() {
        let manager = PendingNonceManager::default();
        let result = manager
            .allocate(SIGNER, || async {
                Err(TransportErrorKind::custom_str("connection refused"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.current(SIGNER).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let manager = PendingNonceManager::default();
        manager.allocate(SIGNER, || async { Ok(0) }).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .allocate(SIGNER, || async { Ok(u64::MAX) })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (1..=16).collect::<Vec<_>>());
    }
}
