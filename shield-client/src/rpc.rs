//! Order store access through a JSON-RPC node.
use std::time::Duration;

use alloy::{
    network::{EthereumWallet, ReceiptResponse},
    primitives::{Address, Bytes, TxHash},
    providers::{Provider, ProviderBuilder},
    rpc::types::TransactionReceipt,
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use log::debug;
use shield_common::{
    bindings::IShieldSwap, ports::OrderStorePort, ChainError, EncryptedOrder, OrderCreatedLog,
    TxReceipt,
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RECEIPT_POLL_ATTEMPTS: usize = 240;

fn rpc_error<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::from_rpc(e.to_string())
}

/// [`OrderStorePort`] over HTTP JSON-RPC. View calls are issued with
/// `from = caller`; transactions are signed locally and filled by the
/// provider.
#[derive(Clone, Debug)]
pub struct RpcOrderStore {
    url: Url,
}

impl RpcOrderStore {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let url = url
            .parse()
            .map_err(|e| ChainError::Rpc(format!("invalid RPC url {url}: {e}")))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        provider.get_chain_id().await.map_err(rpc_error)
    }
}

fn to_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    let orders_created = receipt
        .inner
        .logs()
        .iter()
        .filter_map(|log| log.log_decode::<IShieldSwap::OrderCreated>().ok())
        .map(|log| OrderCreatedLog {
            contract: log.inner.address,
            user: log.inner.data.user,
            timestamp: log.inner.data.timestamp.saturating_to(),
        })
        .collect();
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.unwrap_or_default(),
        block_hash: receipt.block_hash.unwrap_or_default(),
        status: receipt.status(),
        orders_created,
    }
}

impl OrderStorePort for RpcOrderStore {
    async fn get_my_order(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<EncryptedOrder, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        let order = IShieldSwap::new(contract, &provider)
            .getMyOrder()
            .from(caller)
            .call()
            .await
            .map_err(rpc_error)?;
        Ok(EncryptedOrder::new(order.fromAmount, order.toAmount))
    }

    async fn has_order(&self, contract: Address, caller: Address) -> Result<bool, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        IShieldSwap::new(contract, &provider)
            .hasOrder()
            .from(caller)
            .call()
            .await
            .map_err(rpc_error)
    }

    async fn get_my_order_timestamp(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<u64, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        let timestamp = IShieldSwap::new(contract, &provider)
            .getMyOrderTimestamp()
            .from(caller)
            .call()
            .await
            .map_err(rpc_error)?;
        Ok(timestamp.saturating_to())
    }

    async fn protocol_id(&self, contract: Address) -> Result<u64, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        let id = IShieldSwap::new(contract, &provider)
            .protocolId()
            .call()
            .await
            .map_err(rpc_error)?;
        Ok(id.saturating_to())
    }

    async fn send_set_order(
        &self,
        contract: Address,
        signer: &PrivateKeySigner,
        order: EncryptedOrder,
        input_proof: Bytes,
    ) -> Result<TxHash, ChainError> {
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.url.clone());
        let pending = IShieldSwap::new(contract, &provider)
            .setOrder(order.from_amount, order.to_amount, input_proof)
            .send()
            .await
            .map_err(rpc_error)?;
        debug!("setOrder sent as {}", pending.tx_hash());
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.url.clone());
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            if let Some(receipt) = provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(rpc_error)?
            {
                return Ok(to_receipt(&receipt));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        Err(ChainError::TxNotFound(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(RpcOrderStore::new("not a url").is_err());
        let store = RpcOrderStore::new("http://127.0.0.1:8545").unwrap();
        assert_eq!(store.url().port(), Some(8545));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_failure() {
        // Nothing listens on the discard port.
        let store = RpcOrderStore::new("http://127.0.0.1:9").unwrap();
        let err = store
            .get_my_order(Address::repeat_byte(1), Address::repeat_byte(2))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err:?}");
    }
}
