//! Alloy-backed chain client
//!
//! One HTTP provider with the recommended fillers (nonce, gas, chain id) and
//! a local private-key wallet. Submission returns the pending transaction
//! builder; inclusion waits for its receipt.

use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use mint_core::abi::IERC20;
use mint_core::{ChainClient, ChainError, ConfigError, Confirmation, Connector, Credentials, PayableCall};

pub struct EvmClient {
    provider: DynProvider,
    account: Address,
}

impl EvmClient {
    pub fn connect(rpc_url: &Url, credentials: &Credentials) -> Result<Self, ConfigError> {
        let signer = PrivateKeySigner::from_bytes(credentials.secret())
            .map_err(|e| ConfigError::InvalidCredentials(e.to_string()))?;
        let account = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone())
            .erased();

        debug!("Connected {} to {}", account, rpc_url);
        Ok(Self { provider, account })
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    type Pending = PendingTransactionBuilder<Ethereum>;

    fn account(&self) -> Address {
        self.account
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|e| ChainError::Query(format!("native balance: {}", e)))
    }

    async fn token_balance(&self, token: Address, account: Address) -> Result<U256, ChainError> {
        IERC20::new(token, &self.provider)
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| ChainError::Query(format!("balanceOf on {}: {}", token, e)))
    }

    async fn submit_payable_call(&self, call: PayableCall) -> Result<Self::Pending, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(self.account)
            .with_to(call.contract)
            .with_input(call.calldata)
            .with_value(call.value);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        debug!("Submitted {}", pending.tx_hash());
        Ok(pending)
    }

    async fn await_inclusion(&self, pending: Self::Pending) -> Result<Confirmation, ChainError> {
        let tx_hash = *pending.tx_hash();
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| ChainError::Confirmation(format!("{}: {}", tx_hash, e)))?;

        if !receipt.status() {
            return Err(ChainError::Confirmation(format!("{} reverted", tx_hash)));
        }
        let block_height = receipt
            .block_number
            .ok_or_else(|| ChainError::Confirmation(format!("{}: receipt has no block number", tx_hash)))?;

        Ok(Confirmation { block_height })
    }
}

/// Builds an `EvmClient` per run against a fixed node endpoint
pub struct EvmConnector {
    rpc_url: Url,
}

impl EvmConnector {
    pub fn new(rpc_url: &str) -> Result<Self, ConfigError> {
        let rpc_url = Url::parse(rpc_url.trim())
            .map_err(|_| ConfigError::InvalidEndpoint(rpc_url.to_string()))?;
        Ok(Self { rpc_url })
    }
}

impl Connector for EvmConnector {
    type Client = EvmClient;

    fn connect(&self, credentials: &Credentials) -> Result<EvmClient, ConfigError> {
        EvmClient::connect(&self.rpc_url, credentials)
    }
}
