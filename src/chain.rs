use std::cell::RefCell;
use std::collections::HashMap;

use bitcoin::consensus::encode;
use bitcoin::Transaction;

use crate::config::{InterfaceConfig, InterfaceType};
use crate::error::AppError;
use crate::types::{Balance, Network, UnspentOutput};

const WOC_BASE_URL: &str = "https://api.whatsonchain.com/v1/bsv";

/// チェーンインターフェースからのブロードキャスト応答 (ボディはそのまま保持する)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub status: u16,
    pub body: String,
}

/// ブロードキャスト成功時の受領情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub body: String,
}

pub trait ChainInterface {
    fn get_balance(&self, address: &str) -> Result<Balance, AppError>;
    fn get_utxo(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError>;
    /// 元トランザクションの16進数
    fn get_raw_transaction(&self, tx_hash: &str) -> Result<String, AppError>;
    fn broadcast(&self, tx_hex: &str) -> Result<BroadcastResponse, AppError>;
}

/// インターフェース設定からチェーンインターフェースを作る
pub fn connect(config: &InterfaceConfig) -> Result<Box<dyn ChainInterface>, AppError> {
    let network = config.network()?;
    match config.interface_type {
        InterfaceType::Mock => Ok(Box::new(MockInterface::new())),
        InterfaceType::Woc => Ok(Box::new(WhatsOnChainClient::new(network)?)),
    }
}

/// 署名済みトランザクションを送信する。200 以外は応答ボディをそのまま返してエラーにする。
pub fn broadcast(tx_hex: &str, chain: &dyn ChainInterface) -> Result<BroadcastReceipt, AppError> {
    log::info!("トランザクションをブロードキャストします。");
    let response = chain.broadcast(tx_hex)?;
    if response.status != 200 {
        log::error!("ブロードキャストが拒否されました: status={}", response.status);
        return Err(AppError::BroadcastRejected {
            status: response.status,
            details: response.body,
        });
    }
    log::info!("ブロードキャスト成功: {}", response.body);
    Ok(BroadcastReceipt { body: response.body })
}

/// テスト・オフライン用のメモリ上のチェーン
#[derive(Debug, Default)]
pub struct MockInterface {
    balances: HashMap<String, Balance>,
    utxos: HashMap<String, Vec<UnspentOutput>>,
    raw_transactions: HashMap<String, String>,
    broadcasted: RefCell<Vec<String>>,
}

impl MockInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, address: &str, balance: Balance) -> Self {
        self.balances.insert(address.to_string(), balance);
        self
    }

    pub fn with_utxos(mut self, address: &str, utxos: Vec<UnspentOutput>) -> Self {
        self.utxos.insert(address.to_string(), utxos);
        self
    }

    pub fn with_raw_transaction(mut self, tx_hash: &str, raw_hex: &str) -> Self {
        self.raw_transactions.insert(tx_hash.to_string(), raw_hex.to_string());
        self
    }

    pub fn broadcasted(&self) -> Vec<String> {
        self.broadcasted.borrow().clone()
    }
}

impl ChainInterface for MockInterface {
    fn get_balance(&self, address: &str) -> Result<Balance, AppError> {
        Ok(self.balances.get(address).copied().unwrap_or_default())
    }

    fn get_utxo(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError> {
        Ok(self.utxos.get(address).cloned().unwrap_or_default())
    }

    fn get_raw_transaction(&self, tx_hash: &str) -> Result<String, AppError> {
        self.raw_transactions
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| AppError::InputValidation(format!("トランザクションが見つかりません: {}", tx_hash)))
    }

    fn broadcast(&self, tx_hex: &str) -> Result<BroadcastResponse, AppError> {
        let decoded = hex::decode(tx_hex)
            .ok()
            .and_then(|bytes| encode::deserialize::<Transaction>(&bytes).ok());
        let response = match decoded {
            Some(tx) => {
                self.broadcasted.borrow_mut().push(tx_hex.to_string());
                BroadcastResponse { status: 200, body: tx.compute_txid().to_string() }
            }
            None => BroadcastResponse {
                status: 400,
                body: "invalid transaction hex".to_string(),
            },
        };
        Ok(response)
    }
}

/// WhatsOnChain REST API クライアント
pub struct WhatsOnChainClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl WhatsOnChainClient {
    pub fn new(network: Network) -> Result<Self, AppError> {
        let path = network.woc_path().ok_or_else(|| {
            AppError::InterfaceUnavailable(format!("WhatsOnChain は {} に対応していません", network))
        })?;
        Ok(WhatsOnChainClient {
            client: reqwest::blocking::Client::new(),
            base_url: format!("{}/{}", WOC_BASE_URL, path),
        })
    }

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response, AppError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        Ok(self.client.get(&url).send()?.error_for_status()?)
    }
}

impl ChainInterface for WhatsOnChainClient {
    fn get_balance(&self, address: &str) -> Result<Balance, AppError> {
        Ok(self.get(&format!("/address/{}/balance", address))?.json()?)
    }

    fn get_utxo(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError> {
        Ok(self.get(&format!("/address/{}/unspent", address))?.json()?)
    }

    fn get_raw_transaction(&self, tx_hash: &str) -> Result<String, AppError> {
        Ok(self.get(&format!("/tx/{}/hex", tx_hash))?.text()?.trim().to_string())
    }

    fn broadcast(&self, tx_hex: &str) -> Result<BroadcastResponse, AppError> {
        let url = format!("{}/tx/raw", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "txhex": tx_hex }))
            .send()?;
        Ok(BroadcastResponse {
            status: response.status().as_u16(),
            body: response.text()?,
        })
    }
}
