use std::fmt;
use std::str::FromStr;

use bitcoin::{Network as BitcoinNetwork, NetworkKind};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 対応ネットワーク。文字列からの変換は `FromStr` のみで行う。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Mock,
}

impl Network {
    /// 鍵とアドレスのバージョンバイト種別。regtest/mock はテストネット互換。
    pub fn key_kind(self) -> NetworkKind {
        match self {
            Network::Mainnet => NetworkKind::Main,
            Network::Testnet | Network::Regtest | Network::Mock => NetworkKind::Test,
        }
    }

    /// アドレス検証に使うネットワーク
    pub fn bitcoin_network(self) -> BitcoinNetwork {
        match self {
            Network::Mainnet => BitcoinNetwork::Bitcoin,
            Network::Testnet | Network::Mock => BitcoinNetwork::Testnet,
            Network::Regtest => BitcoinNetwork::Regtest,
        }
    }

    /// WhatsOnChain API のネットワーク名。regtest と mock には対応するエンドポイントがない。
    pub fn woc_path(self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("main"),
            Network::Testnet => Some("test"),
            Network::Regtest | Network::Mock => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Mock => "mock",
        }
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "mock" => Ok(Network::Mock),
            other => Err(AppError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// チェーンインターフェースが返す未使用出力
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    #[serde(default)]
    pub height: Option<u32>,
}

/// アドレス残高。未承認分は負になりうる。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

impl Balance {
    pub fn total(&self) -> i64 {
        self.confirmed.saturating_add(self.unconfirmed)
    }
}
