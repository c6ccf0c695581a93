use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::Network;

/// おつりアドレスが解決されなかった場合にパラメータファイルへ書かれる値
pub const SENDER_ADDRESS_PLACEHOLDER: &str = "<sender address>";
/// 署名鍵が指定されなかった場合にパラメータファイルへ書かれる値
pub const SIGNING_KEY_PLACEHOLDER: &str = "<key for signing>";

/// パラメータファイル (TOML) 全体。各セクションの有無は構築時に検証する。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TransactionParameterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactioninput: Option<Vec<TxInputSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactionoutput: Option<Vec<TxOutputEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<InterfaceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_info: Option<FeePolicy>,
}

/// 入力レコード。必須キーの欠落は構築時に `MissingSection` として報告する。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TxInputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_pos: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_for_signing: Option<String>,
    /// 元トランザクション全体の16進数 (名前に反してハッシュではない)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tx_hash: Option<String>,
}

/// 必須キーを検証済みの入力レコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRecord<'p> {
    pub tx_hash: &'p str,
    pub tx_pos: u32,
    pub amount: u64,
    pub signing_key: &'p str,
    pub prior_tx: Option<&'p str>,
}

impl TxInputSpec {
    pub fn record(&self) -> Result<InputRecord<'_>, AppError> {
        Ok(InputRecord {
            tx_hash: required(self.tx_hash.as_deref(), "tx_hash")?,
            tx_pos: required(self.tx_pos, "tx_pos")?,
            amount: required(self.amount, "amount")?,
            signing_key: required(self.private_key_for_signing.as_deref(), "private_key_for_signing")?,
            prior_tx: self.input_tx_hash.as_deref(),
        })
    }
}

/// 出力レコード。`op_return` で支払いとデータ出力を区別する。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TxOutputEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_return: Option<bool>,
    #[serde(default)]
    pub data_to_encode: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub data_to_encode_file: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// レコード内の必須キー。欠落はセクション欠落と同じ扱い。
pub(crate) fn required<T>(value: Option<T>, key: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::MissingSection(key.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Woc,
    Mock,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub interface_type: InterfaceType,
    pub network_type: String,
}

impl InterfaceConfig {
    pub fn for_network(network: Network) -> Self {
        let interface_type = match network {
            Network::Mock => InterfaceType::Mock,
            _ => InterfaceType::Woc,
        };
        InterfaceConfig {
            interface_type,
            network_type: network.as_str().to_string(),
        }
    }

    pub fn network(&self) -> Result<Network, AppError> {
        self.network_type.parse()
    }
}

/// `tx_info` セクション
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_change_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_output_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_default_fee: Option<u64>,
}

impl TransactionParameterSet {
    pub fn from_toml_str(content: &str, file_path: &Path) -> Result<Self, AppError> {
        parse_toml(content, file_path)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        load_toml(path)
    }

    pub fn to_toml_string(&self) -> Result<String, AppError> {
        Ok(toml::to_string(self)?)
    }
}

/// `key` コマンドのパラメータファイル
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParameterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_input: Option<KeyInput>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub seed: String,
    pub nonce: String,
}

impl KeyParameterSet {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        load_toml(path)
    }

    pub fn to_toml_string(&self) -> Result<String, AppError> {
        Ok(toml::to_string(self)?)
    }
}

/// 導出した鍵の出力形式 (`[key_info]`)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyInfoFile {
    pub key_info: KeyInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub private_key: String,
    pub bitcoin_address: String,
}

impl KeyInfoFile {
    pub fn to_toml_string(&self) -> Result<String, AppError> {
        Ok(toml::to_string(self)?)
    }
}

fn parse_toml<T: DeserializeOwned>(content: &str, file_path: &Path) -> Result<T, AppError> {
    toml::from_str(content).map_err(|e| {
        log::error!("パラメータファイルのパースに失敗しました: {:?}", file_path);
        AppError::TomlParse {
            file_path: file_path.to_path_buf(),
            source: e,
        }
    })
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("パラメータファイルの読み込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    parse_toml(&content, path)
}

/// 相対パスをデータディレクトリ基準で解決する
pub fn resolve_path(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}
