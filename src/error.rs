use std::path::PathBuf;
use bitcoin::consensus::encode::Error as BitcoinEncodeError;
use bitcoin::key::FromWifError as BitcoinKeyError; // WIFデコードエラー用
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("必須キーがパラメータに見つかりません: {0}")]
    MissingSection(String),

    #[error("無効なアドレス ({address}): {reason}")]
    InvalidAddress {
        address: String,
        reason: String,
    },

    #[error("無効なおつりアドレス ({address}): {reason}")]
    InvalidChangeAddress {
        address: String,
        reason: String,
    },

    #[error("資金不足: 利用可能な総額 {available} sats, 要求額 {required} sats")]
    InsufficientFunds {
        available: u64,
        required: u64,
    },

    #[error("入力 {input_index} (txid={tx_hash}) の元トランザクション (input_tx_hash) がありません")]
    MissingPriorTransaction {
        input_index: usize,
        tx_hash: String,
    },

    #[error("入力 {input_index} の元トランザクションが一致しません: 期待値 {expected}, 実際 {actual}")]
    PriorTransactionMismatch {
        input_index: usize,
        expected: String,
        actual: String,
    },

    #[error("ブロードキャストが拒否されました (status {status}): {details}")]
    BroadcastRejected {
        status: u16,
        details: String,
    },

    #[error("無効なネットワークが指定されました: {0}")]
    UnknownNetwork(String),

    #[error("ネットワーク不整合: 指定 ({expected}) vs 秘密鍵 ({actual})")]
    NetworkMismatch {
        expected: String,
        actual: String,
    },

    #[error("秘密鍵の処理エラー: {0}")]
    InvalidKey(String),

    #[error("Bitcoin秘密鍵(WIF)処理エラー: {0}")]
    BitcoinKey(#[from] BitcoinKeyError),

    #[error("チェーンインターフェースが利用できません: {0}")]
    InterfaceUnavailable(String),

    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOMLパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    TomlParse {
        file_path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("TOMLシリアライズエラー: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("16進数デコードエラー: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Bitcoinコンセンサスエンコードエラー: {0}")]
    BitcoinConsensus(#[from] BitcoinEncodeError),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    #[error("内部エラー: {0}")]
    Internal(String),
}

impl AppError {
    /// プロセス終了コード。エラー種別ごとに異なる値を返す。
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::MissingSection(_) => 1,
            AppError::InvalidAddress { .. } => 2,
            AppError::InvalidChangeAddress { .. } => 3,
            AppError::InsufficientFunds { .. } => 4,
            AppError::MissingPriorTransaction { .. } | AppError::PriorTransactionMismatch { .. } => 5,
            AppError::BroadcastRejected { .. } => 6,
            AppError::UnknownNetwork(_) | AppError::InterfaceUnavailable(_) => 7,
            AppError::NetworkMismatch { .. } | AppError::InvalidKey(_) | AppError::BitcoinKey(_) => 8,
            AppError::Io(_) | AppError::TomlParse { .. } | AppError::TomlSerialize(_) => 9,
            AppError::Hex(_) | AppError::BitcoinConsensus(_) | AppError::InputValidation(_) => 10,
            AppError::Http(_) => 11,
            AppError::Internal(_) => 12,
        }
    }
}
