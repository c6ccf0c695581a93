use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::AppError;
use crate::params::Sender;
use crate::types::Network;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 使用するネットワーク ("mainnet", "testnet", "regtest", "mock")
    #[clap(short, long, global = true, default_value = "testnet")]
    pub network: String,

    /// 相対パス (パラメータファイル、出力ファイル、op_returnデータファイル) の基点ディレクトリ
    #[clap(long, global = true, env = "DATA_PATH", default_value = ".")]
    pub data_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// シードとノンスから秘密鍵を導出し、WIF とアドレスを表示する
    Key(KeyArgs),
    /// パラメータファイルからトランザクションを構築する、またはパラメータファイルを生成する
    Transaction(TransactionArgs),
    /// 送金元の全UTXOをまとめるパラメータファイルを生成する
    Consolidate(ConsolidateArgs),
    /// 秘密鍵(WIF)に対応するアドレスを表示する
    Address {
        #[clap(long)]
        private_key: String,
    },
    /// 秘密鍵の表現形式を変換する
    Pkeyformat {
        #[clap(long)]
        private_key: String,
        /// 変換元 ("wif", "hex", "int")
        #[clap(long, default_value = "wif")]
        from: String,
        /// 変換先 ("wif", "hex", "int")
        #[clap(long, default_value = "hex")]
        to: String,
    },
    /// アドレスの残高を表示する
    Balance {
        #[clap(long)]
        address: String,
    },
    /// アドレスのUTXO一覧を表示する
    Utxo {
        #[clap(long)]
        address: String,
    },
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    #[clap(long, requires = "nonce")]
    pub seed: Option<String>,

    #[clap(long, requires = "seed")]
    pub nonce: Option<String>,

    /// `[key_input]` セクション (seed, nonce) を持つTOMLファイル
    #[clap(long, conflicts_with_all = ["seed", "genparam"])]
    pub paramfile: Option<PathBuf>,

    /// 鍵を導出せず、シードとノンスをパラメータファイルとして書き出す
    #[clap(long)]
    pub genparam: bool,

    /// 出力先 (省略時は標準出力)
    #[clap(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TransactionArgs {
    /// トランザクション情報を記述したTOMLファイルへのパス
    #[clap(long, conflicts_with = "genparam")]
    pub paramfile: Option<PathBuf>,

    /// パラメータファイルを生成する
    #[clap(long)]
    pub genparam: bool,

    /// 構築したトランザクションをブロードキャストするか ("true", "false")
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub broadcast: bool,

    /// 生成したパラメータの保存先 (省略時は標準出力)
    #[clap(short, long)]
    pub out: Option<PathBuf>,

    #[clap(long)]
    pub amount: Option<u64>,

    #[clap(flatten)]
    pub sender: SenderArgs,

    #[clap(long)]
    pub recipient: Option<String>,

    #[clap(long)]
    pub change: Option<String>,

    #[clap(long, default_value_t = 300)]
    pub fee: u64,
}

#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    #[clap(flatten)]
    pub sender: SenderArgs,

    #[clap(long, default_value_t = 300)]
    pub fee: u64,

    #[clap(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SenderArgs {
    /// 送金元アドレス
    #[clap(long, conflicts_with = "sender_key")]
    pub sender: Option<String>,

    /// 送金元の秘密鍵 (WIF)
    #[clap(long)]
    pub sender_key: Option<String>,
}

impl SenderArgs {
    pub fn sender(&self) -> Option<Sender> {
        match (&self.sender_key, &self.sender) {
            (Some(key), _) => Some(Sender::Key(key.clone())),
            (None, Some(address)) => Some(Sender::Address(address.clone())),
            (None, None) => None,
        }
    }
}

pub fn parse_network(network_str: &str) -> Result<Network, AppError> {
    network_str.parse()
}
