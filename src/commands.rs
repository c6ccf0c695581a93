use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::chain::{self, BroadcastReceipt, ChainInterface};
use crate::cli::{CliArgs, Command, ConsolidateArgs, KeyArgs, TransactionArgs, parse_network};
use crate::config::{
    resolve_path, InterfaceConfig, KeyInfo, KeyInfoFile, KeyInput, KeyParameterSet, TransactionParameterSet,
};
use crate::error::AppError;
use crate::keys::{KeyFormat, KeyProvider, NetworkAddressResolver, Secp256k1KeyProvider};
use crate::params::{self, PaymentRequest};
use crate::transaction::{BuiltTransaction, TransactionCompiler};
use crate::types::Network;

const RULE: &str = "------------------------------------------------------------------------------------";

/// サブコマンド共通の設定
pub struct Context {
    pub network: Network,
    pub data_dir: PathBuf,
    pub keys: Secp256k1KeyProvider,
}

impl Context {
    pub fn new(network: Network, data_dir: PathBuf) -> Self {
        Context {
            network,
            data_dir,
            keys: Secp256k1KeyProvider::new(),
        }
    }

    fn chain(&self) -> Result<Box<dyn ChainInterface>, AppError> {
        chain::connect(&InterfaceConfig::for_network(self.network))
    }
}

pub fn run(args: CliArgs, out: &mut dyn Write) -> Result<(), AppError> {
    let network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {}", network);
    let ctx = Context::new(network, args.data_dir);

    match args.command {
        Command::Key(k) => run_key(&k, &ctx, out),
        Command::Transaction(t) => run_transaction(&t, &ctx, out),
        Command::Consolidate(c) => run_consolidate(&c, &ctx, out),
        Command::Address { private_key } => {
            let key = ctx.keys.decode(&private_key, KeyFormat::Wif, ctx.network)?;
            let address = ctx.keys.address_for(&key, ctx.network);
            writeln!(out, "\n{}\nアドレス \t-> {}\n{}", RULE, address, RULE)?;
            Ok(())
        }
        Command::Pkeyformat { private_key, from, to } => {
            let from: KeyFormat = from.parse()?;
            let to: KeyFormat = to.parse()?;
            let key = ctx.keys.decode(&private_key, from, ctx.network)?;
            writeln!(out, "\n{}\n秘密鍵 ({}) \t-> {}\n{}", RULE, to, ctx.keys.encode(&key, to), RULE)?;
            Ok(())
        }
        Command::Balance { address } => {
            let balance = ctx.chain()?.get_balance(&address)?;
            writeln!(
                out,
                "\n{}\nアドレス: \t{}\n残高: \t\t承認済み {}, 未承認 {}\n{}",
                RULE, address, balance.confirmed, balance.unconfirmed, RULE
            )?;
            Ok(())
        }
        Command::Utxo { address } => {
            let utxos = ctx.chain()?.get_utxo(&address)?;
            writeln!(out, "\n{}\nアドレス: {}", RULE, address)?;
            for utxo in utxos {
                writeln!(
                    out,
                    "  tx_hash={} tx_pos={} value={} height={:?}",
                    utxo.tx_hash, utxo.tx_pos, utxo.value, utxo.height
                )?;
            }
            writeln!(out, "{}", RULE)?;
            Ok(())
        }
    }
}

fn run_key(args: &KeyArgs, ctx: &Context, out: &mut dyn Write) -> Result<(), AppError> {
    let input = match (&args.paramfile, &args.seed, &args.nonce) {
        (Some(paramfile), _, _) => KeyParameterSet::load(&resolve_path(&ctx.data_dir, paramfile))?
            .key_input
            .ok_or_else(|| AppError::MissingSection("key_input".to_string()))?,
        (None, Some(seed), Some(nonce)) => KeyInput {
            seed: seed.clone(),
            nonce: nonce.clone(),
        },
        _ => {
            return Err(AppError::InputValidation(
                "--seed と --nonce、または --paramfile が必要です".to_string(),
            ));
        }
    };

    if args.genparam {
        let params = KeyParameterSet { key_input: Some(input) };
        return write_text(&params.to_toml_string()?, args.out.as_deref(), ctx, out);
    }

    log::info!("シードとノンスから鍵を導出します。ネットワーク={}", ctx.network);
    let key = ctx.keys.derive(&input.seed, &input.nonce, ctx.network)?;
    let info = KeyInfoFile {
        key_info: KeyInfo {
            private_key: ctx.keys.encode(&key, KeyFormat::Wif),
            bitcoin_address: ctx.keys.address_for(&key, ctx.network).to_string(),
        },
    };
    write_text(&info.to_toml_string()?, args.out.as_deref(), ctx, out)
}

fn run_transaction(args: &TransactionArgs, ctx: &Context, out: &mut dyn Write) -> Result<(), AppError> {
    if let Some(paramfile) = &args.paramfile {
        transaction_from_file(paramfile, args.broadcast, ctx, out)?;
        return Ok(());
    }
    if !args.genparam {
        return Err(AppError::InputValidation(
            "パラメータファイル (--paramfile) または --genparam が必要です".to_string(),
        ));
    }

    let request = PaymentRequest {
        amount: args.amount,
        sender: args.sender.sender(),
        recipient: args.recipient.clone(),
        change: args.change.clone(),
        fee: args.fee,
    };
    let chain = ctx.chain()?;
    let params = params::generate_parameters(&request, ctx.network, chain.as_ref(), &ctx.keys)?;
    write_parameters(&params, args.out.as_deref(), ctx, out)
}

fn run_consolidate(args: &ConsolidateArgs, ctx: &Context, out: &mut dyn Write) -> Result<(), AppError> {
    let sender = args
        .sender
        .sender()
        .ok_or_else(|| AppError::InputValidation("--sender または --sender-key が必要です".to_string()))?;
    let chain = ctx.chain()?;
    let params = params::consolidate_parameters(&sender, args.fee, ctx.network, chain.as_ref(), &ctx.keys)?;
    write_parameters(&params, args.out.as_deref(), ctx, out)
}

/// パラメータファイルからトランザクションを構築し、指定があればブロードキャストする
pub fn transaction_from_file(
    paramfile: &Path,
    broadcast: bool,
    ctx: &Context,
    out: &mut dyn Write,
) -> Result<Option<BroadcastReceipt>, AppError> {
    let path = resolve_path(&ctx.data_dir, paramfile);
    let params = TransactionParameterSet::load(&path)?;
    let network = build_network(&params, ctx)?;
    log::info!("トランザクションを構築します。入力ファイル={:?}, ネットワーク={}", path, network);

    let built = build_on(&params, network, ctx)?;
    writeln!(out, "\n{}\n{}\n{}\n", RULE, built.report, RULE)?;
    writeln!(out, "シリアライズ済みトランザクション:\n\n{}", built.tx_hex)?;

    if !broadcast {
        writeln!(out, "\nブロードキャストしません")?;
        return Ok(None);
    }
    writeln!(out, "\nトランザクションをブロードキャストします")?;
    let interface = params
        .interface
        .clone()
        .unwrap_or_else(|| InterfaceConfig::for_network(network));
    let chain = chain::connect(&interface)?;
    let receipt = chain::broadcast(&built.tx_hex, chain.as_ref())?;
    writeln!(out, "{}", receipt.body)?;
    Ok(Some(receipt))
}

/// 構築・検証・ブロードキャストに使うネットワーク。
/// パラメータファイルの interface セクションが `--network` より優先される。
pub fn build_network(params: &TransactionParameterSet, ctx: &Context) -> Result<Network, AppError> {
    let Some(interface) = &params.interface else {
        return Ok(ctx.network);
    };
    let network = interface.network()?;
    if network != ctx.network {
        log::warn!("パラメータファイルのネットワーク {} を使用します (--network {})", network, ctx.network);
    }
    Ok(network)
}

pub fn build(params: &TransactionParameterSet, ctx: &Context) -> Result<BuiltTransaction, AppError> {
    build_on(params, build_network(params, ctx)?, ctx)
}

fn build_on(params: &TransactionParameterSet, network: Network, ctx: &Context) -> Result<BuiltTransaction, AppError> {
    let resolver = NetworkAddressResolver::new(network);
    let compiler = TransactionCompiler::new(&resolver, &ctx.keys, network, &ctx.data_dir);
    compiler.build(params)
}

fn write_parameters(
    params: &TransactionParameterSet,
    target: Option<&Path>,
    ctx: &Context,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    write_text(&params.to_toml_string()?, target, ctx, out)
}

fn write_text(text: &str, target: Option<&Path>, ctx: &Context, out: &mut dyn Write) -> Result<(), AppError> {
    match target {
        Some(file) => {
            let path = resolve_path(&ctx.data_dir, file);
            fs::write(&path, text).map_err(|e| {
                log::error!("出力ファイルへの書き込みに失敗しました: {:?}", path);
                AppError::Io(e)
            })?;
            writeln!(out, "ファイルに書き込みました: {}", path.display())?;
        }
        None => writeln!(out, "\n{}", text)?,
    }
    Ok(())
}
