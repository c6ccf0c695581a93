use std::path::Path;

use bitcoin::{
    absolute::LockTime, consensus::encode, transaction::Version, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, Txid,
    Witness,
};
use std::str::FromStr;

use crate::{
    config::{FeePolicy, InputRecord, TransactionParameterSet, SENDER_ADDRESS_PLACEHOLDER},
    error::AppError,
    keys::{AddressResolver, KeyFormat, KeyProvider},
    ledger::{AmountLedger, AmountsReport},
    output::{OutputEncoder, PaymentOutput, TxOutputSpec},
    types::Network,
};

/// 署名前のトランザクションと金額レポート
#[derive(Debug, Clone)]
pub struct CompiledTransaction {
    pub tx: Transaction,
    pub report: AmountsReport,
}

/// 署名済みトランザクションの16進数と金額レポート
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub tx_hex: String,
    pub report: AmountsReport,
}

/// 検証済みのセクション
struct Sections<'p> {
    outputs: Vec<TxOutputSpec>,
    inputs: Vec<InputRecord<'p>>,
    fee: u64,
    create_change: bool,
    change_address: Option<&'p str>,
}

pub struct TransactionCompiler<'a> {
    resolver: &'a dyn AddressResolver,
    keys: &'a dyn KeyProvider,
    network: Network,
    data_dir: &'a Path,
}

impl<'a> TransactionCompiler<'a> {
    pub fn new(
        resolver: &'a dyn AddressResolver,
        keys: &'a dyn KeyProvider,
        network: Network,
        data_dir: &'a Path,
    ) -> Self {
        TransactionCompiler { resolver, keys, network, data_dir }
    }

    /// コンパイルと署名をまとめて行い、シリアライズ済みの16進数を返す
    pub fn build(&self, params: &TransactionParameterSet) -> Result<BuiltTransaction, AppError> {
        let compiled = self.compile(params)?;
        let signed = self.sign(compiled.tx, params)?;
        let tx_hex = encode::serialize_hex(&signed);
        log::info!("署名済みトランザクションの生成に成功しました。");
        Ok(BuiltTransaction {
            tx_hex,
            report: compiled.report,
        })
    }

    /// 署名前のトランザクションを組み立てる。パラメータは変更しない。
    pub fn compile(&self, params: &TransactionParameterSet) -> Result<CompiledTransaction, AppError> {
        log::info!("トランザクション構築処理を開始します。");
        // スクリプト構築の前に全セクションを検証する
        let sections = validate_sections(params)?;
        let encoder = OutputEncoder::new(self.resolver, self.data_dir);
        let mut ledger = AmountLedger::new(sections.fee);

        let mut outputs = Vec::with_capacity(sections.outputs.len() + 1);
        for spec in &sections.outputs {
            outputs.push(encoder.encode(spec)?);
            ledger.add_output(spec.amount())?;
            log::debug!("出力追加: {:?}", spec);
        }

        let mut inputs = Vec::with_capacity(sections.inputs.len());
        for record in &sections.inputs {
            let txid = Txid::from_str(record.tx_hash)
                .map_err(|e| AppError::InputValidation(format!("無効なTXID形式 ({}): {}", record.tx_hash, e)))?;
            inputs.push(TxIn {
                previous_output: OutPoint::new(txid, record.tx_pos),
                script_sig: ScriptBuf::new(), // 署名前は空
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
            ledger.add_input(record.amount)?;
            log::debug!("入力追加: txid={}, pos={}, amount={}", record.tx_hash, record.tx_pos, record.amount);
        }

        // 不足があればここで中断し、署名には進まない
        let surplus = ledger.surplus()?;
        if sections.create_change && surplus > 0 {
            check_change_address(sections.change_address)?;
        }
        let settlement = ledger.settle(sections.create_change)?;
        if let (Some(change), Some(address)) = (settlement.change_output, sections.change_address) {
            let change_out = encoder
                .encode_payment(&PaymentOutput { address: address.to_string(), amount: change })
                .map_err(|e| match e {
                    AppError::InvalidAddress { address, reason } => AppError::InvalidChangeAddress { address, reason },
                    other => other,
                })?;
            log::debug!("おつり発生: {} sats, おつりアドレス: {}", change, address);
            outputs.push(change_out);
        }
        log::info!("{}", settlement.report);

        let tx = Transaction {
            version: Version(1),
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs,
        };
        Ok(CompiledTransaction {
            tx,
            report: settlement.report,
        })
    }

    /// 入力を先頭から順に署名する。失敗した場合は途中のトランザクションを返さない。
    pub fn sign(&self, mut tx: Transaction, params: &TransactionParameterSet) -> Result<Transaction, AppError> {
        log::info!("トランザクション署名処理を開始します。");
        let inputs = params
            .transactioninput
            .as_deref()
            .ok_or_else(|| AppError::MissingSection("transactioninput".to_string()))?;
        if inputs.len() != tx.input.len() {
            return Err(AppError::Internal(format!(
                "入力数が一致しません: パラメータ {}, トランザクション {}",
                inputs.len(),
                tx.input.len()
            )));
        }

        for (input_index, entry) in inputs.iter().enumerate() {
            let record = entry.record()?;
            let raw = record.prior_tx.ok_or_else(|| AppError::MissingPriorTransaction {
                input_index,
                tx_hash: record.tx_hash.to_string(),
            })?;
            let prior_tx: Transaction = encode::deserialize(&hex::decode(raw.trim())?)?;
            let key = self.keys.decode(record.signing_key, KeyFormat::Wif, self.network)?;
            self.keys.sign_input(&mut tx, input_index, &prior_tx, &key)?;
        }
        log::info!("全ての入力の署名が完了しました。");
        Ok(tx)
    }
}

fn validate_sections(params: &TransactionParameterSet) -> Result<Sections<'_>, AppError> {
    let missing = |name: &str| AppError::MissingSection(name.to_string());

    let outputs = params.transactionoutput.as_deref().ok_or_else(|| missing("transactionoutput"))?;
    let inputs = params.transactioninput.as_deref().ok_or_else(|| missing("transactioninput"))?;
    let tx_info: &FeePolicy = params.tx_info.as_ref().ok_or_else(|| missing("tx_info"))?;
    let fee = tx_info.tx_default_fee.ok_or_else(|| missing("tx_default_fee"))?;
    let create_change = tx_info.create_change_output.ok_or_else(|| missing("create_change_output"))?;

    // レコード内の必須キーもここで確認する
    let outputs = outputs.iter().map(TxOutputSpec::from_entry).collect::<Result<Vec<_>, _>>()?;
    let inputs = inputs.iter().map(|entry| entry.record()).collect::<Result<Vec<_>, _>>()?;

    Ok(Sections {
        outputs,
        inputs,
        fee,
        create_change,
        change_address: tx_info.change_output_public_key.as_deref(),
    })
}

fn check_change_address(change_address: Option<&str>) -> Result<(), AppError> {
    match change_address {
        None => Err(AppError::MissingSection("change_output_public_key".to_string())),
        Some(SENDER_ADDRESS_PLACEHOLDER) => Err(AppError::InvalidChangeAddress {
            address: SENDER_ADDRESS_PLACEHOLDER.to_string(),
            reason: "実在するアドレスではありません".to_string(),
        }),
        Some(_) => Ok(()),
    }
}
