use std::fs;
use std::path::Path;

use bitcoin::opcodes::all::{OP_PUSHBYTES_0 as OP_FALSE, OP_RETURN};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Amount, ScriptBuf, TxOut};

use crate::config::{required, resolve_path, TxOutputEntry};
use crate::error::AppError;
use crate::keys::AddressResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutput {
    pub address: String,
    pub amount: u64,
}

/// 論理的な出力の記述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutputSpec {
    Payment(PaymentOutput),
    Data {
        payload: String,
        payload_is_file: bool,
        attached_payment: Option<PaymentOutput>,
    },
}

impl TxOutputSpec {
    /// `op_return` フラグでパラメータファイルのレコードを振り分ける
    pub fn from_entry(entry: &TxOutputEntry) -> Result<Self, AppError> {
        if !required(entry.op_return, "op_return")? {
            return Ok(TxOutputSpec::Payment(PaymentOutput {
                address: required(entry.public_key.clone(), "public_key")?,
                amount: required(entry.amount, "amount")?,
            }));
        }

        // データ出力は public_key と amount が両方ない場合のみ支払いなし
        let attached_payment = match (&entry.public_key, entry.amount) {
            (None, None) => None,
            (public_key, amount) => Some(PaymentOutput {
                address: required(public_key.clone(), "public_key")?,
                amount: required(amount, "amount")?,
            }),
        };
        Ok(TxOutputSpec::Data {
            payload: entry.data_to_encode.clone(),
            payload_is_file: entry.data_to_encode_file,
            attached_payment,
        })
    }

    /// 出力総額に加算される金額
    pub fn amount(&self) -> u64 {
        match self {
            TxOutputSpec::Payment(payment) => payment.amount,
            TxOutputSpec::Data { attached_payment, .. } => {
                attached_payment.as_ref().map_or(0, |payment| payment.amount)
            }
        }
    }
}

/// 出力記述をロックスクリプトと金額に変換する
pub struct OutputEncoder<'a> {
    resolver: &'a dyn AddressResolver,
    data_dir: &'a Path,
}

impl<'a> OutputEncoder<'a> {
    pub fn new(resolver: &'a dyn AddressResolver, data_dir: &'a Path) -> Self {
        OutputEncoder { resolver, data_dir }
    }

    pub fn encode(&self, spec: &TxOutputSpec) -> Result<TxOut, AppError> {
        match spec {
            TxOutputSpec::Payment(payment) => self.encode_payment(payment),
            TxOutputSpec::Data { payload, payload_is_file, attached_payment } => {
                let data = self.load_payload(payload, *payload_is_file)?;
                let data_script = data_carrier_script(&data)?;
                match attached_payment {
                    None => Ok(TxOut {
                        value: Amount::ZERO,
                        script_pubkey: data_script,
                    }),
                    Some(payment) => {
                        let paid = self.encode_payment(payment)?;
                        let mut bytes = paid.script_pubkey.into_bytes();
                        bytes.extend_from_slice(data_script.as_bytes());
                        Ok(TxOut {
                            value: paid.value,
                            script_pubkey: ScriptBuf::from_bytes(bytes),
                        })
                    }
                }
            }
        }
    }

    pub fn encode_payment(&self, payment: &PaymentOutput) -> Result<TxOut, AppError> {
        let pkh = self.resolver.public_key_hash(&payment.address)?;
        Ok(TxOut {
            value: Amount::from_sat(payment.amount),
            script_pubkey: ScriptBuf::new_p2pkh(&pkh),
        })
    }

    fn load_payload(&self, payload: &str, is_file: bool) -> Result<Vec<u8>, AppError> {
        if !is_file {
            return Ok(payload.as_bytes().to_vec());
        }
        let path = resolve_path(self.data_dir, Path::new(payload));
        log::debug!("op_returnデータをファイルから読み込みます: {:?}", path);
        fs::read(&path).map_err(|e| {
            log::error!("op_returnデータファイルの読み込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })
    }
}

/// `OP_FALSE OP_RETURN <data>`
pub fn data_carrier_script(data: &[u8]) -> Result<ScriptBuf, AppError> {
    let push = PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| AppError::InputValidation(format!("op_returnデータが大きすぎます ({} bytes)", data.len())))?;
    Ok(Builder::new()
        .push_opcode(OP_FALSE)
        .push_opcode(OP_RETURN)
        .push_slice(push)
        .into_script())
}
