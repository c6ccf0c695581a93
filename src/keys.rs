use std::fmt;
use std::str::FromStr;

use bitcoin::script::{Builder, PushBytesBuf};
use num_bigint::BigUint;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::{Address, PrivateKey, PubkeyHash, Transaction};

use crate::error::AppError;
use crate::sighash::{self, SIGHASH_ALL_FORKID};
use crate::types::Network;

/// シードからの鍵導出 (PBKDF2-HMAC-SHA256) の反復回数
pub const KEY_DERIVATION_ROUNDS: u32 = 100_000;

/// 秘密鍵のテキスト表現
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyFormat {
    Wif,
    Hex,
    Int,
}

impl FromStr for KeyFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wif" => Ok(KeyFormat::Wif),
            "hex" => Ok(KeyFormat::Hex),
            "int" => Ok(KeyFormat::Int),
            other => Err(AppError::InputValidation(format!("無効な鍵フォーマット: {}", other))),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyFormat::Wif => "wif",
            KeyFormat::Hex => "hex",
            KeyFormat::Int => "int",
        };
        f.write_str(name)
    }
}

/// アドレス文字列から公開鍵ハッシュへの変換
pub trait AddressResolver {
    fn public_key_hash(&self, address: &str) -> Result<PubkeyHash, AppError>;
}

/// 鍵操作と入力署名
pub trait KeyProvider {
    /// `input_index` の入力に署名し scriptSig を設定する。`prior_tx` はその入力が使う出力を含むトランザクション。
    fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prior_tx: &Transaction,
        key: &PrivateKey,
    ) -> Result<(), AppError>;

    fn address_for(&self, key: &PrivateKey, network: Network) -> Address;

    fn decode(&self, text: &str, format: KeyFormat, network: Network) -> Result<PrivateKey, AppError>;

    fn encode(&self, key: &PrivateKey, format: KeyFormat) -> String;

    /// シードとノンスから決定的に秘密鍵を導出する
    fn derive(&self, seed: &str, nonce: &str, network: Network) -> Result<PrivateKey, AppError>;
}

/// ネットワークのバージョンバイトを検証する P2PKH アドレスリゾルバ
#[derive(Debug, Clone, Copy)]
pub struct NetworkAddressResolver {
    pub network: Network,
}

impl NetworkAddressResolver {
    pub fn new(network: Network) -> Self {
        NetworkAddressResolver { network }
    }
}

impl AddressResolver for NetworkAddressResolver {
    fn public_key_hash(&self, address: &str) -> Result<PubkeyHash, AppError> {
        let invalid = |reason: String| AppError::InvalidAddress {
            address: address.to_string(),
            reason,
        };
        let parsed = Address::from_str(address)
            .map_err(|e| invalid(e.to_string()))?
            .require_network(self.network.bitcoin_network())
            .map_err(|e| invalid(e.to_string()))?;
        parsed
            .pubkey_hash()
            .ok_or_else(|| invalid("P2PKHアドレスではありません".to_string()))
    }
}

/// libsecp256k1 による KeyProvider
pub struct Secp256k1KeyProvider {
    secp: Secp256k1<All>,
}

impl Secp256k1KeyProvider {
    pub fn new() -> Self {
        Secp256k1KeyProvider { secp: Secp256k1::new() }
    }
}

impl Default for Secp256k1KeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for Secp256k1KeyProvider {
    fn sign_input(
        &self,
        tx: &mut Transaction,
        input_index: usize,
        prior_tx: &Transaction,
        key: &PrivateKey,
    ) -> Result<(), AppError> {
        let out_point = tx
            .input
            .get(input_index)
            .map(|txin| txin.previous_output)
            .ok_or_else(|| AppError::Internal(format!("入力インデックス {} が範囲外です", input_index)))?;

        let prior_txid = prior_tx.compute_txid();
        if prior_txid != out_point.txid {
            return Err(AppError::PriorTransactionMismatch {
                input_index,
                expected: out_point.txid.to_string(),
                actual: prior_txid.to_string(),
            });
        }
        let spent = prior_tx.output.get(out_point.vout as usize).ok_or_else(|| {
            AppError::InputValidation(format!(
                "元トランザクション {} に出力 {} がありません",
                prior_txid, out_point.vout
            ))
        })?;

        let digest = sighash::signature_hash(tx, input_index, &spent.script_pubkey, spent.value)?;
        let message = Message::from_digest(digest);
        let signature = self.secp.sign_ecdsa(&message, &key.inner);

        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL_FORKID as u8);
        let sig_push = PushBytesBuf::try_from(sig_bytes)
            .map_err(|_| AppError::Internal(format!("署名のPushBytes変換失敗 (input {})", input_index)))?;

        let public_key = key.public_key(&self.secp);
        tx.input[input_index].script_sig = Builder::new()
            .push_slice(sig_push)
            .push_key(&public_key)
            .into_script();
        log::debug!("入力 {} の署名適用完了。", input_index);
        Ok(())
    }

    fn address_for(&self, key: &PrivateKey, network: Network) -> Address {
        let public_key = key.public_key(&self.secp);
        Address::p2pkh(public_key.pubkey_hash(), network.key_kind())
    }

    fn decode(&self, text: &str, format: KeyFormat, network: Network) -> Result<PrivateKey, AppError> {
        let key = match format {
            KeyFormat::Wif => PrivateKey::from_wif(text.trim())?,
            KeyFormat::Hex => {
                let bytes = hex::decode(text.trim())?;
                let secret = SecretKey::from_slice(&bytes).map_err(|e| AppError::InvalidKey(e.to_string()))?;
                PrivateKey::new(secret, network.key_kind())
            }
            KeyFormat::Int => {
                let value = BigUint::parse_bytes(text.trim().as_bytes(), 10)
                    .ok_or_else(|| AppError::InvalidKey(format!("10進数ではありません: {}", text.trim())))?;
                let secret = SecretKey::from_slice(&left_pad_32(&value)?)
                    .map_err(|e| AppError::InvalidKey(e.to_string()))?;
                PrivateKey::new(secret, network.key_kind())
            }
        };

        if key.network != network.key_kind() {
            return Err(AppError::NetworkMismatch {
                expected: network.to_string(),
                actual: format!("{:?}", key.network),
            });
        }
        Ok(key)
    }

    fn encode(&self, key: &PrivateKey, format: KeyFormat) -> String {
        let bytes = key.inner.secret_bytes();
        match format {
            KeyFormat::Wif => key.to_wif(),
            KeyFormat::Hex => hex::encode(bytes),
            KeyFormat::Int => BigUint::from_bytes_be(&bytes).to_str_radix(10),
        }
    }

    fn derive(&self, seed: &str, nonce: &str, network: Network) -> Result<PrivateKey, AppError> {
        let mut derived = [0u8; 32];
        pbkdf2_hmac::<Sha256>(seed.as_bytes(), nonce.as_bytes(), KEY_DERIVATION_ROUNDS, &mut derived);
        let secret = SecretKey::from_slice(&derived).map_err(|e| AppError::InvalidKey(e.to_string()))?;
        Ok(PrivateKey::new(secret, network.key_kind()))
    }
}

fn left_pad_32(value: &BigUint) -> Result<[u8; 32], AppError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(AppError::InvalidKey("値が256ビットを超えています".to_string()));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}
