//! BSV のリプレイ保護付き (FORKID) 署名ハッシュ。
//!
//! BIP143 と同じ並びのプリイメージを sha256d したもの。
//! 使用する出力の金額とロックスクリプトにコミットする。

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Amount, ScriptBuf, Transaction};

use crate::error::AppError;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// `input_index` の入力に対する SIGHASH_ALL|FORKID のハッシュ
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &ScriptBuf,
    value: Amount,
) -> Result<[u8; 32], AppError> {
    let preimage = preimage(tx, input_index, script_code, value)?;
    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}

pub fn preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &ScriptBuf,
    value: Amount,
) -> Result<Vec<u8>, AppError> {
    let input = tx.input.get(input_index).ok_or_else(|| {
        AppError::Internal(format!("入力インデックス {} が範囲外です (入力数 {})", input_index, tx.input.len()))
    })?;

    let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
    let mut sequences = Vec::with_capacity(tx.input.len() * 4);
    for txin in &tx.input {
        prevouts.extend(serialize(&txin.previous_output));
        sequences.extend(txin.sequence.0.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for txout in &tx.output {
        outputs.extend(serialize(txout));
    }

    let mut buf = Vec::with_capacity(256);
    buf.extend(tx.version.0.to_le_bytes());
    buf.extend(sha256d::Hash::hash(&prevouts).to_byte_array());
    buf.extend(sha256d::Hash::hash(&sequences).to_byte_array());
    buf.extend(serialize(&input.previous_output));
    buf.extend(serialize(script_code));
    buf.extend(value.to_sat().to_le_bytes());
    buf.extend(input.sequence.0.to_le_bytes());
    buf.extend(sha256d::Hash::hash(&outputs).to_byte_array());
    buf.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    buf.extend(SIGHASH_ALL_FORKID.to_le_bytes());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{absolute::LockTime, transaction::Version, OutPoint, Sequence, TxIn, TxOut, Witness};

    fn sample_tx() -> Transaction {
        Transaction {
            version: Version(1),
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut { value: Amount::from_sat(99), script_pubkey: ScriptBuf::new() }],
        }
    }

    #[test]
    fn preimage_has_fixed_layout() {
        let script = ScriptBuf::from_bytes(vec![0x51]);
        let image = preimage(&sample_tx(), 0, &script, Amount::from_sat(1000)).unwrap();
        // version + 2 hashes + outpoint + script(2) + value + sequence + hash + locktime + type
        assert_eq!(image.len(), 4 + 32 + 32 + 36 + 2 + 8 + 4 + 32 + 4 + 4);
        assert_eq!(&image[image.len() - 4..], &[0x41, 0, 0, 0]);
    }

    #[test]
    fn hash_commits_to_spent_value() {
        let tx = sample_tx();
        let script = ScriptBuf::new();
        let a = signature_hash(&tx, 0, &script, Amount::from_sat(1000)).unwrap();
        let b = signature_hash(&tx, 0, &script, Amount::from_sat(1001)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn out_of_range_input_is_an_error() {
        assert!(signature_hash(&sample_tx(), 1, &ScriptBuf::new(), Amount::ZERO).is_err());
    }
}
