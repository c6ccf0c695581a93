use crate::error::AppError;
use crate::types::UnspentOutput;

/// 渡された順に UTXO を積み上げ、合計が target 以上になった時点で止める。
/// 並べ替えは行わない (既存のパラメータファイルと同じ入力順を再現するため)。
pub fn select(available: &[UnspentOutput], target: u64) -> Result<Vec<UnspentOutput>, AppError> {
    let mut selected = Vec::new();
    let mut sum: u64 = 0;

    for utxo in available {
        if sum >= target {
            break;
        }
        sum = sum
            .checked_add(utxo.value)
            .ok_or_else(|| AppError::InputValidation(format!("UTXOの合計が上限を超えています: {}", utxo.tx_hash)))?;
        selected.push(utxo.clone());
        log::debug!("UTXO選択: txid={}, pos={}, value={}, 累計={}", utxo.tx_hash, utxo.tx_pos, utxo.value, sum);
    }

    if sum < target {
        return Err(AppError::InsufficientFunds {
            available: sum,
            required: target,
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxos(values: &[u64]) -> Vec<UnspentOutput> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| UnspentOutput {
                tx_hash: "ba37f74000558e145f1e1789c642fb69d2384b39211f4943c46de016f791451e".to_string(),
                tx_pos: i as u32,
                value: *v,
                height: Some(1631214),
            })
            .collect()
    }

    #[test]
    fn stops_at_first_covering_prefix() {
        let available = utxos(&[1000, 2100]);
        let selected = select(&available, 1000).unwrap();
        assert_eq!(selected, vec![available[0].clone()]);
    }

    #[test]
    fn keeps_caller_order_instead_of_sorting() {
        let available = utxos(&[100, 5000, 200]);
        let selected = select(&available, 300).unwrap();
        assert_eq!(selected.iter().map(|u| u.value).collect::<Vec<_>>(), vec![100, 5000]);
    }

    #[test]
    fn selected_prefix_is_the_smallest_covering_one() {
        let available = utxos(&[400, 300, 200, 100]);
        for target in 1..=1000 {
            let selected = select(&available, target).unwrap();
            let sum: u64 = selected.iter().map(|u| u.value).sum();
            assert!(sum >= target);
            assert_eq!(selected[..], available[..selected.len()]);
            let without_last: u64 = selected[..selected.len() - 1].iter().map(|u| u.value).sum();
            assert!(without_last < target);
        }
    }

    #[test]
    fn exhausting_the_list_is_insufficient_funds() {
        let err = select(&utxos(&[1000, 2100]), 3101).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 3100, required: 3101 }));
    }

    #[test]
    fn empty_list_cannot_cover_a_positive_target() {
        assert!(matches!(select(&[], 1), Err(AppError::InsufficientFunds { .. })));
    }

    #[test]
    fn zero_target_selects_nothing() {
        assert!(select(&utxos(&[1000]), 0).unwrap().is_empty());
    }
}
