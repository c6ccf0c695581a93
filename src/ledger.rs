use std::fmt;

use crate::error::AppError;

/// これ以下のおつりは出力を作らず手数料に含める
pub const DUST_THRESHOLD_SATS: u64 = 300;

/// 構築中の入出力・手数料の集計
#[derive(Debug, Clone, Default)]
pub struct AmountLedger {
    total_in: u64,
    total_out: u64,
    fee: u64,
}

/// おつり計算の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// おつり出力として支払う金額。ダスト以下または作成しない場合は None
    pub change_output: Option<u64>,
    pub report: AmountsReport,
}

/// 監査用の金額レポート。`total_in == total_out + fee + change` が常に成り立つ。
/// 出力にしなかったおつりは `fee` に含まれる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountsReport {
    pub total_in: u64,
    pub total_out: u64,
    pub fee: u64,
    pub change: u64,
}

impl AmountLedger {
    pub fn new(fee: u64) -> Self {
        AmountLedger { total_in: 0, total_out: 0, fee }
    }

    pub fn add_input(&mut self, amount: u64) -> Result<(), AppError> {
        self.total_in = checked_sum(self.total_in, amount, "入力")?;
        Ok(())
    }

    pub fn add_output(&mut self, amount: u64) -> Result<(), AppError> {
        self.total_out = checked_sum(self.total_out, amount, "出力")?;
        Ok(())
    }

    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// 入力総額から出力と手数料を引いた残り。不足していれば InsufficientFunds。
    pub fn surplus(&self) -> Result<u64, AppError> {
        let required = checked_sum(self.total_out, self.fee, "出力と手数料")?;
        if self.total_in < required {
            return Err(AppError::InsufficientFunds {
                available: self.total_in,
                required,
            });
        }
        Ok(self.total_in - required)
    }

    /// おつりを確定する。ダスト閾値以下のおつりは手数料に吸収される。
    pub fn settle(&self, create_change: bool) -> Result<Settlement, AppError> {
        let surplus = self.surplus()?;

        let change_output = if create_change && surplus > DUST_THRESHOLD_SATS {
            Some(surplus)
        } else {
            if surplus > 0 {
                log::warn!("おつり {} sats は出力にせず手数料に含めます。", surplus);
            }
            None
        };

        let change = change_output.unwrap_or(0);
        Ok(Settlement {
            change_output,
            report: AmountsReport {
                total_in: self.total_in,
                total_out: self.total_out,
                fee: self.total_in - self.total_out - change,
                change,
            },
        })
    }
}

fn checked_sum(total: u64, amount: u64, what: &str) -> Result<u64, AppError> {
    total
        .checked_add(amount)
        .ok_or_else(|| AppError::InputValidation(format!("{}の合計が上限を超えています: {} + {}", what, total, amount)))
}

impl fmt::Display for AmountsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "金額:")?;
        writeln!(f, "\t入力合計: \t{}", self.total_in)?;
        writeln!(f, "\t出力合計: \t{}", self.total_out)?;
        writeln!(f, "\t手数料: \t{}", self.fee)?;
        write!(f, "\tおつり: \t{}", self.change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(inputs: &[u64], outputs: &[u64], fee: u64) -> AmountLedger {
        let mut ledger = AmountLedger::new(fee);
        inputs.iter().for_each(|v| ledger.add_input(*v).unwrap());
        outputs.iter().for_each(|v| ledger.add_output(*v).unwrap());
        ledger
    }

    #[test]
    fn change_above_dust_becomes_an_output() {
        let settlement = ledger(&[1000, 2100], &[1000], 300).settle(true).unwrap();
        assert_eq!(settlement.change_output, Some(1800));
        assert_eq!(
            settlement.report,
            AmountsReport { total_in: 3100, total_out: 1000, fee: 300, change: 1800 }
        );
    }

    #[test]
    fn dust_change_is_absorbed_into_fee() {
        let settlement = ledger(&[1600], &[1000], 300).settle(true).unwrap();
        assert_eq!(settlement.change_output, None);
        assert_eq!(settlement.report.change, 0);
        assert_eq!(settlement.report.fee, 600);
    }

    #[test]
    fn change_equal_to_threshold_is_still_dust() {
        let settlement = ledger(&[1600 + 300], &[1300], 300).settle(true).unwrap();
        assert_eq!(settlement.change_output, None);
    }

    #[test]
    fn no_change_output_when_disabled() {
        let settlement = ledger(&[5000], &[1000], 300).settle(false).unwrap();
        assert_eq!(settlement.change_output, None);
        assert_eq!(settlement.report.fee, 4000);
    }

    #[test]
    fn conservation_holds_for_every_policy() {
        for (inputs, outputs, fee) in [(vec![3100], vec![1000], 300), (vec![1301], vec![1000], 1), (vec![700], vec![400], 300)] {
            for create_change in [true, false] {
                let r = ledger(&inputs, &outputs, fee).settle(create_change).unwrap().report;
                assert_eq!(r.total_in, r.total_out + r.fee + r.change);
            }
        }
    }

    #[test]
    fn insufficient_inputs_fail() {
        let err = ledger(&[1000], &[900], 300).settle(true).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 1000, required: 1200 }));
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let mut ledger = AmountLedger::new(300);
        ledger.add_input(i64::MAX as u64).unwrap();
        ledger.add_input(i64::MAX as u64).unwrap();
        let err = ledger.add_input(i64::MAX as u64).unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
        assert_eq!(ledger.total_in(), u64::MAX - 1);

        let mut ledger = AmountLedger::new(u64::MAX);
        ledger.add_output(1).unwrap();
        assert!(matches!(ledger.surplus(), Err(AppError::InputValidation(_))));
    }

    #[test]
    fn report_lists_all_amounts() {
        let text = ledger(&[1000], &[99], 300).settle(true).unwrap().report.to_string();
        assert!(text.contains("1000"));
        assert!(text.contains("99"));
        assert!(text.contains("601"));
    }
}
