//! Debt Calculator
//!
//! 가불(loan) 체크인은 "미리 당겨 쓴 시간" 이고, 일반 체크인이 이를 갚는다.
//!
//! ```text
//! debt = max(0, Σ loan minutes − Σ normal minutes)
//! ```
//!
//! 상환 내역을 따로 저장하지 않는다. 부채는 항상 전체 기록의 합계에서 다시 계산한다.

use serde::Serialize;

use crate::db::LedgerTotals;

/// 현재 부채 (분, 항상 ≥ 0)
pub fn compute_debt(totals: &LedgerTotals) -> i64 {
    (totals.loan_minutes - totals.normal_minutes).max(0)
}

/// 체크인 1건 전후의 부채
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebtChange {
    pub debt_before: i64,
    pub debt_after: i64,
    /// 이번 체크인이 갚은 분 (일반 체크인일 때 min(duration, debt_before))
    pub repaid_minutes: i64,
}

impl DebtChange {
    /// `totals` 는 새 체크인이 반영되기 전의 합계
    pub fn apply(totals: &LedgerTotals, minutes: i32, is_loan: bool) -> Self {
        let debt_before = compute_debt(totals);
        let debt_after = compute_debt(&totals.with_entry(minutes, is_loan));
        let repaid_minutes = if is_loan {
            0
        } else {
            (minutes as i64).min(debt_before)
        };

        Self {
            debt_before,
            debt_after,
            repaid_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(normal: i64, loan: i64) -> LedgerTotals {
        LedgerTotals {
            normal_minutes: normal,
            normal_count: 0,
            loan_minutes: loan,
            loan_count: 0,
        }
    }

    #[test]
    fn test_debt_never_negative() {
        assert_eq!(compute_debt(&totals(0, 0)), 0);
        assert_eq!(compute_debt(&totals(500, 120)), 0);
        assert_eq!(compute_debt(&totals(50, 120)), 70);
    }

    #[test]
    fn test_loan_then_repayments() {
        // loan 120 → debt 120
        let loan = DebtChange::apply(&totals(0, 0), 120, true);
        assert_eq!((loan.debt_before, loan.debt_after, loan.repaid_minutes), (0, 120, 0));

        // normal 50 → debt 70, repaid 50
        let partial = DebtChange::apply(&totals(0, 120), 50, false);
        assert_eq!((partial.debt_after, partial.repaid_minutes), (70, 50));

        // normal 80 → debt 0, repaid 70 (초과분은 상환으로 세지 않음)
        let full = DebtChange::apply(&totals(50, 120), 80, false);
        assert_eq!((full.debt_before, full.debt_after, full.repaid_minutes), (70, 0, 70));
    }

    #[test]
    fn test_no_repayment_without_debt() {
        let change = DebtChange::apply(&totals(100, 0), 30, false);
        assert_eq!((change.debt_before, change.debt_after, change.repaid_minutes), (0, 0, 0));
    }

    #[test]
    fn test_debt_stays_non_negative_over_mixed_sequence() {
        // (minutes, is_loan)
        let sequence = [
            (120, true),
            (50, false),
            (10_080, true),
            (1, false),
            (10_080, false),
            (200, false),
            (30, true),
            (300, true),
            (15, false),
            (1, true),
            (10_080, false),
        ];

        let mut running = totals(0, 0);
        for (step, &(minutes, is_loan)) in sequence.iter().enumerate() {
            let change = DebtChange::apply(&running, minutes, is_loan);
            running = running.with_entry(minutes, is_loan);

            let debt = compute_debt(&running);
            assert!(debt >= 0, "step {}: debt {}", step, debt);
            assert_eq!(change.debt_after, debt, "step {}", step);
            assert!(change.repaid_minutes >= 0 && change.repaid_minutes <= change.debt_before);
            if is_loan {
                assert!(change.debt_after >= change.debt_before, "step {}", step);
            } else {
                assert!(change.debt_after <= change.debt_before, "step {}", step);
            }
        }
        assert_eq!(compute_debt(&running), 0);
    }

    #[test]
    fn test_banked_minutes_absorb_a_loan() {
        // 일반 300분 누적 후 가불 100분 → 부채 0 유지
        let change = DebtChange::apply(&totals(300, 0), 100, true);
        assert_eq!(change.debt_after, 0);
    }
}
