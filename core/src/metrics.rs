//! Metric calculator: pure derivation of the dashboard figures.
//!
//! Inputs are the two totals the aggregator sums for a key and the
//! student count. Nothing here touches the store.

use crate::types::Money;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Every field of a derived metric row except its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub operational_total: Money,
    pub payroll_total: Money,
    pub grand_total: Money,
    pub student_count: u32,
    pub cost_per_student: Money,
    pub pct_payroll: Decimal,
    pub pct_operational: Decimal,
    pub efficiency_score: Decimal,
}

/// Round to cents, half away from zero.
pub fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn compute(
    operational_total: Money,
    payroll_total: Money,
    student_count: u32,
    baseline: Money,
) -> CostBreakdown {
    let operational_total = cents(operational_total);
    let payroll_total = cents(payroll_total);
    let grand_total = operational_total + payroll_total;

    let cost_per_student = if student_count > 0 {
        cents(grand_total / Decimal::from(student_count))
    } else {
        Decimal::ZERO
    };

    // pct_operational is the complement so the pair always sums to 100.
    let (pct_payroll, pct_operational) = if grand_total > Decimal::ZERO {
        let payroll_share = cents(payroll_total / grand_total * HUNDRED);
        (payroll_share, HUNDRED - payroll_share)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    CostBreakdown {
        operational_total,
        payroll_total,
        grand_total,
        student_count,
        cost_per_student,
        pct_payroll,
        pct_operational,
        efficiency_score: efficiency_score(cost_per_student, baseline),
    }
}

/// 100 at or below the baseline, then `baseline / cost × 100`, never negative.
///
/// Truncated (not rounded) to cents: a cost one cent above the baseline
/// must score below 100.
pub fn efficiency_score(cost_per_student: Money, baseline: Money) -> Decimal {
    if cost_per_student <= baseline {
        return HUNDRED;
    }
    let score = (baseline / cost_per_student * HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero);
    score.clamp(Decimal::ZERO, HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn ten_students_at_baseline_score_full_marks() {
        let m = compute(d("1000.00"), d("4000.00"), 10, d("500.00"));
        assert_eq!(m.grand_total, d("5000.00"));
        assert_eq!(m.cost_per_student, d("500.00"));
        assert_eq!(m.pct_payroll, d("80"));
        assert_eq!(m.pct_operational, d("20"));
        assert_eq!(m.efficiency_score, d("100"));
    }

    #[test]
    fn one_cent_over_baseline_is_not_full_marks() {
        let score = efficiency_score(d("500.01"), d("500.00"));
        assert!(score < HUNDRED, "score {score} should be below 100");
        assert_eq!(score, d("99.99"));
    }

    #[test]
    fn thirds_still_sum_to_one_hundred() {
        let m = compute(d("200.00"), d("100.00"), 3, d("500.00"));
        assert_eq!(m.pct_payroll, d("33.33"));
        assert_eq!(m.pct_operational, d("66.67"));
        assert_eq!(m.pct_payroll + m.pct_operational, HUNDRED);
    }
}
