//! Split calculator
//!
//! Partitions collected yield into a fixed bucket (equal shares) and a voted
//! bucket (shares proportional to weighted votes). All arithmetic is exact
//! integer math:
//!
//! - `fixed = total / divisor`, `voted = total - fixed`
//! - `fixed_share[i] = fixed / n`, index 0 also takes `fixed % n`
//! - `voted_share[i] = weight[i] * voted / total_weighted`, the floor
//!   remainder goes to the first recipient with a non-zero share
//!
//! so both buckets are conserved exactly.

use crate::errors::{Result, TreasuryError};
use serde::{Deserialize, Serialize};
use yieldsplit_types::{checked_sum, mul_div_u128, Amount};

/// Computed allocation for one distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub total_yield: Amount,
    pub fixed_amount: Amount,
    pub voted_amount: Amount,
    pub total_weighted_votes: Amount,
    pub fixed_shares: Vec<Amount>,
    pub voted_shares: Vec<Amount>,
}

impl SplitPlan {
    /// Fixed plus voted share for recipient `index`
    pub fn payout(&self, index: usize) -> Option<Amount> {
        let fixed = self.fixed_shares.get(index)?;
        let voted = self.voted_shares.get(index)?;
        fixed.checked_add(*voted)
    }

    /// Sum of every payout
    pub fn total_paid(&self) -> Option<Amount> {
        checked_sum(&self.fixed_shares)?.checked_add(checked_sum(&self.voted_shares)?)
    }
}

/// Split calculator bound to a validated divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCalculator {
    divisor: u128,
}

impl SplitCalculator {
    /// Zero is rejected: a divisor of 0 has no defined fixed bucket.
    pub fn new(divisor: u128) -> Result<Self> {
        if divisor == 0 {
            return Err(TreasuryError::InvalidDivisor(divisor));
        }
        Ok(Self { divisor })
    }

    pub fn divisor(&self) -> u128 {
        self.divisor
    }

    /// `(fixed, voted)` with `fixed + voted == total_yield`
    pub fn split_total(&self, total_yield: Amount) -> (Amount, Amount) {
        let fixed = total_yield / self.divisor;
        (fixed, total_yield - fixed)
    }

    /// Full allocation of `total_yield` across `weights.len()` recipients.
    ///
    /// Fails with `InsufficientYieldPrecision` when the smallest non-zero
    /// weight would be paid nothing from the voted bucket.
    pub fn plan(
        &self,
        total_yield: Amount,
        weights: &[Amount],
        total_weighted_votes: Amount,
    ) -> Result<SplitPlan> {
        let (fixed_amount, voted_amount) = self.split_total(total_yield);
        check_precision_floor(voted_amount, weights, total_weighted_votes)?;
        let voted_shares = split_voted(voted_amount, weights, total_weighted_votes)?;
        let fixed_shares = split_fixed(fixed_amount, weights.len())?;

        Ok(SplitPlan {
            total_yield,
            fixed_amount,
            voted_amount,
            total_weighted_votes,
            fixed_shares,
            voted_shares,
        })
    }
}

/// Proportional split of `voted_amount`.
///
/// A zero denominator (or no weighted slot at all) yields all-zero shares;
/// callers treat that as "no votes" and never distribute.
pub fn split_voted(
    voted_amount: Amount,
    weights: &[Amount],
    total_weighted_votes: Amount,
) -> Result<Vec<Amount>> {
    if total_weighted_votes == 0 || weights.iter().all(|w| *w == 0) {
        return Ok(vec![0; weights.len()]);
    }

    let mut shares = weights
        .iter()
        .map(|w| {
            mul_div_u128(*w, voted_amount, total_weighted_votes)
                .ok_or(TreasuryError::ArithmeticOverflow("voted share"))
        })
        .collect::<Result<Vec<Amount>>>()?;

    let distributed =
        checked_sum(&shares).ok_or(TreasuryError::ArithmeticOverflow("voted share sum"))?;
    // weights summing above the denominator would over-allocate
    let remainder = voted_amount
        .checked_sub(distributed)
        .ok_or(TreasuryError::ArithmeticOverflow("voted remainder"))?;

    if remainder > 0 {
        let target = shares
            .iter()
            .position(|s| *s > 0)
            .or_else(|| weights.iter().position(|w| *w > 0))
            .unwrap_or(0);
        shares[target] += remainder;
    }

    Ok(shares)
}

/// Equal split of `fixed_amount`; index 0 absorbs the remainder
pub fn split_fixed(fixed_amount: Amount, recipient_count: usize) -> Result<Vec<Amount>> {
    if recipient_count == 0 {
        return Err(TreasuryError::NoRecipients);
    }
    let count = recipient_count as u128;
    let base = fixed_amount / count;
    let remainder = fixed_amount % count;

    let mut shares = vec![base; recipient_count];
    shares[0] += remainder;
    Ok(shares)
}

/// Reject a voted split where some voted-for recipient would receive zero
pub fn check_precision_floor(
    voted_amount: Amount,
    weights: &[Amount],
    total_weighted_votes: Amount,
) -> Result<()> {
    if voted_amount == 0 || total_weighted_votes == 0 {
        return Ok(());
    }
    let Some(min_weight) = weights.iter().copied().filter(|w| *w > 0).min() else {
        return Ok(());
    };
    let smallest = mul_div_u128(min_weight, voted_amount, total_weighted_votes)
        .ok_or(TreasuryError::ArithmeticOverflow("precision floor"))?;
    if smallest == 0 {
        return Err(TreasuryError::InsufficientYieldPrecision {
            min_weight,
            voted_amount,
            total_weighted: total_weighted_votes,
        });
    }
    Ok(())
}
