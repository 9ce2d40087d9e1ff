//! Canonical units and integer helpers for yield allocation.
//!
//! ## Units
//! - Amounts are raw token units held in `u128` (no decimals implied)
//! - Time is measured in logical ticks (e.g. block height), never wall-clock
//! - NO floating point anywhere in allocation math

// =============================================================================
// CANONICAL UNITS
// =============================================================================

/// Opaque 32-byte identity (voter, recipient, custody account)
pub type Identity = [u8; 32];

/// Token amount in the smallest unit
pub type Amount = u128;

/// Logical time unit used for cycle timing
pub type Tick = u64;

/// Monotonic cycle counter, starting at 1
pub type CycleNumber = u64;

/// Default scaling constant applied to `power * points` (1e18)
pub const DEFAULT_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Denominator for basis-point allocations (10000 = 100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default per-recipient point ceiling
pub const DEFAULT_MAX_POINTS: u32 = BPS_DENOMINATOR;

/// Default maximum number of signed votes accepted in one batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Multiply then divide using u128 without silent wrap-around.
/// Returns None if the divisor is zero or the product overflows.
#[inline]
pub fn mul_div_u128(n: u128, mul: u128, div: u128) -> Option<u128> {
    if div == 0 {
        return None;
    }
    n.checked_mul(mul).map(|product| product / div)
}

/// Sum a slice of amounts, returning None on overflow.
#[inline]
pub fn checked_sum(values: &[Amount]) -> Option<Amount> {
    values
        .iter()
        .try_fold(0u128, |acc, value| acc.checked_add(*value))
}
