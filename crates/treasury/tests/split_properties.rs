use proptest::prelude::*;
use yieldsplit_treasury::{split_fixed, SplitCalculator};
use yieldsplit_types::Amount;

fn weights() -> impl Strategy<Value = Vec<Amount>> {
    prop::collection::vec(0u128..1_000_000, 1..12)
}

proptest! {
    #[test]
    fn fixed_and_voted_add_up_to_total(
        total in 0u128..u64::MAX as u128,
        divisor in 1u128..1_000,
    ) {
        let calc = SplitCalculator::new(divisor).unwrap();
        let (fixed, voted) = calc.split_total(total);
        prop_assert_eq!(fixed + voted, total);
        prop_assert_eq!(fixed, total / divisor);
    }
}

proptest! {
    #[test]
    fn every_unit_is_paid(
        total in 1u128..1_000_000_000_000,
        divisor in 1u128..20,
        weights in weights(),
    ) {
        let total_weighted: Amount = weights.iter().sum();
        prop_assume!(total_weighted > 0);

        let calc = SplitCalculator::new(divisor).unwrap();
        // the precision floor may legitimately reject tiny buckets
        if let Ok(plan) = calc.plan(total, &weights, total_weighted) {
            prop_assert_eq!(plan.fixed_shares.iter().sum::<Amount>(), plan.fixed_amount);
            prop_assert_eq!(plan.voted_shares.iter().sum::<Amount>(), plan.voted_amount);
            prop_assert_eq!(plan.total_paid(), Some(total));
            for (weight, share) in weights.iter().zip(&plan.voted_shares) {
                if *weight > 0 {
                    prop_assert!(*share > 0);
                } else {
                    prop_assert_eq!(*share, 0);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn fixed_remainder_goes_to_first_recipient(
        fixed in 0u128..1_000_000,
        count in 1usize..50,
    ) {
        let shares = split_fixed(fixed, count).unwrap();
        let base = fixed / count as u128;
        prop_assert_eq!(shares[0], base + fixed % count as u128);
        prop_assert!(shares[1..].iter().all(|s| *s == base));
    }
}

proptest! {
    #[test]
    fn voted_remainder_goes_to_first_paid_recipient(
        voted in 1u128..1_000_000,
        weights in weights(),
    ) {
        let total_weighted: Amount = weights.iter().sum();
        prop_assume!(total_weighted > 0);

        let shares = yieldsplit_treasury::split_voted(voted, &weights, total_weighted).unwrap();
        let floors: Vec<Amount> = weights
            .iter()
            .map(|w| w * voted / total_weighted)
            .collect();
        let remainder = voted - floors.iter().sum::<Amount>();
        let target = floors
            .iter()
            .position(|s| *s > 0)
            .or_else(|| weights.iter().position(|w| *w > 0))
            .unwrap();

        for (i, (share, floor)) in shares.iter().zip(&floors).enumerate() {
            let expected = if i == target { floor + remainder } else { *floor };
            prop_assert_eq!(*share, expected);
        }
    }
}
