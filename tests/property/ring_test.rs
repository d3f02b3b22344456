//! Counter ring invariants: deltas are never negative, sum to the total
//! growth over any boundary schedule, and a rollover costs exactly one
//! zero-delta period.

use fleetmon::core::status::{CounterRing, RingSlot};
use proptest::prelude::*;

proptest! {
    #[test]
    fn deltas_are_nonnegative_and_sum_to_total_growth(
        increments in proptest::collection::vec(0u64..10_000, 1..50),
        boundaries in proptest::collection::vec(any::<bool>(), 1..50),
    ) {
        let mut ring = CounterRing::default();
        ring.seed();

        let first = ring.current();
        let mut delta_sum = 0u64;
        let mut value = first;

        for (increment, boundary) in increments.iter().zip(boundaries.iter().cycle()) {
            value += increment;
            ring.set_current(value);
            if *boundary {
                let (delta, rolled) = ring.take_delta(RingSlot::Hour);
                prop_assert!(!rolled);
                delta_sum += delta;
            }
        }
        let (tail, rolled) = ring.take_delta(RingSlot::Hour);
        prop_assert!(!rolled);
        delta_sum += tail;

        prop_assert_eq!(delta_sum, value - first);
    }

    #[test]
    fn rollover_costs_exactly_one_zero_period(
        before in 1_000u64..1_000_000,
        after in 0u64..1_000,
        growth in 0u64..10_000,
    ) {
        let mut ring = CounterRing::default();
        ring.set_current(before);
        ring.seed();

        // The remote restarts: its counter falls below the baseline.
        ring.set_current(after);
        let (delta, rolled) = ring.take_delta(RingSlot::Hour);
        prop_assert!(rolled);
        prop_assert_eq!(delta, 0);

        // The very next period counts from the re-seeded baseline.
        ring.set_current(after + growth);
        let (delta, rolled) = ring.take_delta(RingSlot::Hour);
        prop_assert!(!rolled);
        prop_assert_eq!(delta, growth);
    }

    #[test]
    fn slots_rebase_independently(
        value in 0u64..1_000_000,
        growth in 0u64..1_000_000,
    ) {
        let mut ring = CounterRing::default();
        ring.set_current(value);
        ring.seed();
        ring.set_current(value + growth);

        let (hour, _) = ring.take_delta(RingSlot::Hour);
        let (day, _) = ring.take_delta(RingSlot::Day);
        let (year, _) = ring.take_delta(RingSlot::Year);
        prop_assert_eq!(hour, growth);
        prop_assert_eq!(day, growth);
        prop_assert_eq!(year, growth);
    }
}
