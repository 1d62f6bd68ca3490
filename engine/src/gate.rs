//! Capacity gate.
//!
//! Decides how many queued items may be admitted in one cycle given the
//! configured limit and the occupancy measured at the start of the cycle.

/// Number of items that may be admitted this cycle.
///
/// `max(0, min(limit - occupancy, queue_len))`. A result of zero marks an
/// exhaustion cycle.
pub fn admit(queue_len: usize, limit: u64, occupancy: u64) -> usize {
    let room = limit.saturating_sub(occupancy);
    // Room beyond usize::MAX exceeds any queue.
    let room = usize::try_from(room).unwrap_or(usize::MAX);
    room.min(queue_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_admits_remaining_room() {
        assert_eq!(admit(5, 10, 8), 2);
    }

    #[test]
    fn test_admits_whole_queue_when_room_is_larger() {
        assert_eq!(admit(3, 1000, 0), 3);
    }

    #[test]
    fn test_full_or_over_limit_admits_nothing() {
        assert_eq!(admit(5, 10, 10), 0);
        assert_eq!(admit(5, 10, 25), 0);
    }

    #[test]
    fn test_empty_queue_admits_nothing() {
        assert_eq!(admit(0, 10, 0), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn admission_never_exceeds_room_or_queue(
            queue_len in 0usize..10_000,
            limit in 0u64..10_000,
            occupancy in 0u64..20_000,
        ) {
            let admitted = admit(queue_len, limit, occupancy);
            prop_assert!(admitted <= queue_len);
            prop_assert!(admitted as u64 <= limit.saturating_sub(occupancy));
        }

        #[test]
        fn admission_is_maximal(
            queue_len in 0usize..10_000,
            limit in 0u64..10_000,
            occupancy in 0u64..20_000,
        ) {
            let admitted = admit(queue_len, limit, occupancy);
            let room = limit.saturating_sub(occupancy);
            prop_assert!(admitted == queue_len || admitted as u64 == room);
        }
    }
}
