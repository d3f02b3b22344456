//! The recipient mask must be a byte-exact involution pair for any input,
//! since remotes of mismatched versions rely on it round-tripping.

use fleetmon::core::protocol::deobfuscate::{deobfuscate_recipient, obfuscate_recipient};
use proptest::prelude::*;

proptest! {
    #[test]
    fn mask_round_trips_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut buf = data.clone();
        obfuscate_recipient(&mut buf);
        deobfuscate_recipient(&mut buf);
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn unmask_then_mask_is_also_identity(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut buf = data.clone();
        deobfuscate_recipient(&mut buf);
        obfuscate_recipient(&mut buf);
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn mask_is_position_local(
        prefix in proptest::collection::vec(any::<u8>(), 0..64),
        byte in any::<u8>(),
    ) {
        // The mask of a byte depends only on its index, not on the bytes
        // around it.
        let mut with_prefix = prefix.clone();
        with_prefix.push(byte);
        obfuscate_recipient(&mut with_prefix);

        let mut other = vec![0u8; prefix.len()];
        other.push(byte);
        obfuscate_recipient(&mut other);

        prop_assert_eq!(with_prefix.last(), other.last());
    }
}
