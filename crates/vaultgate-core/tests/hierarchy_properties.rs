//! Property-based tests for the key hierarchy wrap operations.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use vaultgate_core::{env::test_utils::MockEnv, hierarchy};
use vaultgate_crypto::MasterKey;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn master_key_wrap_roundtrips(
        seed in any::<u64>(),
        key_bytes in prop::array::uniform32(any::<u8>()),
    ) {
        let env = MockEnv::with_seed(seed);
        let master_key = MasterKey::from_bytes(&key_bytes).unwrap();
        let user_key = hierarchy::make_user_key(&env).unwrap();

        let wrapped = hierarchy::wrap_user_key_with_master_key(&env, &user_key, &master_key);
        prop_assert_eq!(
            hierarchy::unwrap_user_key_with_master_key(&wrapped, &master_key).unwrap(),
            user_key
        );
    }

    #[test]
    fn different_master_key_never_unwraps(
        seed in any::<u64>(),
        a in prop::array::uniform32(any::<u8>()),
        b in prop::array::uniform32(any::<u8>()),
    ) {
        prop_assume!(a != b);
        let env = MockEnv::with_seed(seed);
        let user_key = hierarchy::make_user_key(&env).unwrap();

        let wrapped = hierarchy::wrap_user_key_with_master_key(
            &env,
            &user_key,
            &MasterKey::from_bytes(&a).unwrap(),
        );
        let unwrapped = hierarchy::unwrap_user_key_with_master_key(
            &wrapped,
            &MasterKey::from_bytes(&b).unwrap(),
        );
        prop_assert!(unwrapped.is_err());
    }

    #[test]
    fn any_bit_flip_in_the_wrap_is_rejected(
        seed in any::<u64>(),
        key_bytes in prop::array::uniform32(any::<u8>()),
        byte_index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let env = MockEnv::with_seed(seed);
        let master_key = MasterKey::from_bytes(&key_bytes).unwrap();
        let user_key = hierarchy::make_user_key(&env).unwrap();

        let mut wrapped = hierarchy::wrap_user_key_with_master_key(&env, &user_key, &master_key);
        let index = byte_index.index(wrapped.data.len());
        wrapped.data[index] ^= 1 << bit;

        prop_assert!(hierarchy::unwrap_user_key_with_master_key(&wrapped, &master_key).is_err());
    }
}
