use feedflow_sequential::key_resolver;
use proptest::prelude::*;

proptest! {
    #[test]
    fn resolved_shards_are_always_in_range(
        key in any::<u64>(),
        shard_count in 1usize..200_000,
    ) {
        let resolver = key_resolver(|key: &u64| *key);
        let shard = resolver(&key, shard_count);
        prop_assert!(shard < shard_count);
    }

    #[test]
    fn resolution_is_deterministic(
        key in any::<String>(),
        shard_count in 1usize..10_000,
    ) {
        let resolver = key_resolver(|key: &String| key.clone());
        prop_assert_eq!(resolver(&key, shard_count), resolver(&key, shard_count));
    }
}
