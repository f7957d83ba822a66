//! Compile-time tunables, generated by `build.rs` from `slabconfig.toml`
//! (or the file named by `SLAB_MULTI_CONFIG`), falling back to the spec's
//! defaults when no config file is present.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

/// Largest size class, derived from `SMALLEST_CACHE << (NUM_CACHES - 1)`.
pub const LARGEST_CACHE: usize = SMALLEST_CACHE << (NUM_CACHES - 1);

const _: () = assert!(LARGEST_CACHE <= SLAB_SIZE, "largest cache must fit in one slab");
const _: () = assert!(SUPERBLOCK_SIZE % SLAB_SIZE == 0, "superblock must divide evenly into slabs");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(SUPERBLOCK_SIZE, 1 << 20);
        assert_eq!(SLAB_SIZE, 1 << 14);
        assert_eq!(NUM_CACHES, 8);
        assert_eq!(SMALLEST_CACHE, 64);
        assert_eq!(LARGEST_CACHE, 8192);
        assert_eq!(INIT_SUPERBLOCKS, 4);
        assert_eq!(FREE_THRESHOLD_PERCENT, 25);
        assert_eq!(MIN_SLABS, 1);
    }
}
