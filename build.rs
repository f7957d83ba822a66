//! Generates compile-time tunables from an optional TOML config file.
//!
//! Mirrors the teacher's size-class code generation: when
//! `SLAB_MULTI_CONFIG` (or `slabconfig.toml` in the crate root) is present,
//! its values override the defaults baked in here; otherwise the defaults
//! from spec section 3/6 are used untouched.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

#[derive(Deserialize, Default)]
struct ConfigSection {
    superblock_size: Option<usize>,
    slab_size: Option<usize>,
    num_caches: Option<usize>,
    smallest_cache: Option<usize>,
    init_superblocks: Option<usize>,
    free_threshold_percent: Option<usize>,
    min_slabs: Option<usize>,
    shared_mutex_slots: Option<usize>,
}

struct Resolved {
    superblock_size: usize,
    slab_size: usize,
    num_caches: usize,
    smallest_cache: usize,
    init_superblocks: usize,
    free_threshold_percent: usize,
    min_slabs: usize,
    shared_mutex_slots: usize,
}

fn resolve(cfg: &ConfigSection) -> Resolved {
    let superblock_size = cfg.superblock_size.unwrap_or(1 << 20);
    let slab_size = cfg.slab_size.unwrap_or(1 << 14);
    let num_caches = cfg.num_caches.unwrap_or(8);
    let smallest_cache = cfg.smallest_cache.unwrap_or(64);
    let init_superblocks = cfg.init_superblocks.unwrap_or(4);
    let free_threshold_percent = cfg.free_threshold_percent.unwrap_or(25);
    let min_slabs = cfg.min_slabs.unwrap_or(1);
    let shared_mutex_slots = cfg.shared_mutex_slots.unwrap_or(32);

    assert!(
        superblock_size.is_power_of_two(),
        "superblock_size must be a power of 2"
    );
    assert!(slab_size.is_power_of_two(), "slab_size must be a power of 2");
    assert!(
        superblock_size % slab_size == 0,
        "superblock_size must be a multiple of slab_size"
    );
    assert!(num_caches >= 1, "num_caches must be >= 1");
    assert!(
        smallest_cache.is_power_of_two(),
        "smallest_cache must be a power of 2"
    );
    let largest_cache = smallest_cache << (num_caches - 1);
    assert!(
        largest_cache <= slab_size,
        "largest_cache ({largest_cache}) must be <= slab_size ({slab_size})"
    );
    assert!(init_superblocks >= 1, "init_superblocks must be >= 1");
    assert!(
        free_threshold_percent <= 100,
        "free_threshold_percent must be <= 100"
    );
    assert!(min_slabs >= 1, "min_slabs must be >= 1");
    assert!(shared_mutex_slots >= 1, "shared_mutex_slots must be >= 1");

    Resolved {
        superblock_size,
        slab_size,
        num_caches,
        smallest_cache,
        init_superblocks,
        free_threshold_percent,
        min_slabs,
        shared_mutex_slots,
    }
}

fn generate(cfg: &Resolved, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const SUPERBLOCK_SIZE: usize = {};\n\
         pub const SLAB_SIZE: usize = {};\n\
         pub const NUM_CACHES: usize = {};\n\
         pub const SMALLEST_CACHE: usize = {};\n\
         pub const INIT_SUPERBLOCKS: usize = {};\n\
         pub const FREE_THRESHOLD_PERCENT: usize = {};\n\
         pub const MIN_SLABS: usize = {};\n\
         pub const SHARED_MUTEX_SLOTS: usize = {};\n",
        cfg.superblock_size,
        cfg.slab_size,
        cfg.num_caches,
        cfg.smallest_cache,
        cfg.init_superblocks,
        cfg.free_threshold_percent,
        cfg.min_slabs,
        cfg.shared_mutex_slots,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/slabconfig.toml", manifest_dir)
}

fn main() {
    println!("cargo:rerun-if-env-changed=SLAB_MULTI_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();
    let config_path = env::var("SLAB_MULTI_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);

    let config: Config = match fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content).expect("failed to parse TOML config"),
        Err(_) => Config::default(),
    };

    let resolved = resolve(&config.config);
    generate(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
