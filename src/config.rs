use crate::build::Quality;
use crate::map::Capability;
use env_logger::Env;
use std::env;

pub const DEFAULT_CLUSTER_SIZE: u32 = 10;

/// Construction parameters for the abstraction, merged from CLI flags and
/// `AHPA_*` environment defaults (environment wins when set).
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub cluster_size: u32,
    pub quality: Quality,
    /// The valid terrain set; capability classes are its non-empty subsets.
    pub terrains: Capability,
    /// Persist concrete path blobs alongside the graph when saving.
    pub store_paths: bool,
    pub log_level: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            cluster_size: DEFAULT_CLUSTER_SIZE,
            quality: Quality::High,
            terrains: Capability::GROUND | Capability::TREES,
            store_paths: false,
            log_level: None,
        }
    }
}

impl BuildOptions {
    pub fn from_env_defaults() -> Self {
        let mut opts = BuildOptions::default();
        opts.overlay_env();
        opts
    }

    /// Applies any `AHPA_*` variables on top of the current values.
    pub fn overlay_env(&mut self) {
        if let Some(v) = env::var("AHPA_CLUSTER_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            self.cluster_size = v;
        }
        if let Some(v) = env::var("AHPA_QUALITY")
            .ok()
            .and_then(|s| s.parse::<Quality>().ok())
        {
            self.quality = v;
        }
        if let Some(v) = env::var("AHPA_TERRAINS")
            .ok()
            .and_then(|s| Capability::parse_list(&s).ok())
        {
            self.terrains = v;
        }
        if env::var("AHPA_STORE_PATHS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            self.store_paths = true;
        }
        if let Ok(v) = env::var("AHPA_LOG_LEVEL") {
            self.log_level = Some(v);
        }
    }

    /// Starts the logger for this configuration. `RUST_LOG` still wins
    /// over the configured level (which itself already merged
    /// `AHPA_LOG_LEVEL` over the CLI flag); without either, stage logging
    /// comes through at info. Safe to call more than once.
    pub fn init_logging(&self) {
        let default = self.log_level.as_deref().unwrap_or("info");
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default)).try_init();
    }
}
