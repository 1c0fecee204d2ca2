pub mod cluster_builder;
pub mod dominance;
pub mod entrance_discovery;
pub mod executor;
pub mod inter_connector;
pub mod intra_connector;

pub use dominance::Quality;
pub use executor::{BuildStats, Stage};
