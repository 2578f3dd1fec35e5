//! Reflection data collaborators: an in-memory provider, a reference
//! resolution-shell normalizer and a seeded synthetic dataset generator.

pub mod normalize;
pub mod provider;
pub mod synthetic;

pub use normalize::BinnedNormalizer;
pub use provider::InMemoryProvider;
pub use synthetic::{SyntheticConfig, SyntheticData, generate};
