//! Parser plugin contract (SPEC_FULL.md §4.4): a pair of traits mapping a
//! chromosome's gene forest to and from a target's native byte format.
pub mod chunked;

use crate::chromosome::Chromosome;
use crate::error::CampaignError;
use rand::RngCore;
use std::path::Path;

/// Parses a file on disk into the root genes of a fresh chromosome. Takes a
/// type-erased RNG (rather than a generic `R: Rng`) so the trait stays
/// object-safe for `resolve`'s `Box<dyn Deserializer>`.
pub trait Deserializer {
    fn deserialize(&self, path: &Path, rng: &mut dyn RngCore) -> Result<Chromosome, CampaignError>;
}

/// Serializes a chromosome's gene forest into the bytes fed to the target.
pub trait Serializer {
    fn serialize(&self, chromosome: &Chromosome) -> Vec<u8>;
}

/// Resolves the `Parser` configuration key to a concrete (deserializer,
/// serializer) pair. This crate ships one plugin, `chunked`, grounded on the
/// reference's chunk-based image format plugin (SPEC_FULL.md §4.4
/// Supplement).
pub fn resolve(name: &str) -> Result<(Box<dyn Deserializer>, Box<dyn Serializer>), CampaignError> {
    match name {
        "chunked" => Ok((
            Box::new(chunked::ChunkedDeserializer),
            Box::new(chunked::ChunkedSerializer),
        )),
        other => Err(CampaignError::Configuration(format!(
            "unknown parser plugin: {other}"
        ))),
    }
}
