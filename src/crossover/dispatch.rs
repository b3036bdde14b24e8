//! Name-keyed registry over the recombinator set, same pattern as
//! `mutate::dispatch`.
use super::*;
use crate::error::CampaignError;

#[derive(Clone, Copy, Debug)]
pub enum Implementations {
    Null,
    ParentChildrenSwap,
    ShuffleSiblings,
    RandomGeneSwap,
    RemoveGene,
    DuplicateGene,
    RandomGeneInsert,
    SimilarGeneInsert,
    AdditiveSimilarGeneCrossOver,
    SimilarGeneSwap,
}

pub const NAMES: &[&str] = &[
    "Null",
    "ParentChildrenSwap",
    "ShuffleSiblings",
    "RandomGeneSwap",
    "RemoveGene",
    "DuplicateGene",
    "RandomGeneInsert",
    "SimilarGeneInsert",
    "AdditiveSimilarGeneCrossOver",
    "SimilarGeneSwap",
];

#[derive(Debug)]
pub struct Dispatch {
    pub name: &'static str,
    pub implementation: Implementations,
}

impl Dispatch {
    pub fn resolve(name: &str) -> Result<Self, CampaignError> {
        let (name, implementation) = match name {
            "Null" => ("Null", Implementations::Null),
            "ParentChildrenSwap" => ("ParentChildrenSwap", Implementations::ParentChildrenSwap),
            "ShuffleSiblings" => ("ShuffleSiblings", Implementations::ShuffleSiblings),
            "RandomGeneSwap" => ("RandomGeneSwap", Implementations::RandomGeneSwap),
            "RemoveGene" => ("RemoveGene", Implementations::RemoveGene),
            "DuplicateGene" => ("DuplicateGene", Implementations::DuplicateGene),
            "RandomGeneInsert" => ("RandomGeneInsert", Implementations::RandomGeneInsert),
            "SimilarGeneInsert" => ("SimilarGeneInsert", Implementations::SimilarGeneInsert),
            "AdditiveSimilarGeneCrossOver" => (
                "AdditiveSimilarGeneCrossOver",
                Implementations::AdditiveSimilarGeneCrossOver,
            ),
            "SimilarGeneSwap" => ("SimilarGeneSwap", Implementations::SimilarGeneSwap),
            other => {
                return Err(CampaignError::Configuration(format!(
                    "unknown recombinator '{other}'"
                )))
            }
        };
        Ok(Self { name, implementation })
    }
}

impl Recombine for Dispatch {
    fn recombine(
        &self,
        chr1: &mut Chromosome,
        chr2: &mut Chromosome,
        mutator: &dyn Mutate,
        rng: &mut dyn RngCore,
    ) {
        match self.implementation {
            Implementations::Null => Null.recombine(chr1, chr2, mutator, rng),
            Implementations::ParentChildrenSwap => ParentChildrenSwap.recombine(chr1, chr2, mutator, rng),
            Implementations::ShuffleSiblings => ShuffleSiblings.recombine(chr1, chr2, mutator, rng),
            Implementations::RandomGeneSwap => RandomGeneSwap.recombine(chr1, chr2, mutator, rng),
            Implementations::RemoveGene => RemoveGene.recombine(chr1, chr2, mutator, rng),
            Implementations::DuplicateGene => DuplicateGene.recombine(chr1, chr2, mutator, rng),
            Implementations::RandomGeneInsert => RandomGeneInsert.recombine(chr1, chr2, mutator, rng),
            Implementations::SimilarGeneInsert => SimilarGeneInsert.recombine(chr1, chr2, mutator, rng),
            Implementations::AdditiveSimilarGeneCrossOver => {
                AdditiveSimilarGeneCrossOver.recombine(chr1, chr2, mutator, rng)
            }
            Implementations::SimilarGeneSwap => SimilarGeneSwap.recombine(chr1, chr2, mutator, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_every_listed_name() {
        for name in NAMES {
            assert!(Dispatch::resolve(name).is_ok(), "failed to resolve {name}");
        }
    }

    #[test]
    fn resolve_rejects_unknown_name() {
        assert!(Dispatch::resolve("NotARecombinator").is_err());
    }
}
