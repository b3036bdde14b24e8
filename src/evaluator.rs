//! Per-chromosome metrics, cross-generation normalization, and weighted
//! fitness (SPEC_FULL.md §4.9). Grounded on
//! `examples/original_source/evaluator.py`.
use crate::blockcache::BlockCache;
use crate::chromosome::Chromosome;
use crate::error::CampaignError;
use crate::population::Population;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

const METRIC_NAMES: &[&str] = &[
    "BasicBlockCoverage",
    "UniversalPathUniqueness",
    "GenerationUniqueness",
    "CodeCommonality",
];

/// Fraction of all known basic blocks (across every image in `cache`) this
/// chromosome's trace hit.
fn basic_block_coverage(chromo: &Chromosome, cache: &FxHashMap<String, BlockCache>) -> f64 {
    let total: u64 = cache.values().map(|c| c.count()).sum();
    if total == 0 {
        return 0.0;
    }
    let unique = chromo.trace.as_ref().map(|t| t.unique_total()).unwrap_or(0);
    unique as f64 / total as f64
}

/// Fraction of this chromosome's hit blocks that no other chromosome, in
/// either generation, also hit. `own_generation` is every other chromosome
/// sharing `chromo`'s generation; `other_generation` is the opposite
/// generation's trace, if one exists yet.
fn universal_path_uniqueness(
    chromo: &Chromosome,
    own_generation: &[Chromosome],
    other_generation: Option<&[Chromosome]>,
) -> f64 {
    let Some(trace) = &chromo.trace else { return 0.0 };
    let unique_total = trace.unique_total();
    if unique_total == 0 {
        return 0.0;
    }

    let mut unique: HashMap<&str, rustc_hash::FxHashSet<u64>> = HashMap::new();
    if let Some(siblings) = other_generation {
        // `other_generation`'s aggregate trace isn't directly available here;
        // subtracting each sibling individually below achieves the same
        // result as subtracting their union, since set difference
        // distributes over a union of subtrahends.
        for img in &trace.images {
            unique.insert(img.as_str(), trace.set_per_image.get(img).cloned().unwrap_or_default());
        }
        for other in siblings {
            if let Some(other_trace) = &other.trace {
                for img in &trace.images {
                    if let Some(hits) = other_trace.set_per_image.get(img) {
                        if let Some(set) = unique.get_mut(img.as_str()) {
                            for b in hits {
                                set.remove(b);
                            }
                        }
                    }
                }
            }
        }
    } else {
        for img in &trace.images {
            unique.insert(img.as_str(), trace.set_per_image.get(img).cloned().unwrap_or_default());
        }
    }

    for other in own_generation {
        if other.uid == chromo.uid {
            continue;
        }
        if let Some(other_trace) = &other.trace {
            for img in &other_trace.images {
                if let Some(set) = unique.get_mut(img.as_str()) {
                    if let Some(hits) = other_trace.set_per_image.get(img) {
                        for b in hits {
                            set.remove(b);
                        }
                    }
                }
            }
        }
    }

    let faults: u64 = unique.values().map(|s| s.len() as u64).sum();
    faults as f64 / unique_total as f64
}

/// Fraction of this chromosome's hit blocks absent from the opposite
/// generation entirely. `1.0` if there is no opposite generation yet (the
/// very first epoch).
fn generation_uniqueness(chromo: &Chromosome, other_generation_trace: Option<&crate::trace::Trace>) -> f64 {
    let Some(trace) = &chromo.trace else { return 0.0 };
    let Some(other) = other_generation_trace else {
        return 1.0;
    };
    let unique_total = trace.unique_total();
    if unique_total == 0 {
        return 0.0;
    }
    let faults: u64 = trace
        .difference_per_image(other)
        .map(|(_, diff)| diff.len() as u64)
        .sum();
    faults as f64 / unique_total as f64
}

/// Ratio of total (with-multiplicity) hits to distinct blocks hit: how
/// "well-trodden" this chromosome's coverage is.
fn code_commonality(chromo: &Chromosome) -> f64 {
    let Some(trace) = &chromo.trace else { return 0.0 };
    let total = trace.total();
    if total == 0 {
        return 0.0;
    }
    total as f64 / trace.unique_total() as f64
}

/// Computes metrics, normalizes across both generations, and assigns
/// fitness (SPEC_FULL.md §4.9).
pub struct Evaluator {
    weights: HashMap<String, f64>,
}

impl Evaluator {
    pub fn new(weights: HashMap<String, f64>) -> Result<Self, CampaignError> {
        for name in weights.keys() {
            if !METRIC_NAMES.contains(&name.as_str()) {
                return Err(CampaignError::Configuration(format!("unknown fitness algorithm '{name}'")));
            }
        }
        Ok(Self { weights })
    }

    fn calculate_metrics(
        &self,
        chromo: &Chromosome,
        own_generation: &[Chromosome],
        other_generation: Option<&[Chromosome]>,
        cache: &FxHashMap<String, BlockCache>,
    ) -> HashMap<String, f64> {
        let other_trace = other_generation
            .map(|siblings| {
                let mut agg = crate::trace::Trace::new();
                for c in siblings {
                    if let Some(t) = &c.trace {
                        agg.update(t);
                    }
                }
                agg
            });

        let mut metrics = HashMap::new();
        for name in self.weights.keys() {
            let value = match name.as_str() {
                "BasicBlockCoverage" => basic_block_coverage(chromo, cache),
                "UniversalPathUniqueness" => universal_path_uniqueness(chromo, own_generation, other_generation),
                "GenerationUniqueness" => generation_uniqueness(chromo, other_trace.as_ref()),
                "CodeCommonality" => code_commonality(chromo),
                _ => unreachable!("validated in Evaluator::new"),
            };
            metrics.insert(name.clone(), value);
        }
        metrics
    }

    fn calculate_fitness(&self, metrics: &HashMap<String, f64>) -> f64 {
        metrics
            .iter()
            .map(|(name, value)| self.weights.get(name).copied().unwrap_or(0.0) * value)
            .sum()
    }

    /// Global min/max per metric across both generations, with the
    /// classical `x_norm = (x - xmin) / max(xmax - xmin, epsilon-free-1)`
    /// normalization (SPEC_FULL.md §4.9: a zero spread normalizes to 1.0,
    /// not a division by zero).
    fn normalize(&self, population: &Population) -> (HashMap<u64, HashMap<String, f64>>, HashMap<u64, HashMap<String, f64>>) {
        let mut globmax: HashMap<String, f64> = population.current.max_metrics.clone();
        let mut globmin: HashMap<String, f64> = population.current.min_metrics.clone();
        if let Some(previous) = &population.previous {
            for (name, &value) in &previous.max_metrics {
                globmax
                    .entry(name.clone())
                    .and_modify(|m| *m = m.max(value))
                    .or_insert(value);
            }
            for (name, &value) in &previous.min_metrics {
                globmin
                    .entry(name.clone())
                    .and_modify(|m| *m = m.min(value))
                    .or_insert(value);
            }
        }

        let mut denom: HashMap<String, f64> = HashMap::new();
        for (name, &hi) in &globmax {
            let lo = globmin.get(name).copied().unwrap_or(hi);
            let spread = hi - lo;
            denom.insert(name.clone(), if spread == 0.0 { 1.0 } else { spread });
        }

        let normalize_one = |chromo: &Chromosome| -> HashMap<String, f64> {
            chromo
                .metrics
                .iter()
                .map(|(name, &value)| {
                    let lo = globmin.get(name).copied().unwrap_or(0.0);
                    let d = denom.get(name).copied().unwrap_or(1.0);
                    (name.clone(), (value - lo) / d)
                })
                .collect()
        };

        let mut current = HashMap::new();
        if let Ok(chromosomes) = population.current.get_all() {
            for chromo in &chromosomes {
                current.insert(chromo.uid, normalize_one(chromo));
            }
        }

        let mut previous = HashMap::new();
        if let Some(prev) = &population.previous {
            if let Ok(chromosomes) = prev.get_all() {
                for chromo in &chromosomes {
                    previous.insert(chromo.uid, normalize_one(chromo));
                }
            }
        }

        (previous, current)
    }

    /// Computes metrics for every chromosome in both generations,
    /// normalizes across the pair, and assigns fitness. Once fitness is
    /// assigned, clears `current`'s running min/max if this was the first
    /// epoch (no `previous` generation) — the reference discards first-epoch
    /// metric bookkeeping since nothing carries over once it's consumed.
    pub fn evaluate(&self, population: &mut Population, cache: &FxHashMap<String, BlockCache>) -> Result<(), CampaignError> {
        let current_chromosomes = population.current.get_all()?;
        let previous_chromosomes = match &population.previous {
            Some(p) => Some(p.get_all()?),
            None => None,
        };

        if let Some(prev_chromos) = &previous_chromosomes {
            for chromo in prev_chromos {
                let metrics = self.calculate_metrics(chromo, prev_chromos, Some(&current_chromosomes), cache);
                population.previous.as_mut().unwrap().set_metrics(chromo.uid, &metrics)?;
            }
        }
        for chromo in &current_chromosomes {
            let metrics = self.calculate_metrics(chromo, &current_chromosomes, previous_chromosomes.as_deref(), cache);
            population.current.set_metrics(chromo.uid, &metrics)?;
        }

        let (previous_fitness, current_fitness) = self.normalize(population);

        if let Some(prev) = population.previous.as_mut() {
            for (uid, metrics) in &previous_fitness {
                prev.set_fitness(*uid, self.calculate_fitness(metrics))?;
            }
        }
        for (uid, metrics) in &current_fitness {
            population.current.set_fitness(*uid, self.calculate_fitness(metrics))?;
        }

        if population.previous.is_none() {
            population.current.clear_metrics();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::Campaign;
    use crate::gene::GeneNode;
    use crate::trace::Trace;
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    fn chromo(rng: &mut SmallRng, image: &str, bbls: &[u64]) -> Chromosome {
        let mut c = Chromosome::empty(rng);
        let g = c.alloc(GeneNode::new(vec![1], *b"IDAT"));
        c.add_gene(g);
        let mut trace = Trace::new();
        trace.add_image(image);
        for &b in bbls {
            trace.add_bbl(image, b);
        }
        c.trace = Some(trace);
        c
    }

    #[test]
    fn rejects_unknown_metric_name() {
        let mut weights = HashMap::new();
        weights.insert("NotARealMetric".to_string(), 1.0);
        assert!(Evaluator::new(weights).is_err());
    }

    #[test]
    fn basic_block_coverage_is_fraction_of_known_blocks() {
        let mut rng = SmallRng::seed_from_u64(1);
        let c = chromo(&mut rng, "a.exe", &[1, 2]);
        let mut cache = BlockCache::new();
        cache.add(1, 2);
        cache.add(2, 3);
        cache.add(3, 4);
        cache.add(4, 5);
        let mut caches = FxHashMap::default();
        caches.insert("a.exe".to_string(), cache);
        assert_relative_eq!(basic_block_coverage(&c, &caches), 0.5);
    }

    #[test]
    fn code_commonality_ratio_of_total_to_unique() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut c = chromo(&mut rng, "a.exe", &[1]);
        // hit the same block twice to inflate total beyond unique
        c.trace.as_mut().unwrap().add_bbl("a.exe", 1);
        assert_relative_eq!(code_commonality(&c), 2.0);
    }

    #[test]
    fn first_epoch_generation_uniqueness_is_one() {
        let mut rng = SmallRng::seed_from_u64(3);
        let c = chromo(&mut rng, "a.exe", &[1]);
        assert_relative_eq!(generation_uniqueness(&c, None), 1.0);
    }

    #[test]
    fn evaluate_assigns_fitness_and_clears_metrics_on_first_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let campaign = Rc::new(Campaign::new(tmp.path(), "c").unwrap());
        let mut cache = BlockCache::new();
        cache.add(1, 2);
        cache.add(2, 3);
        let mut caches = FxHashMap::default();
        caches.insert("a.exe".to_string(), cache);

        let mut population = Population::new(campaign, &caches);
        let mut rng = SmallRng::seed_from_u64(4);
        let c1 = chromo(&mut rng, "a.exe", &[1]);
        let c2 = chromo(&mut rng, "a.exe", &[1, 2]);
        population.add_chromosome(&c1).unwrap();
        population.add_chromosome(&c2).unwrap();

        let mut weights = HashMap::new();
        weights.insert("BasicBlockCoverage".to_string(), 1.0);
        let evaluator = Evaluator::new(weights).unwrap();
        evaluator.evaluate(&mut population, &caches).unwrap();

        assert!(population.current.max_metrics.is_empty());
        let restored = population.current.get_chromosome(c2.uid).unwrap();
        assert!(restored.fitness > 0.0);
    }
}
