//! Generation persistence and basic-block-leader elitism (SPEC_FULL.md §3,
//! §4.8). Grounded on `examples/original_source/world.py`'s `Generation`
//! and `Population` classes.
//!
//! Per SPEC_FULL.md §9, the reference's `Generation` re-reads/re-writes
//! every chromosome through a process-wide `Campaign` singleton on each
//! access. This crate keeps that "accessors hit disk" behavior but threads
//! an explicit `Rc<Campaign>` through the constructor instead of reaching
//! for global state.
use crate::blockcache::BlockCache;
use crate::campaign::Campaign;
use crate::chromosome::Chromosome;
use crate::error::CampaignError;
use crate::trace::Trace;
use rand::seq::SliceRandom;
use rand::RngCore;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;
use std::rc::Rc;

/// One epoch's worth of chromosomes, identified by `uid`, plus the running
/// per-metric min/max and aggregate trace the evaluator needs.
#[derive(Debug)]
pub struct Generation {
    pub epoch: u64,
    campaign: Rc<Campaign>,
    uids: FxHashSet<u64>,
    /// Fitness lives alongside the generation rather than inside the §6.4
    /// side-channel blob (whose `(genes, metrics, uid, trace)` tuple
    /// deliberately excludes it, see `chromosome.rs`'s `dumps`/`loads`), so
    /// that a `set_chromosome`/`get_chromosome` round-trip through disk
    /// doesn't reset every chromosome's fitness to zero out from under
    /// `Evaluator`/`Population::elitism`.
    fitness: FxHashMap<u64, f64>,
    pub max_metrics: HashMap<String, f64>,
    pub min_metrics: HashMap<String, f64>,
    pub trace: Trace,
}

impl Generation {
    pub fn new(epoch: u64, campaign: Rc<Campaign>) -> Self {
        Self {
            epoch,
            campaign,
            uids: FxHashSet::default(),
            fitness: FxHashMap::default(),
            max_metrics: HashMap::new(),
            min_metrics: HashMap::new(),
            trace: Trace::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn contains(&self, uid: u64) -> bool {
        self.uids.contains(&uid)
    }

    pub fn uids(&self) -> impl Iterator<Item = u64> + '_ {
        self.uids.iter().copied()
    }

    /// Persists `chromosome`'s side-channel blob into the campaign's
    /// chromosome archive and records its uid as a member of this
    /// generation. Seeds the generation's own fitness tracking with
    /// `chromosome.fitness` on first sight of `uid`, without clobbering a
    /// fitness already recorded via `set_fitness` on a later re-save (e.g.
    /// after `set_metrics` rewrites the same chromosome).
    pub fn set_chromosome(&mut self, chromosome: &Chromosome) -> Result<(), CampaignError> {
        let blob = chromosome
            .dumps()
            .map_err(|e| CampaignError::Analysis(format!("failed to persist chromosome {}: {e}", chromosome.uid)))?;
        self.campaign.store_chromosome(chromosome.uid, &blob)?;
        self.uids.insert(chromosome.uid);
        self.fitness.entry(chromosome.uid).or_insert(chromosome.fitness);
        Ok(())
    }

    /// Reads `uid`'s blob back from the campaign archive and overlays this
    /// generation's tracked fitness onto it (the blob itself never carries
    /// fitness, see `fitness` field doc). The live `Chromosome` returned is
    /// otherwise a fresh deserialization; nothing else about it is cached in
    /// memory beyond the membership set.
    pub fn get_chromosome(&self, uid: u64) -> Result<Chromosome, CampaignError> {
        let blob = self.campaign.load_chromosome(uid)?;
        let mut chromosome =
            Chromosome::loads(&blob).map_err(|e| CampaignError::Analysis(format!("corrupt chromosome {uid}: {e}")))?;
        chromosome.fitness = self.fitness.get(&uid).copied().unwrap_or(0.0);
        Ok(chromosome)
    }

    pub fn get_all(&self) -> Result<Vec<Chromosome>, CampaignError> {
        self.uids.iter().map(|&uid| self.get_chromosome(uid)).collect()
    }

    pub fn delete_chromosome(&mut self, uid: u64) -> Result<(), CampaignError> {
        self.campaign.delete_chromosome(uid)?;
        self.uids.remove(&uid);
        self.fitness.remove(&uid);
        Ok(())
    }

    /// Sets `uid`'s (raw, pre-normalization) metrics and folds them into the
    /// generation's running min/max per metric name.
    pub fn set_metrics(&mut self, uid: u64, metrics: &HashMap<String, f64>) -> Result<(), CampaignError> {
        let mut chromosome = self.get_chromosome(uid)?;
        chromosome.metrics = metrics.clone();
        self.set_chromosome(&chromosome)?;

        for (name, &value) in metrics {
            self.max_metrics
                .entry(name.clone())
                .and_modify(|m| {
                    if value > *m {
                        *m = value;
                    }
                })
                .or_insert(value);
            self.min_metrics
                .entry(name.clone())
                .and_modify(|m| {
                    if value < *m {
                        *m = value;
                    }
                })
                .or_insert(value);
        }
        Ok(())
    }

    pub fn set_fitness(&mut self, uid: u64, fitness: f64) -> Result<(), CampaignError> {
        self.fitness.insert(uid, fitness);
        Ok(())
    }

    pub fn clear_metrics(&mut self) {
        self.max_metrics.clear();
        self.min_metrics.clear();
    }

    /// Mean/stddev of this generation's fitness values, for per-epoch
    /// progress logging. Grounded on the teacher's
    /// `Population::fitness_score_mean`/`_stddev` reporting idiom
    /// (`src/population.rs`), using the same `streaming_stats` crate.
    pub fn fitness_summary(&self) -> Option<(f64, f64)> {
        let chromosomes = self.get_all().ok()?;
        if chromosomes.is_empty() {
            return None;
        }
        let values: Vec<f64> = chromosomes.iter().map(|c| c.fitness).collect();
        Some((stats::mean(values.iter().copied()), stats::stddev(values.iter().copied())))
    }
}

/// Weighted-without-replacement-bias couple selector (SPEC_FULL.md §4.8):
/// draws uniformly among not-yet-exhausted uids, keeping a draw with
/// probability `1/(1+count)`. Becomes `done` once every uid has been
/// selected at least once.
#[derive(Debug)]
pub struct NaiveSelector {
    counts: FxHashMap<u64, u64>,
}

impl NaiveSelector {
    pub fn new(uids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            counts: uids.into_iter().map(|u| (u, 0)).collect(),
        }
    }

    pub fn is_done(&self) -> bool {
        !self.counts.values().any(|&c| c == 0)
    }

    /// Picks and returns a uid, or `None` once `is_done()`.
    pub fn select(&mut self, rng: &mut dyn RngCore) -> Option<u64> {
        if self.is_done() {
            return None;
        }
        let keys: Vec<u64> = self.counts.keys().copied().collect();
        loop {
            let uid = *keys.choose(rng).expect("counts is non-empty while not done");
            let count = self.counts[&uid];
            if next_u64_inclusive(rng, count) == count {
                *self.counts.get_mut(&uid).unwrap() += 1;
                return Some(uid);
            }
        }
    }
}

fn next_u64_inclusive(rng: &mut dyn RngCore, bound: u64) -> u64 {
    rng.next_u64() % (bound + 1)
}

/// Holds `previous`/`current` generations and the per-image, per-block
/// leader table that elitism maintains (SPEC_FULL.md §3, §4.8).
#[derive(Debug)]
pub struct Population {
    pub epoch: u64,
    pub previous: Option<Generation>,
    pub current: Generation,
    pub image_leaders: FxHashMap<String, FxHashMap<u64, Option<u64>>>,
    campaign: Rc<Campaign>,
}

impl Population {
    pub fn new(campaign: Rc<Campaign>, caches: &FxHashMap<String, BlockCache>) -> Self {
        let mut image_leaders = FxHashMap::default();
        for (image, cache) in caches {
            let leaders: FxHashMap<u64, Option<u64>> = cache.iter_blocks().map(|(start, _end)| (start, None)).collect();
            image_leaders.insert(image.clone(), leaders);
        }
        Self {
            epoch: 0,
            previous: None,
            current: Generation::new(0, campaign.clone()),
            image_leaders,
            campaign,
        }
    }

    /// Adds `chromosome` to the current generation unless its uid already
    /// exists there.
    pub fn add_chromosome(&mut self, chromosome: &Chromosome) -> Result<(), CampaignError> {
        if !self.current.contains(chromosome.uid) {
            self.current.set_chromosome(chromosome)?;
        }
        Ok(())
    }

    pub fn does_exist(&self, uid: u64) -> bool {
        self.current.contains(uid) || self.previous.as_ref().is_some_and(|g| g.contains(uid))
    }

    /// Records `trace` on `uid`'s chromosome and folds it into the
    /// generation's aggregate trace.
    pub fn add_trace(&mut self, uid: u64, trace: Trace) -> Result<(), CampaignError> {
        let mut chromosome = self.current.get_chromosome(uid)?;
        chromosome.trace = Some(trace.clone());
        self.current.set_chromosome(&chromosome)?;
        self.current.trace.update(&trace);
        Ok(())
    }

    pub fn delete_chromosome(&mut self, uid: u64) -> Result<(), CampaignError> {
        self.current.delete_chromosome(uid)
    }

    /// Draws couples from `generation` via a fresh `NaiveSelector`, stopping
    /// as soon as either draw comes back empty. When `distinct`, the second
    /// pick is redrawn until it differs from the first (SPEC_FULL.md §4.8).
    pub fn couples(generation: &Generation, distinct: bool, rng: &mut dyn RngCore) -> Vec<(u64, u64)> {
        let mut selector = NaiveSelector::new(generation.uids());
        let mut pairs = Vec::new();
        loop {
            let Some(male) = selector.select(rng) else { break };
            let mut female = selector.select(rng);
            if distinct {
                while female == Some(male) {
                    match selector.select(rng) {
                        Some(next) => female = Some(next),
                        None => {
                            female = None;
                            break;
                        }
                    }
                }
            }
            let Some(female) = female else { break };
            pairs.push((male, female));
        }
        pairs
    }

    /// `previous <- current`; `current <- new Generation(epoch+1)`.
    pub fn new_epoch(&mut self) {
        self.epoch += 1;
        let finished = std::mem::replace(&mut self.current, Generation::new(self.epoch, self.campaign.clone()));
        self.previous = Some(finished);
    }

    /// Basic-block-leader elitism (SPEC_FULL.md §4.8). Preconditions: every
    /// chromosome in `self.current` has a populated trace.
    pub fn elitism(&mut self) -> Result<(), CampaignError> {
        let chromosomes = self.current.get_all()?;

        for chromosome in &chromosomes {
            let Some(trace) = &chromosome.trace else { continue };
            for image in &trace.images {
                let Some(leaders) = self.image_leaders.get_mut(image) else { continue };
                let Some(hits) = trace.set_per_image.get(image) else { continue };
                for &bbl in hits {
                    let Some(slot) = leaders.get_mut(&bbl) else { continue };
                    match *slot {
                        None => *slot = Some(chromosome.uid),
                        Some(leader_uid) => {
                            if let Some(leader) = chromosomes.iter().find(|c| c.uid == leader_uid) {
                                let leader_total = leader.trace.as_ref().map(|t| t.total()).unwrap_or(0);
                                let this_total = chromosome.trace.as_ref().map(|t| t.total()).unwrap_or(0);
                                let better = chromosome.fitness > leader.fitness
                                    || (chromosome.fitness == leader.fitness && this_total > leader_total);
                                if better {
                                    *slot = Some(chromosome.uid);
                                }
                            }
                        }
                    }
                }
            }
        }

        self.new_epoch();

        let mut promoted: FxHashSet<u64> = FxHashSet::default();
        for leaders in self.image_leaders.values() {
            promoted.extend(leaders.values().flatten().copied());
        }

        let previous = self.previous.as_ref().expect("new_epoch always sets previous");
        for uid in promoted {
            let chromosome = previous.get_chromosome(uid)?;
            self.current.set_chromosome(&chromosome)?;
            if let Some(trace) = &chromosome.trace {
                self.current.trace.update(trace);
            }
            if !chromosome.metrics.is_empty() {
                self.current.set_metrics(uid, &chromosome.metrics)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::GeneNode;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn campaign() -> (tempfile::TempDir, Rc<Campaign>) {
        let tmp = tempfile::tempdir().unwrap();
        let c = Campaign::new(tmp.path(), "pop-test").unwrap();
        (tmp, Rc::new(c))
    }

    fn chromo_with_trace(rng: &mut SmallRng, image: &str, bbls: &[u64], fitness: f64) -> Chromosome {
        let mut c = Chromosome::empty(rng);
        let g = c.alloc(GeneNode::new(vec![1], *b"IDAT"));
        c.add_gene(g);
        c.fitness = fitness;
        let mut trace = Trace::new();
        trace.add_image(image);
        for &b in bbls {
            trace.add_bbl(image, b);
        }
        c.trace = Some(trace);
        c
    }

    #[test]
    fn naive_selector_eventually_done_and_covers_every_uid() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut selector = NaiveSelector::new([1u64, 2, 3]);
        let mut seen = FxHashSet::default();
        while let Some(uid) = selector.select(&mut rng) {
            seen.insert(uid);
        }
        assert_eq!(seen, [1u64, 2, 3].into_iter().collect());
        assert!(selector.is_done());
    }

    #[test]
    fn set_fitness_survives_a_metrics_rewrite() {
        let (_tmp, campaign) = campaign();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut gen = Generation::new(0, campaign);
        let c = chromo_with_trace(&mut rng, "a.exe", &[1], 0.0);
        let uid = c.uid;
        gen.set_chromosome(&c).unwrap();

        gen.set_fitness(uid, 7.5).unwrap();
        assert_eq!(gen.get_chromosome(uid).unwrap().fitness, 7.5);

        // set_metrics re-persists the chromosome's blob; fitness must not
        // be reset to the blob's (fitness-less) default in the process.
        let mut metrics = HashMap::new();
        metrics.insert("BasicBlockCoverage".to_string(), 3.0);
        gen.set_metrics(uid, &metrics).unwrap();
        assert_eq!(gen.get_chromosome(uid).unwrap().fitness, 7.5);
    }

    #[test]
    fn generation_set_get_round_trips_through_campaign() {
        let (_tmp, campaign) = campaign();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut gen = Generation::new(0, campaign);
        let c = chromo_with_trace(&mut rng, "a.exe", &[1, 2], 0.5);
        let uid = c.uid;
        gen.set_chromosome(&c).unwrap();
        assert!(gen.contains(uid));
        let restored = gen.get_chromosome(uid).unwrap();
        assert_eq!(restored.uid, uid);
    }

    #[test]
    fn elitism_promotes_better_coverage_chromosome() {
        let (_tmp, campaign) = campaign();
        let mut rng = SmallRng::seed_from_u64(3);

        let mut cache = BlockCache::new();
        cache.add(1, 2);
        cache.add(2, 3);
        cache.add(3, 4);
        let mut caches = FxHashMap::default();
        caches.insert("a.exe".to_string(), cache);

        let mut population = Population::new(campaign, &caches);

        let a = chromo_with_trace(&mut rng, "a.exe", &[1, 2], 1.0);
        let a_uid = a.uid;
        let a_prime = chromo_with_trace(&mut rng, "a.exe", &[1, 2, 3], 1.0);
        let a_prime_uid = a_prime.uid;

        population.add_chromosome(&a).unwrap();
        population.add_chromosome(&a_prime).unwrap();

        population.elitism().unwrap();

        assert!(population.current.contains(a_prime_uid));
        // bbl 1 and 2 are covered by both with equal fitness; a_prime has a
        // higher trace total (3 vs 2) so it wins the tie-break everywhere.
        assert!(!population.current.contains(a_uid));
        assert_eq!(population.current.len(), 1);
    }

    #[test]
    fn elitism_requires_at_least_two_survivors_for_diversity() {
        let (_tmp, campaign) = campaign();
        let mut rng = SmallRng::seed_from_u64(4);

        let mut cache = BlockCache::new();
        cache.add(1, 2);
        let mut caches = FxHashMap::default();
        caches.insert("a.exe".to_string(), cache);

        let mut population = Population::new(campaign, &caches);
        let only = chromo_with_trace(&mut rng, "a.exe", &[1], 1.0);
        population.add_chromosome(&only).unwrap();
        population.elitism().unwrap();

        assert_eq!(population.current.len(), 1);
    }
}
