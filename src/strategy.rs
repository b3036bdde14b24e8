//! The self-tuning lottery over (recombinator, mutator) pairs, and the
//! credit-assignment ratchet that steers it (SPEC_FULL.md §4.7).
use crate::chromosome::Chromosome;
use crate::crossover::dispatch::{Dispatch as RecombinatorDispatch, NAMES as RECOMBINATOR_NAMES};
use crate::error::CampaignError;
use crate::crossover::Recombine;
use crate::mutate::dispatch::Dispatch as MutatorDispatch;
use crate::mutate::Mutate;
use rand::RngCore;
use rustc_hash::FxHashMap;

/// One (recombinator, mutator) pair available to the strategy, keyed by
/// `cid = "<recombinator>_<mutator>"`.
#[derive(Debug)]
struct Candidate {
    cid: String,
    recombinator: RecombinatorDispatch,
    mutator: MutatorDispatch,
    score: u64,
}

/// Weighted-without-bias selection over a set of scored players: the
/// probability of picking player `i` is `score_i / Σ score_j`
/// (SPEC_FULL.md §4.7 "Lottery").
fn draw_ticket(cumulative: &[u64], total: u64, rng: &mut dyn RngCore) -> usize {
    let ticket = if total == 0 { 0 } else { next_u64_below(rng, total) };
    cumulative.partition_point(|&c| c <= ticket)
}

fn next_u64_below(rng: &mut dyn RngCore, bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    rng.next_u64() % bound
}

/// Holds the full candidate set and runs the lottery plus credit
/// assignment (SPEC_FULL.md §4.7).
#[derive(Debug)]
pub struct Strategy {
    candidates: FxHashMap<String, Candidate>,
    order: Vec<String>,
}

impl Strategy {
    /// Builds the full cross product of `recombinator_names × mutator_names`,
    /// each candidate starting with `score = 1`.
    pub fn new(recombinator_names: &[String], mutator_names: &[String]) -> Result<Self, CampaignError> {
        if recombinator_names.is_empty() {
            return Err(CampaignError::Configuration(
                "at least one recombinator must be configured".into(),
            ));
        }
        if mutator_names.is_empty() {
            return Err(CampaignError::Configuration(
                "at least one mutator must be configured".into(),
            ));
        }
        let mut candidates = FxHashMap::default();
        let mut order = Vec::new();
        for rname in recombinator_names {
            for mname in mutator_names {
                let cid = format!("{rname}_{mname}");
                let candidate = Candidate {
                    cid: cid.clone(),
                    recombinator: RecombinatorDispatch::resolve(rname)?,
                    mutator: MutatorDispatch::resolve(mname)?,
                    score: 1,
                };
                order.push(cid.clone());
                candidates.insert(cid, candidate);
            }
        }
        Ok(Self { candidates, order })
    }

    pub fn candidate_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// `score ← max(score, k)`: a ratchet that never decreases below the
    /// peak success count observed so far.
    pub fn good(&mut self, cid: &str, k: u64) {
        if let Some(c) = self.candidates.get_mut(cid) {
            c.score = c.score.max(k);
        }
    }

    /// Decrements toward 1, never going below it.
    pub fn bad(&mut self, cid: &str, k: u64) {
        if let Some(c) = self.candidates.get_mut(cid) {
            if c.score > 1 {
                c.score = c.score.saturating_sub(k).max(1);
            }
        }
    }

    pub fn score(&self, cid: &str) -> Option<u64> {
        self.candidates.get(cid).map(|c| c.score)
    }

    fn select_candidate(&self, rng: &mut dyn RngCore) -> &Candidate {
        let mut cumulative = Vec::with_capacity(self.order.len());
        let mut running = 0u64;
        for cid in &self.order {
            running += self.candidates[cid].score;
            cumulative.push(running);
        }
        let index = draw_ticket(&cumulative, running, rng);
        let cid = &self.order[index.min(self.order.len() - 1)];
        &self.candidates[cid]
    }

    /// Picks a candidate and recombines `male`/`female` through it,
    /// tagging both offspring with the winning `cid`. Returns the `cid`
    /// so the controller can credit-assign after elitism.
    pub fn recombine(&self, male: &mut Chromosome, female: &mut Chromosome, rng: &mut dyn RngCore) -> String {
        let candidate = self.select_candidate(rng);
        candidate
            .recombinator
            .recombine(male, female, &candidate.mutator, rng);
        male.fuzzer = Some(candidate.cid.clone());
        female.fuzzer = Some(candidate.cid.clone());
        candidate.cid.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::GeneNode;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn names(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_cross_product_of_candidates() {
        let strategy = Strategy::new(&names(&["Null", "RemoveGene"]), &names(&["Null", "Purge"])).unwrap();
        assert_eq!(strategy.candidate_ids().count(), 4);
        assert_eq!(strategy.score("Null_Null"), Some(1));
    }

    #[test]
    fn good_ratchets_up_bad_ratchets_down_to_floor() {
        let mut strategy = Strategy::new(&names(&["Null"]), &names(&["Null"])).unwrap();
        strategy.good("Null_Null", 5);
        assert_eq!(strategy.score("Null_Null"), Some(5));
        strategy.good("Null_Null", 2);
        assert_eq!(strategy.score("Null_Null"), Some(5));
        strategy.bad("Null_Null", 10);
        assert_eq!(strategy.score("Null_Null"), Some(1));
    }

    #[test]
    fn rejects_empty_lists() {
        assert!(Strategy::new(&[], &names(&["Null"])).is_err());
        assert!(Strategy::new(&names(&["Null"]), &[]).is_err());
    }

    #[test]
    fn recombine_tags_offspring_with_selected_cid() {
        let strategy = Strategy::new(&names(&["Null"]), &names(&["Null"])).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut c1 = Chromosome::empty(&mut rng);
        let g1 = c1.alloc(GeneNode::new(vec![1], *b"IDAT"));
        c1.add_gene(g1);
        let mut c2 = Chromosome::empty(&mut rng);
        let g2 = c2.alloc(GeneNode::new(vec![2], *b"IDAT"));
        c2.add_gene(g2);
        let cid = strategy.recombine(&mut c1, &mut c2, &mut rng);
        assert_eq!(cid, "Null_Null");
        assert_eq!(c1.fuzzer, Some("Null_Null".to_string()));
        assert_eq!(c2.fuzzer, Some("Null_Null".to_string()));
    }

    #[test]
    fn lottery_draw_ticket_respects_cumulative_bounds() {
        let cumulative = vec![3u64, 5, 10];
        assert_eq!(draw_ticket(&cumulative, 10, &mut SmallRng::seed_from_u64(0)), {
            let mut rng = SmallRng::seed_from_u64(0);
            let t = next_u64_below(&mut rng, 10);
            cumulative.partition_point(|&c| c <= t)
        });
    }
}
