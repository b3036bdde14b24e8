//! The top-level campaign loop: init, then repeating fuzz/analyze epochs
//! (SPEC_FULL.md §4.10 "Controller"). Grounded on
//! `examples/original_source/choronzon.py`'s `Choronzon` class.
use crate::campaign::Campaign;
use crate::chromosome::Chromosome;
use crate::config::Configuration;
use crate::error::CampaignError;
use crate::evaluator::Evaluator;
use crate::parser::{Deserializer, Serializer};
use crate::population::Population;
use crate::strategy::Strategy;
use crate::tracer::Tracer;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Owns every long-lived piece of a running campaign and drives the
/// init-then-loop control flow.
pub struct Controller {
    config: Configuration,
    campaign: Rc<Campaign>,
    population: Population,
    strategy: Strategy,
    tracer: Tracer,
    evaluator: Evaluator,
    deserializer: Box<dyn Deserializer>,
    serializer: Box<dyn Serializer>,
    rng: SmallRng,
}

impl Controller {
    /// Loads the configuration, builds the campaign workspace, disassembles
    /// the whitelisted images, seeds the first generation from
    /// `InitialPopulation`, and runs the first analysis pass.
    pub fn new(config_path: &Path) -> Result<Self, CampaignError> {
        let config = Configuration::load(config_path)?;
        let rng = SmallRng::from_entropy();

        let mut campaign = Campaign::new(Path::new("."), &config.campaign_name)?;
        if let Some(shared) = &config.chromosome_shared {
            campaign = campaign.with_shared_dir(shared)?;
        }
        let campaign = Rc::new(campaign);

        let seed_dir = campaign.copy_directory(&config.initial_population, "seedfiles")?;

        let tracer = Tracer::setup(
            &config.disassembler_path,
            config.whitelist.clone(),
            config.command.clone(),
            config.timeout,
        )?;

        let strategy = Strategy::new(&config.recombinators, &config.mutators)?;
        let evaluator = Evaluator::new(config.fitness_algorithms.clone())?;
        let population = Population::new(campaign.clone(), tracer.caches());
        let (deserializer, serializer) = crate::parser::resolve(&config.parser)?;

        let mut controller = Self {
            config,
            campaign,
            population,
            strategy,
            tracer,
            evaluator,
            deserializer,
            serializer,
            rng,
        };

        for entry in walkdir::WalkDir::new(&seed_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CampaignError::Parse(format!("failed to walk seed directory: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let chromosome = controller.deserializer.deserialize(entry.path(), &mut controller.rng)?;
            controller.population.add_chromosome(&chromosome)?;
        }

        controller.analyze()?;
        Ok(controller)
    }

    /// Picks couples from the previous generation, recombines them through
    /// the strategy's lottery, and adds the offspring to a fresh current
    /// generation (SPEC_FULL.md §4.10 "fuzz").
    pub fn fuzz(&mut self) -> Result<(), CampaignError> {
        self.population.new_epoch();

        let previous = self
            .population
            .previous
            .as_ref()
            .expect("new_epoch always sets previous");
        let couples = Population::couples(previous, true, &mut self.rng);

        for (male_uid, female_uid) in couples {
            let previous = self.population.previous.as_ref().expect("set above");
            let mut male = previous.get_chromosome(male_uid)?;
            let mut female = previous.get_chromosome(female_uid)?;
            male.uid = Chromosome::new_uid(&mut self.rng);
            female.uid = Chromosome::new_uid(&mut self.rng);

            while self.population.does_exist(male.uid) || self.population.does_exist(female.uid) {
                male.uid = Chromosome::new_uid(&mut self.rng);
                female.uid = Chromosome::new_uid(&mut self.rng);
            }

            self.strategy.recombine(&mut male, &mut female, &mut self.rng);
            self.population.add_chromosome(&male)?;
            self.population.add_chromosome(&female)?;
        }

        if self.config.keep_generations {
            let dir = self.campaign.generation_dir(self.population.epoch)?;
            for chromosome in self.population.current.get_all()? {
                let bytes = chromosome.serialize(self.serializer.as_ref());
                std::fs::write(dir.join(chromosome.uid.to_string()), bytes)?;
            }
        }

        Ok(())
    }

    /// Traces every chromosome in the current generation, archives crashes
    /// and drops them from the population, pulls in any peer-shared
    /// chromosomes, evaluates fitness, runs elitism, checks the surviving
    /// diversity, and credits the fuzzer combinations behind the survivors
    /// (SPEC_FULL.md §4.10 "analyze").
    pub fn analyze(&mut self) -> Result<(), CampaignError> {
        let current = self.population.current.get_all()?;
        log::info!("current generation has {} chromosomes", current.len());

        let mut crashed = Vec::new();
        for chromosome in &current {
            let serialized = chromosome.serialize(self.serializer.as_ref());
            let trace = self.tracer.analyze(&self.campaign, chromosome, self.serializer.as_ref())?;
            if trace.has_crashed {
                self.campaign.archive_crash(chromosome.uid, &serialized)?;
                log::info!("crash! uid {} archived", chromosome.uid);
                crashed.push(chromosome.uid);
            } else {
                self.population.add_trace(chromosome.uid, trace)?;
            }
        }
        for uid in crashed {
            self.population.delete_chromosome(uid)?;
        }

        if self.campaign.shared_dir.is_some() {
            for (_filename, blob) in self.campaign.poll_shared()? {
                let chromosome = Chromosome::loads(&blob)
                    .map_err(|e| CampaignError::Analysis(format!("corrupt shared chromosome: {e}")))?;
                let trace = chromosome.trace.clone();
                self.population.add_chromosome(&chromosome)?;
                if let Some(trace) = trace {
                    self.population.add_trace(chromosome.uid, trace)?;
                }
            }
        }

        self.evaluator.evaluate(&mut self.population, self.tracer.caches())?;
        self.population.elitism()?;
        log::info!("elite generation has {} chromosomes", self.population.current.len());

        if self.population.current.len() < 2 {
            return Err(CampaignError::InsufficientDiversity {
                count: self.population.current.len(),
            });
        }

        self.credit_fuzzers()?;

        if self.campaign.shared_dir.is_some() {
            for chromosome in self.population.current.get_all()? {
                let filename = chromosome.uid.to_string();
                if !self.campaign.already_processed(&filename) {
                    let blob = chromosome
                        .dumps()
                        .map_err(|e| CampaignError::Analysis(format!("failed to dump chromosome for sharing: {e}")))?;
                    self.campaign.dump_to_shared(&filename, &blob)?;
                }
            }
        }

        if self.config.keep_generations {
            let dir = self.campaign.generation_dir(self.population.epoch)?;
            for chromosome in self.population.current.get_all()? {
                let bytes = chromosome.serialize(self.serializer.as_ref());
                std::fs::write(dir.join(chromosome.uid.to_string()), bytes)?;
            }
        }

        Ok(())
    }

    /// Rewards every (recombinator, mutator) pair whose offspring survived
    /// elitism, proportional to survivor count (SPEC_FULL.md §4.10
    /// "evaluate_fuzzers").
    fn credit_fuzzers(&mut self) -> Result<(), CampaignError> {
        let mut involved: HashMap<String, u64> = HashMap::new();
        if let Some(previous) = &self.population.previous {
            for chromosome in previous.get_all()? {
                if let Some(fuzzer) = chromosome.fuzzer {
                    involved.entry(fuzzer).or_insert(0);
                }
            }
        }
        for chromosome in self.population.current.get_all()? {
            if let Some(fuzzer) = chromosome.fuzzer {
                match involved.get_mut(&fuzzer) {
                    None => {
                        involved.insert(fuzzer, 0);
                    }
                    Some(count) => *count += 1,
                }
            }
        }
        for (fuzzer, score) in &involved {
            if *score > 0 {
                self.strategy.good(fuzzer, *score);
            }
        }
        Ok(())
    }

    /// Runs `fuzz` then `analyze` once, i.e. one full epoch of the campaign.
    pub fn run_epoch(&mut self) -> Result<(), CampaignError> {
        self.fuzz()?;
        self.analyze()
    }
}
