//! An evolutionary, coverage-guided, grammar-aware file-format fuzzer.
//!
//! A campaign starts from a seed corpus of well-formed files, splits each
//! one into a forest of typed [`gene`] nodes via a pluggable [`parser`],
//! and evolves the population through [`mutate`]/[`crossover`] operators
//! chosen by a self-tuning [`strategy`] lottery. Every generation's
//! candidates are run under instrumentation via [`tracer`], scored by
//! [`evaluator`] against the coverage they produced, and trimmed down to
//! the fittest per-basic-block leaders by [`population`]'s elitism step.
//! [`controller`] wires all of this into the init-then-loop campaign.

pub mod blockcache;
pub mod campaign;
pub mod chromosome;
pub mod config;
pub mod controller;
pub mod crossover;
pub mod error;
pub mod evaluator;
pub mod gene;
pub mod mutate;
pub mod parser;
pub mod population;
pub mod strategy;
pub mod trace;
pub mod tracer;
pub mod watchdog;
