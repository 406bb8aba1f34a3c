use crate::config::Config;
use crate::model::{Behavior, Frequencies, Individual, Population, Record};
use crate::output::Sink;
use crate::stats::SeriesAccumulator;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;

/// Simulation engine.
///
/// Holds the configuration and the random number generator every draw goes through,
/// and provides methods to run replicates, cycles and single generations.
pub struct Engine {
    cfg: Config,
    rng: ChaCha12Rng,
}

/// Reproduction distributions of one group.
struct ReprodDists {
    coop: Bernoulli,
    noncoop: Bernoulli,
}

impl ReprodDists {
    fn get(&self, behavior: Behavior) -> &Bernoulli {
        match behavior {
            Behavior::Cooperator => &self.coop,
            Behavior::NonCooperator => &self.noncoop,
        }
    }
}

impl Engine {
    /// Create a new `Engine` with the given configuration and random number generator.
    pub fn new(cfg: Config, rng: ChaCha12Rng) -> Self {
        Self { cfg, rng }
    }

    /// Configuration of the simulation.
    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Run all replicates, hand every series to `sink` and return their average.
    pub fn run_replicates<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<Vec<Record>> {
        let n_replicates = self.cfg.output.n_replicates;
        let mut acc = SeriesAccumulator::new();

        for i_rep in 0..n_replicates {
            let records = self
                .run_replicate()
                .with_context(|| format!("failed to run replicate {i_rep}"))?;

            sink.save_replicate(i_rep, &records)
                .with_context(|| format!("failed to save replicate {i_rep}"))?;
            acc.add(&records).context("failed to accumulate records")?;

            let progress = 100.0 * (i_rep + 1) as f64 / n_replicates as f64;
            log::info!("completed {progress:06.2}%");
        }

        let average = acc.report().context("failed to average replicates")?;
        sink.save_average(&average)
            .context("failed to save average")?;

        Ok(average)
    }

    /// Run one replicate from a fresh initial population.
    pub fn run_replicate(&mut self) -> Result<Vec<Record>> {
        let gens_per_cycle = self.cfg.output.gens_per_cycle;
        let n_cycles = self.cfg.output.n_cycles;
        let n_saves = n_cycles * gens_per_cycle.div_ceil(self.cfg.output.gens_per_save);
        let mut records = Vec::with_capacity(n_saves);

        let mut pop = self
            .generate_initial_population()
            .context("failed to generate initial population")?;

        for i_cycle in 0..n_cycles {
            // Grow phase: the population only gets larger.
            self.run_cycle(&mut pop, &mut records)
                .with_context(|| format!("failed to run cycle {i_cycle}"))?;

            // Reset phase: back to the fixed population size.
            pop = self
                .resample(pop)
                .with_context(|| format!("failed to resample after cycle {i_cycle}"))?;
        }

        Ok(records)
    }

    /// Draw every initial behavior independently and partition the cohort.
    pub fn generate_initial_population(&mut self) -> Result<Population> {
        let popsize = self.cfg.model.popsize;
        let coop_dist = Bernoulli::new(self.cfg.init.freq_coop)?;

        let mut ind_vec = Vec::with_capacity(popsize);
        for _ in 0..popsize {
            let behavior = if coop_dist.sample(&mut self.rng) {
                Behavior::Cooperator
            } else {
                Behavior::NonCooperator
            };
            ind_vec.push(Individual::new(behavior, 0));
        }

        Population::partition(ind_vec, self.cfg.model.n_subpop, &mut self.rng)
    }

    /// Run the generations of one cycle, appending sampled records.
    ///
    /// Records are taken before reproduction. Their generation index continues
    /// the stride of `records`, so a replicate is indexed `0, step, 2 * step, ...`
    /// across cycles.
    pub fn run_cycle(&mut self, pop: &mut Population, records: &mut Vec<Record>) -> Result<()> {
        let gens_per_save = self.cfg.output.gens_per_save;
        for i_gen in 0..self.cfg.output.gens_per_cycle {
            let freqs = pop
                .group_frequencies()
                .context("failed to compute group frequencies")?;

            if i_gen % gens_per_save == 0 {
                let generation = records.len() * gens_per_save;
                records.push(Record {
                    generation,
                    global: pop.global_frequency(),
                    group: freqs.group.clone(),
                    mean: freqs.mean,
                });
            }

            let offspring = self
                .reproduce(pop, &freqs)
                .context("failed to reproduce")?;
            pop.extend(offspring);
        }

        Ok(())
    }

    /// Produce the offspring of one generation.
    ///
    /// Parents are left in place; the caller appends the returned offspring.
    pub fn reproduce(&mut self, pop: &Population, freqs: &Frequencies) -> Result<Vec<Individual>> {
        let rep_dist_vec = self.reprod_dists(freqs)?;
        let mut_dist = Bernoulli::new(self.cfg.model.prob_mut)?;

        let capacity = self.cfg.model.capacity;
        let offspring = if capacity == 0 {
            self.reproduce_unbounded(pop, &rep_dist_vec, &mut_dist)
        } else {
            self.reproduce_bounded(pop, &rep_dist_vec, &mut_dist, capacity)
        };

        Ok(offspring)
    }

    fn reprod_dists(&self, freqs: &Frequencies) -> Result<Vec<ReprodDists>> {
        let model = &self.cfg.model;
        let mut rep_dist_vec = Vec::with_capacity(freqs.group.len());
        for &freq in &freqs.group {
            // Out-of-range chances behave like a uniform draw compared against them.
            let coop = model.reprod_chance(Behavior::Cooperator, freq).clamp(0.0, 1.0);
            let noncoop = model.reprod_chance(Behavior::NonCooperator, freq).clamp(0.0, 1.0);
            rep_dist_vec.push(ReprodDists {
                coop: Bernoulli::new(coop)?,
                noncoop: Bernoulli::new(noncoop)?,
            });
        }
        Ok(rep_dist_vec)
    }

    fn reproduce_unbounded(
        &mut self,
        pop: &Population,
        rep_dist_vec: &[ReprodDists],
        mut_dist: &Bernoulli,
    ) -> Vec<Individual> {
        let mut offspring = Vec::new();
        for ind in pop.individuals() {
            let rep_dist = rep_dist_vec[ind.group()].get(ind.behavior());
            if rep_dist.sample(&mut self.rng) {
                offspring.push(self.spawn(ind, mut_dist));
            }
        }
        offspring
    }

    fn reproduce_bounded(
        &mut self,
        pop: &Population,
        rep_dist_vec: &[ReprodDists],
        mut_dist: &Bernoulli,
        capacity: usize,
    ) -> Vec<Individual> {
        let ind_vec = pop.individuals();

        let mut i_ind_groups = vec![Vec::new(); pop.n_groups()];
        for (i_ind, ind) in ind_vec.iter().enumerate() {
            i_ind_groups[ind.group()].push(i_ind);
        }

        let mut offspring = Vec::new();
        for i_ind_group in &mut i_ind_groups {
            // Random order decides who gets a chance before the capacity is reached.
            i_ind_group.shuffle(&mut self.rng);

            let mut n_offspring = 0;
            for &i_ind in i_ind_group.iter() {
                if n_offspring == capacity {
                    break;
                }
                let ind = &ind_vec[i_ind];
                let rep_dist = rep_dist_vec[ind.group()].get(ind.behavior());
                if rep_dist.sample(&mut self.rng) {
                    offspring.push(self.spawn(ind, mut_dist));
                    n_offspring += 1;
                }
            }
        }
        offspring
    }

    fn spawn(&mut self, parent: &Individual, mut_dist: &Bernoulli) -> Individual {
        let behavior = if mut_dist.sample(&mut self.rng) {
            parent.behavior().flipped()
        } else {
            parent.behavior()
        };
        Individual::new(behavior, parent.group())
    }

    /// Draw the next cycle's population from the grown pool and regroup it.
    pub fn resample(&mut self, pop: Population) -> Result<Population> {
        let ind_vec = self
            .draw_metapopulation(pop)
            .context("failed to draw metapopulation")?;
        Population::partition(ind_vec, self.cfg.model.n_subpop, &mut self.rng)
    }

    fn draw_metapopulation(&mut self, pop: Population) -> Result<Vec<Individual>> {
        let popsize = self.cfg.model.popsize;
        let n_ind = pop.len();
        if n_ind < popsize {
            bail!("pool has {n_ind} individuals, but {popsize} must be drawn");
        }

        let mut ind_vec = pop.into_individuals();
        let (drawn, _) = ind_vec.partial_shuffle(&mut self.rng, popsize);
        Ok(drawn.to_vec())
    }
}
