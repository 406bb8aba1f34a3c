//! Simulation data types.

use anyhow::{Result, bail};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Heritable behavior of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Cooperator,
    NonCooperator,
}

impl Behavior {
    /// The other behavior.
    pub fn flipped(self) -> Self {
        match self {
            Self::Cooperator => Self::NonCooperator,
            Self::NonCooperator => Self::Cooperator,
        }
    }

    /// Whether this is the cooperating behavior.
    pub fn is_cooperator(self) -> bool {
        self == Self::Cooperator
    }
}

/// Individual of the simulation.
///
/// Each individual has a behavior and the index of the subpopulation (group) it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Individual {
    behavior: Behavior,
    group: usize,
}

impl Individual {
    pub fn new(behavior: Behavior, group: usize) -> Self {
        Self { behavior, group }
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn group(&self) -> usize {
        self.group
    }

    /// Same individual placed in another group.
    pub fn with_group(self, group: usize) -> Self {
        Self { group, ..self }
    }
}

/// Cooperator frequency of every group plus their arithmetic mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Frequencies {
    pub group: Vec<f64>,
    pub mean: f64,
}

/// Population divided into a fixed number of groups.
pub struct Population {
    n_groups: usize,
    ind_vec: Vec<Individual>,
}

impl Population {
    /// Partition `ind_vec` into `n_groups` groups of equal size.
    ///
    /// Each group receives `ind_vec.len() / n_groups` individuals drawn uniformly
    /// at random without replacement; the remaining individuals are dropped.
    pub fn partition<R: Rng + ?Sized>(
        mut ind_vec: Vec<Individual>,
        n_groups: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if n_groups == 0 {
            bail!("number of groups must be at least 1");
        }
        let group_size = ind_vec.len() / n_groups;

        ind_vec.shuffle(rng);
        ind_vec.truncate(group_size * n_groups);

        let ind_vec = ind_vec
            .into_iter()
            .enumerate()
            .map(|(i_ind, ind)| ind.with_group(i_ind / group_size))
            .collect();

        Ok(Self { n_groups, ind_vec })
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn len(&self) -> usize {
        self.ind_vec.len()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.ind_vec
    }

    pub fn into_individuals(self) -> Vec<Individual> {
        self.ind_vec
    }

    /// Append offspring to the population.
    pub fn extend(&mut self, offspring: Vec<Individual>) {
        debug_assert!(offspring.iter().all(|ind| ind.group() < self.n_groups));
        self.ind_vec.extend(offspring);
    }

    /// Compute the cooperator frequency of every group.
    ///
    /// # Errors
    /// Returns an error if some group has no members.
    pub fn group_frequencies(&self) -> Result<Frequencies> {
        let mut n_coop = vec![0_usize; self.n_groups];
        let mut n_ind = vec![0_usize; self.n_groups];
        for ind in &self.ind_vec {
            n_ind[ind.group()] += 1;
            if ind.behavior().is_cooperator() {
                n_coop[ind.group()] += 1;
            }
        }

        let mut group = Vec::with_capacity(self.n_groups);
        for (i_group, (&n_coop, &n_ind)) in n_coop.iter().zip(&n_ind).enumerate() {
            if n_ind == 0 {
                bail!("group {i_group} is empty");
            }
            group.push(n_coop as f64 / n_ind as f64);
        }
        let mean = group.iter().sum::<f64>() / self.n_groups as f64;

        Ok(Frequencies { group, mean })
    }

    /// Cooperator frequency of the whole population.
    pub fn global_frequency(&self) -> f64 {
        if self.ind_vec.is_empty() {
            return f64::NAN;
        }
        let n_coop = self
            .ind_vec
            .iter()
            .filter(|ind| ind.behavior().is_cooperator())
            .count();
        n_coop as f64 / self.ind_vec.len() as f64
    }
}

/// Record of the simulation at a single sampled generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Index of the row within the replicate, a multiple of the sampling stride.
    pub generation: usize,

    /// Cooperator frequency of the whole population.
    pub global: f64,

    /// Cooperator frequency of every group.
    pub group: Vec<f64>,

    /// Arithmetic mean of the group frequencies.
    pub mean: f64,
}
