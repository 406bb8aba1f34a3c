use crate::model::Behavior;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
    pub sweep: Option<SweepConfig>,
}

/// Parameters of the reproduction model.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of individuals kept at every cycle boundary.
    pub popsize: usize,
    /// Number of subpopulations.
    pub n_subpop: usize,

    /// Benefit coefficient `b` provided by cooperators to their group.
    pub benefit: f64,
    /// Baseline reproduction probability of cooperators (`r1`).
    pub rate_coop: f64,
    /// Baseline reproduction probability of non-cooperators (`r0`).
    pub rate_noncoop: f64,

    /// Maximum offspring per subpopulation and generation (`K0`, 0 = unbounded).
    pub capacity: usize,

    /// Probability that an offspring flips its parent's behavior.
    pub prob_mut: f64,
}

/// Parameters of the initial population.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Probability that an initial individual is a cooperator.
    pub freq_coop: f64,
    /// Seed of the random number generator (OS entropy if absent).
    pub seed: Option<u64>,
}

/// Parameters of the time structure and data sampling.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub gens_per_cycle: usize,
    pub n_cycles: usize,
    pub n_replicates: usize,
    /// Number of generations between recorded rows.
    pub gens_per_save: usize,
}

/// Optional sweep over one model parameter.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub param: SweepParam,
    pub values: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepParam {
    Benefit,
    Capacity,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Expand the configuration into one configuration per sweep point.
    ///
    /// Without a sweep the configuration itself is the only point.
    /// The returned configurations carry no sweep of their own.
    pub fn sweep_points(&self) -> Result<Vec<Config>> {
        let Some(sweep) = &self.sweep else {
            return Ok(vec![self.clone()]);
        };

        let mut points = Vec::with_capacity(sweep.values.len());
        for &value in &sweep.values {
            let mut point = self.clone();
            point.sweep = None;
            match sweep.param {
                SweepParam::Benefit => point.model.benefit = value,
                SweepParam::Capacity => point.model.capacity = value as usize,
            }
            point
                .validate()
                .with_context(|| format!("invalid sweep point {:?} = {value}", sweep.param))?;
            points.push(point);
        }

        Ok(points)
    }

    fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model parameters")?;

        check_num(self.init.freq_coop, 0.0..=1.0)
            .context("invalid initial cooperator frequency")?;

        check_num(self.output.gens_per_cycle, 1..100_000)
            .context("invalid number of generations per cycle")?;
        check_num(self.output.n_cycles, 1..100_000).context("invalid number of cycles")?;
        check_num(self.output.n_replicates, 1..10_000).context("invalid number of replicates")?;
        check_num(self.output.gens_per_save, 1..100_000)
            .context("invalid number of generations per save")?;

        if let Some(sweep) = &self.sweep {
            sweep.validate().context("invalid sweep")?;
        }

        Ok(())
    }
}

impl ModelConfig {
    /// Probability that an individual with `behavior` living in a group with
    /// cooperator frequency `freq` produces an offspring.
    ///
    /// The benefit term is scaled by `1 - rate_noncoop` for both behaviors.
    /// The value is not clamped.
    pub fn reprod_chance(&self, behavior: Behavior, freq: f64) -> f64 {
        let baseline = match behavior {
            Behavior::Cooperator => self.rate_coop,
            Behavior::NonCooperator => self.rate_noncoop,
        };
        baseline + freq * self.benefit * (1.0 - self.rate_noncoop)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.popsize, 1..1_000_000).context("invalid population size")?;
        // Every group must be non-empty after partitioning.
        check_num(self.n_subpop, 1..=self.popsize).context("invalid number of subpopulations")?;

        check_num(self.benefit, 0.0..=100.0).context("invalid benefit")?;
        check_num(self.rate_coop, 0.0..=1.0).context("invalid cooperator rate")?;
        check_num(self.rate_noncoop, 0.0..=1.0).context("invalid non-cooperator rate")?;
        check_num(self.prob_mut, 0.0..=1.0).context("invalid mutation probability")?;

        if self.popsize % self.n_subpop != 0 {
            // Partitioning keeps fewer than `popsize` individuals, so offspring
            // must make up the difference before the first resampling.
            if self.rate_coop == 0.0 && self.rate_noncoop == 0.0 && self.benefit == 0.0 {
                bail!(
                    "population size {} is not divisible by {} subpopulations and no individual can reproduce",
                    self.popsize,
                    self.n_subpop
                );
            }
            log::warn!(
                "population size {} is not divisible by {} subpopulations, {} individuals are dropped at every partition",
                self.popsize,
                self.n_subpop,
                self.popsize % self.n_subpop
            );
        }

        for behavior in [Behavior::Cooperator, Behavior::NonCooperator] {
            let chance = self.reprod_chance(behavior, 1.0);
            if chance > 1.0 {
                log::warn!(
                    "reproduction chance of {behavior:?} reaches {chance} and will be clamped to 1"
                );
            }
        }

        Ok(())
    }
}

impl SweepConfig {
    fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            bail!("sweep must have at least one value");
        }
        if self.param == SweepParam::Capacity {
            for &value in &self.values {
                if value < 0.0 || value.fract() != 0.0 {
                    bail!("capacity values must be non-negative integers, but one is {value}");
                }
            }
        }
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            model: ModelConfig {
                popsize: 10,
                n_subpop: 2,
                benefit: 0.0,
                rate_coop: 1.0,
                rate_noncoop: 1.0,
                capacity: 0,
                prob_mut: 0.0,
            },
            init: InitConfig {
                freq_coop: 1.0,
                seed: Some(0),
            },
            output: OutputConfig {
                gens_per_cycle: 4,
                n_cycles: 1,
                n_replicates: 1,
                gens_per_save: 1,
            },
            sweep: None,
        }
    }

    const CONFIG_TOML: &str = r#"
[model]
popsize = 100
n_subpop = 10
benefit = 0.8
rate_coop = 0.1
rate_noncoop = 0.125
capacity = 25
prob_mut = 0.01

[init]
freq_coop = 0.3

[output]
gens_per_cycle = 20
n_cycles = 20
n_replicates = 5
gens_per_save = 4

[sweep]
param = "capacity"
values = [0, 25, 50]
"#;

    #[test]
    fn parses_sectioned_toml() {
        let cfg = Config::from_toml(CONFIG_TOML).expect("failed to parse config");
        assert_eq!(cfg.model.popsize, 100);
        assert_eq!(cfg.model.capacity, 25);
        assert_eq!(cfg.init.seed, None);
        assert_eq!(cfg.output.gens_per_save, 4);
        let sweep = cfg.sweep.as_ref().expect("missing sweep");
        assert_eq!(sweep.param, SweepParam::Capacity);
        assert_eq!(sweep.values, vec![0.0, 25.0, 50.0]);
    }

    #[test]
    fn sweep_points_override_parameter() {
        let cfg = Config::from_toml(CONFIG_TOML).expect("failed to parse config");
        let points = cfg.sweep_points().expect("failed to expand sweep");
        let capacities: Vec<_> = points.iter().map(|p| p.model.capacity).collect();
        assert_eq!(capacities, vec![0, 25, 50]);
        assert!(points.iter().all(|p| p.sweep.is_none()));
        assert!(points.iter().all(|p| p.model.benefit == 0.8));
    }

    #[test]
    fn no_sweep_is_single_point() {
        let cfg = test_config();
        let points = cfg.sweep_points().expect("failed to expand sweep");
        assert_eq!(points, vec![cfg]);
    }

    #[test]
    fn rejects_more_subpops_than_individuals() {
        let mut cfg = test_config();
        cfg.model.n_subpop = 11;
        assert!(cfg.validate().is_err());
        cfg.model.n_subpop = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_indivisible_population_without_reproduction() {
        let mut cfg = test_config();
        cfg.model.n_subpop = 3;
        cfg.model.rate_coop = 0.0;
        cfg.model.rate_noncoop = 0.0;
        assert!(cfg.validate().is_err());

        cfg.model.n_subpop = 2;
        assert!(cfg.validate().is_ok());

        cfg.model.n_subpop = 3;
        cfg.model.rate_noncoop = 0.1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = test_config();
        cfg.model.prob_mut = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.output.gens_per_save = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.sweep = Some(SweepConfig {
            param: SweepParam::Capacity,
            values: vec![2.5],
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn benefit_is_scaled_by_noncoop_rate() {
        let mut cfg = test_config();
        cfg.model.benefit = 0.5;
        cfg.model.rate_coop = 0.1;
        cfg.model.rate_noncoop = 0.2;
        let coop = cfg.model.reprod_chance(Behavior::Cooperator, 0.5);
        let noncoop = cfg.model.reprod_chance(Behavior::NonCooperator, 0.5);
        assert!((coop - (0.1 + 0.5 * 0.5 * 0.8)).abs() < 1e-12);
        assert!((noncoop - (0.2 + 0.5 * 0.5 * 0.8)).abs() < 1e-12);
    }
}
