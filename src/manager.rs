use crate::config::Config;
use crate::engine::Engine;
use crate::output::FileSink;
use anyhow::{Context, Result, bail};
use glob::glob;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Run every sweep point, one run directory per point.
    pub fn run_sim(&self) -> Result<()> {
        let n_runs = self.run_dirs().context("failed to list run dirs")?.len();
        if n_runs > 0 {
            bail!("{:?} already contains {n_runs} run dirs", self.sim_dir);
        }

        let points = self
            .cfg
            .sweep_points()
            .context("failed to expand sweep points")?;

        let mut rng = match self.cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        for (run_idx, cfg) in points.into_iter().enumerate() {
            let run_dir = self.run_dir(run_idx);
            fs::create_dir_all(&run_dir)
                .with_context(|| format!("failed to create {run_dir:?}"))?;
            log::info!(
                "running {run_dir:?} with benefit = {} and capacity = {}",
                cfg.model.benefit,
                cfg.model.capacity
            );

            // Every run gets its own stream derived from the master generator.
            let mut sink = FileSink::new(&run_dir, cfg.clone());
            let mut engine = Engine::new(cfg, ChaCha12Rng::from_rng(&mut rng));

            let start = Instant::now();
            let average = engine
                .run_replicates(&mut sink)
                .with_context(|| format!("failed to run {run_dir:?}"))?;

            if let Some(last) = average.last() {
                log::info!(
                    "average cooperator frequency at generation {}: global = {:.4}, mean of groups = {:.4}",
                    last.generation,
                    last.global,
                    last.mean
                );
            }
            log::info!(
                "finished {} replicates in {:.3?}",
                engine.cfg().output.n_replicates,
                start.elapsed()
            );
        }

        Ok(())
    }

    /// Remove all run directories.
    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }
        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(run_dirs)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }
}
