use crate::config::Config;
use crate::model::Record;
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Destination of the series produced by a run.
pub trait Sink {
    fn save_replicate(&mut self, i_rep: usize, records: &[Record]) -> Result<()>;
    fn save_average(&mut self, records: &[Record]) -> Result<()>;
}

/// Contents of an output file: the effective configuration and its series.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub cfg: Config,
    pub records: Vec<Record>,
}

/// Sink writing MessagePack files into a run directory.
pub struct FileSink {
    run_dir: PathBuf,
    cfg: Config,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(run_dir: P, cfg: Config) -> Self {
        Self {
            run_dir: run_dir.as_ref().to_path_buf(),
            cfg,
        }
    }

    pub fn replicate_file(&self, i_rep: usize) -> PathBuf {
        self.run_dir.join(format!("replicate-{i_rep:04}.msgpack"))
    }

    pub fn average_file(&self) -> PathBuf {
        self.run_dir.join("average.msgpack")
    }

    fn write(&self, file: &Path, records: &[Record]) -> Result<()> {
        let series = Series {
            cfg: self.cfg.clone(),
            records: records.to_vec(),
        };

        let handle = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(handle);
        encode::write(&mut writer, &series).context("failed to serialize series")?;
        writer.flush().context("failed to flush writer stream")?;

        log::debug!("wrote {file:?}");
        Ok(())
    }
}

impl Sink for FileSink {
    fn save_replicate(&mut self, i_rep: usize, records: &[Record]) -> Result<()> {
        self.write(&self.replicate_file(i_rep), records)
    }

    fn save_average(&mut self, records: &[Record]) -> Result<()> {
        self.write(&self.average_file(), records)
    }
}
