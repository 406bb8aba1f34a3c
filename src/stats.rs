use crate::model::Record;
use anyhow::{Result, bail};

/// Element-wise sum of replicate series sharing the same generation indices.
pub struct SeriesAccumulator {
    n_series: usize,
    sum: Vec<Record>,
}

impl SeriesAccumulator {
    pub fn new() -> Self {
        Self {
            n_series: 0,
            sum: Vec::new(),
        }
    }

    pub fn add(&mut self, records: &[Record]) -> Result<()> {
        if self.n_series == 0 {
            self.sum = records.to_vec();
            self.n_series = 1;
            return Ok(());
        }

        if records.len() != self.sum.len() {
            bail!(
                "series must have {} records, but has {}",
                self.sum.len(),
                records.len()
            );
        }
        for (acc, record) in self.sum.iter().zip(records) {
            if acc.generation != record.generation || acc.group.len() != record.group.len() {
                bail!(
                    "record of generation {} does not match generation {}",
                    record.generation,
                    acc.generation
                );
            }
        }

        for (acc, record) in self.sum.iter_mut().zip(records) {
            acc.global += record.global;
            acc.mean += record.mean;
            for (acc_freq, &freq) in acc.group.iter_mut().zip(&record.group) {
                *acc_freq += freq;
            }
        }
        self.n_series += 1;

        Ok(())
    }

    /// Average of all added series.
    pub fn report(&self) -> Result<Vec<Record>> {
        if self.n_series == 0 {
            bail!("no series were added");
        }
        let n_series = self.n_series as f64;
        let average = self
            .sum
            .iter()
            .map(|acc| Record {
                generation: acc.generation,
                global: acc.global / n_series,
                group: acc.group.iter().map(|freq| freq / n_series).collect(),
                mean: acc.mean / n_series,
            })
            .collect();
        Ok(average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(generation: usize, global: f64, group: Vec<f64>) -> Record {
        let mean = group.iter().sum::<f64>() / group.len() as f64;
        Record {
            generation,
            global,
            group,
            mean,
        }
    }

    #[test]
    fn averages_matching_generations() {
        let mut acc = SeriesAccumulator::new();
        acc.add(&[record(0, 0.2, vec![0.0, 0.4]), record(5, 0.6, vec![0.5, 0.5])])
            .expect("failed to add series");
        acc.add(&[record(0, 0.4, vec![0.2, 0.6]), record(5, 0.2, vec![0.1, 0.3])])
            .expect("failed to add series");

        let average = acc.report().expect("failed to report");
        assert_eq!(average.len(), 2);
        assert_eq!(average[0].generation, 0);
        assert_eq!(average[1].generation, 5);
        assert!((average[0].global - 0.3).abs() < 1e-12);
        assert!((average[0].group[0] - 0.1).abs() < 1e-12);
        assert!((average[0].group[1] - 0.5).abs() < 1e-12);
        assert!((average[0].mean - 0.3).abs() < 1e-12);
        assert!((average[1].global - 0.4).abs() < 1e-12);
        assert!((average[1].mean - 0.35).abs() < 1e-12);
    }

    #[test]
    fn single_series_is_its_own_average() {
        let series = vec![record(0, 1.0, vec![1.0, 1.0]), record(1, 1.0, vec![1.0, 1.0])];
        let mut acc = SeriesAccumulator::new();
        acc.add(&series).expect("failed to add series");
        assert_eq!(acc.report().expect("failed to report"), series);
    }

    #[test]
    fn rejects_mismatched_series() {
        let mut acc = SeriesAccumulator::new();
        acc.add(&[record(0, 0.5, vec![0.5])]).expect("failed to add series");
        assert!(acc.add(&[record(1, 0.5, vec![0.5])]).is_err());
        assert!(acc.add(&[]).is_err());
    }

    #[test]
    fn empty_accumulator_has_no_report() {
        assert!(SeriesAccumulator::new().report().is_err());
    }
}
