use std::{fmt, fs::OpenOptions, io::Write, path::Path};

use anyhow::{Context, Result};
use wumpus_core::{EpisodeEnd, EpisodeSummary};

/// Totals over every finished episode of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    episodes: usize,
    rounds: usize,
    deaths: usize,
    explored: usize,
    stuck: usize,
    gold_found: usize,
}

impl Statistics {
    pub fn record(&mut self, summary: &EpisodeSummary) {
        self.episodes += 1;
        self.rounds += summary.rounds;
        self.deaths += summary.deaths;
        self.explored += summary.explored;
        match summary.end {
            EpisodeEnd::Stuck => self.stuck += 1,
            EpisodeEnd::GoldFound { .. } => self.gold_found += 1,
            EpisodeEnd::AllDead | EpisodeEnd::RoundLimit => {}
        }
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    fn average(&self, total: usize) -> f64 {
        total as f64 / self.episodes as f64
    }

    /// Writes the report to `path`. An existing file is never overwritten.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Failed to create statistics file {}", path.display()))?;
        write!(file, "{self}")
            .with_context(|| format!("Failed to write statistics file {}", path.display()))?;
        Ok(())
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Totals:")?;
        writeln!(f, "   episodes: {}", self.episodes)?;
        writeln!(f, "   rounds: {}", self.rounds)?;
        writeln!(f, "   deaths: {}", self.deaths)?;
        writeln!(f, "   explored cells: {}", self.explored)?;
        writeln!(f, "   stuck episodes: {}", self.stuck)?;
        writeln!(f, "   gold found: {}", self.gold_found)?;
        if self.episodes == 0 {
            return Ok(());
        }
        writeln!(f, "Averages per episode:")?;
        writeln!(f, "   rounds: {:.2}", self.average(self.rounds))?;
        writeln!(f, "   deaths: {:.2}", self.average(self.deaths))?;
        writeln!(f, "   explored cells: {:.2}", self.average(self.explored))?;
        Ok(())
    }
}
