//! The five stages and the runner that sequences them. Stages share nothing
//! but the ledger file and the output folders, so each can also run alone.

use crate::config::AppConfig;
use crate::document::DocumentEditor;
use crate::errors::{PipelineError, StageError};
use crate::{backfill, execution, ingest, invoice, summary};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// New inbox certificates become ledger records.
    Ingest,
    /// Local-currency totals are copied back from the invoice reports.
    Backfill,
    /// Situacija reports get their cumulative figures.
    Invoice,
    /// Izvedeno reports get their quantities.
    Execution,
    /// A dated cumulative summary over all izvedeno reports.
    Summary,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Ingest,
        Stage::Backfill,
        Stage::Invoice,
        Stage::Execution,
        Stage::Summary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Backfill => "backfill",
            Stage::Invoice => "invoice",
            Stage::Execution => "execution",
            Stage::Summary => "summary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// Runs one stage to completion and logs what it did.
pub fn run_stage<E: DocumentEditor>(
    stage: Stage,
    config: &AppConfig,
    editor: &mut E,
) -> Result<(), StageError> {
    match stage {
        Stage::Ingest => {
            let report = ingest::run(config, editor)?;
            info!(
                "{} new records, {} files left for the next run",
                report.appended.len(),
                report.failed.len()
            );
            for (name, err) in &report.failed {
                warn!("  {}: {}", name, err);
            }
        }
        Stage::Backfill => {
            let report = backfill::run(config, editor)?;
            info!(
                "{} totals updated, {} reports missing",
                report.updated,
                report.missing.len()
            );
        }
        Stage::Invoice => {
            let report = invoice::run(config, editor)?;
            info!("{} reports filled, {} created", report.filled, report.created);
        }
        Stage::Execution => {
            let report = execution::run(config, editor)?;
            info!(
                "{} reports filled, {} created, {} placeholders resolved",
                report.filled, report.created, report.resolved
            );
        }
        Stage::Summary => {
            let report = summary::run(config, editor)?;
            info!("summed {} reports into {}", report.scanned, report.path.display());
        }
    }

    Ok(())
}

/// Runs the given stages in order, stopping at the first failure.
pub fn run_stages<E: DocumentEditor>(
    stages: &[Stage],
    config: &AppConfig,
    editor: &mut E,
) -> Result<(), PipelineError> {
    for &stage in stages {
        info!("=== Running: {} ===", stage);
        if let Err(source) = run_stage(stage, config, editor) {
            error!("Error in {}: {}", stage, source);
            return Err(PipelineError { stage, source });
        }
        info!("{} finished successfully", stage);
    }

    Ok(())
}

pub fn run_all<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<(), PipelineError> {
    run_stages(&Stage::ALL, config, editor)
}
