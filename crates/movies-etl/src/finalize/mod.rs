//! Foreign key installation after every table has been loaded.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{foreign_key_plan, TableName};
use crate::target::TargetWriter;

/// A constraint that could not be installed.
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintFailure {
    pub table: TableName,
    pub constraint: String,
    pub error: String,
}

/// Outcome of the finalize phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalizeReport {
    /// False when foreign key creation was turned off.
    pub attempted: bool,
    pub installed: Vec<String>,
    pub failed: Vec<ConstraintFailure>,
}

impl FinalizeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Install every foreign key of the catalogue, one at a time, in plan order.
///
/// A failed constraint is logged and recorded; the remaining ones are still
/// attempted.
pub async fn install_foreign_keys(writer: &dyn TargetWriter) -> FinalizeReport {
    let plan = foreign_key_plan();
    info!("Installing {} foreign keys", plan.len());

    let mut report = FinalizeReport {
        attempted: true,
        ..FinalizeReport::default()
    };

    for fk in &plan {
        debug!("Creating FK: {}.{}", fk.table, fk.name);
        match writer.install_foreign_key(fk).await {
            Ok(()) => report.installed.push(fk.name.clone()),
            Err(e) => {
                warn!("Failed to create FK {} on {}: {}", fk.name, fk.table, e);
                report.failed.push(ConstraintFailure {
                    table: fk.table,
                    constraint: fk.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Foreign keys: {} installed, {} failed",
        report.installed.len(),
        report.failed.len()
    );
    report
}
