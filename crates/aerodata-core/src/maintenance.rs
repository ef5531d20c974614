use serde::Serialize;
use tracing::{info, warn};

use crate::db::{quote_ident, DbPool};
use crate::error::IngestError;
use crate::tables::{TargetTable, IDENTITY_COLUMN};

/// Best-effort step whose failure never changes the ingestion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStep {
    IdentityIndex,
    DateKeyIndex,
    Cluster,
    StagingCleanup,
}

impl MaintenanceStep {
    pub fn label(&self) -> &'static str {
        match self {
            MaintenanceStep::IdentityIndex => "identity index",
            MaintenanceStep::DateKeyIndex => "date key index",
            MaintenanceStep::Cluster => "clustering",
            MaintenanceStep::StagingCleanup => "staging cleanup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Failed { message: String },
}

/// Informational note collected into the ingestion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceNote {
    pub step: MaintenanceStep,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl MaintenanceNote {
    pub fn applied(step: MaintenanceStep) -> Self {
        Self {
            step,
            outcome: Outcome::Applied,
        }
    }

    pub fn failed(step: MaintenanceStep, error: &IngestError) -> Self {
        Self {
            step,
            outcome: Outcome::Failed {
                message: error.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

pub fn identity_index_sql(table: TargetTable) -> String {
    let profile = table.profile();
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&profile.identity_index()),
        quote_ident(profile.name),
        quote_ident(IDENTITY_COLUMN)
    )
}

pub fn date_key_index_sql(table: TargetTable) -> Option<String> {
    let profile = table.profile();
    let (index, column) = profile.secondary_index.zip(profile.date_key)?;
    Some(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(index),
        quote_ident(profile.name),
        quote_ident(column)
    ))
}

pub fn cluster_sql(table: TargetTable) -> [String; 2] {
    let profile = table.profile();
    let name = quote_ident(profile.name);
    let index = quote_ident(&profile.identity_index());
    [
        format!("CLUSTER {name} USING {index}"),
        format!("ALTER TABLE {name} CLUSTER ON {index}"),
    ]
}

async fn run(pool: &DbPool, table: TargetTable, step: MaintenanceStep, sql: &[String]) -> MaintenanceNote {
    for statement in sql {
        if let Err(err) = sqlx::query(statement).execute(pool).await {
            let error = IngestError::MaintenanceFailed {
                table: table.table_name(),
                step: step.label().to_string(),
                message: err.to_string(),
            };
            warn!(table = %table, step = step.label(), error = %err, "maintenance step skipped");
            return MaintenanceNote::failed(step, &error);
        }
    }
    MaintenanceNote::applied(step)
}

/// Creates the identity index and, for bi-hourly tables, the date key index.
pub async fn ensure_indexes(pool: &DbPool, table: TargetTable) -> Vec<MaintenanceNote> {
    let mut notes = vec![run(pool, table, MaintenanceStep::IdentityIndex, &[identity_index_sql(table)]).await];
    if let Some(sql) = date_key_index_sql(table) {
        notes.push(run(pool, table, MaintenanceStep::DateKeyIndex, &[sql]).await);
    }
    notes
}

/// Physically orders the table by its identity index.
pub async fn cluster(pool: &DbPool, table: TargetTable) -> MaintenanceNote {
    let note = run(pool, table, MaintenanceStep::Cluster, &cluster_sql(table)).await;
    if !note.is_failure() {
        info!(table = %table, "table clustered by id");
    }
    note
}
