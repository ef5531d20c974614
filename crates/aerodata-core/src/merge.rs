use serde::Serialize;
use tracing::info;

use crate::db::{quote_ident, DbPool};
use crate::error::{IngestError, MergeStage, Result};
use crate::lock::lock_table;
use crate::schema::{LiveColumn, LiveSchema};
use crate::tables::{ColumnKind, TargetTable};

/// Row counts produced by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub rows_updated: u64,
    pub rows_inserted: u64,
    pub rows_before: i64,
    pub rows_after: i64,
}

impl MergeResult {
    pub fn net_change(&self) -> i64 {
        self.rows_after - self.rows_before
    }
}

/// A staged column as it is read back into the target: `b."col"::<declared type>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MergeColumn {
    name: String,
    cast: Option<String>,
}

impl MergeColumn {
    fn from_live(column: &LiveColumn) -> Self {
        let cast = match column.kind() {
            ColumnKind::Other => None,
            _ => Some(column.data_type.clone()),
        };
        Self {
            name: column.name.clone(),
            cast,
        }
    }

    fn target(&self) -> String {
        quote_ident(&self.name)
    }

    fn staged(&self) -> String {
        match &self.cast {
            Some(cast) => format!("b.{}::{}", quote_ident(&self.name), cast),
            None => format!("b.{}", quote_ident(&self.name)),
        }
    }
}

/// Statements for an upsert of one staging table into its target, keyed on the
/// target's key tuple. Key comparison uses the target's declared key types.
#[derive(Debug, Clone)]
pub struct MergePlan {
    table: TargetTable,
    staging_table: String,
    keys: Vec<MergeColumn>,
    /// Staged columns common to both schemas, keys included.
    columns: Vec<MergeColumn>,
}

impl MergePlan {
    /// Fails with [`IngestError::MissingKeyColumn`] if a key was dropped during normalization.
    pub fn new(
        table: TargetTable,
        staging_table: &str,
        staged_columns: &[String],
        schema: &LiveSchema,
    ) -> Result<Self> {
        let profile = table.profile();
        let lookup = |name: &str| {
            staged_columns
                .iter()
                .any(|c| c == name)
                .then(|| schema.get(name))
                .flatten()
        };

        let mut keys = Vec::with_capacity(profile.key_columns.len());
        for key in profile.key_columns {
            let live = lookup(*key).ok_or_else(|| IngestError::MissingKeyColumn {
                table: profile.name,
                column: key.to_string(),
                available: staged_columns.to_vec(),
            })?;
            keys.push(MergeColumn::from_live(live));
        }

        let columns = staged_columns
            .iter()
            .filter_map(|name| lookup(name.as_str()))
            .map(MergeColumn::from_live)
            .collect();

        Ok(Self {
            table,
            staging_table: staging_table.to_string(),
            keys,
            columns,
        })
    }

    fn key_conditions(&self) -> String {
        self.keys
            .iter()
            .map(|key| format!("a.{} = {}", key.target(), key.staged()))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn update_columns(&self) -> Vec<&MergeColumn> {
        self.columns
            .iter()
            .filter(|column| !self.keys.iter().any(|key| key.name == column.name))
            .collect()
    }

    pub fn has_update_columns(&self) -> bool {
        !self.update_columns().is_empty()
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(self.table.table_name()))
    }

    pub fn update_sql(&self) -> String {
        let assignments: Vec<String> = self
            .update_columns()
            .iter()
            .map(|column| format!("{} = {}", column.target(), column.staged()))
            .collect();
        format!(
            "UPDATE {} AS a SET {} FROM {} AS b WHERE {}",
            quote_ident(self.table.table_name()),
            assignments.join(", "),
            quote_ident(&self.staging_table),
            self.key_conditions()
        )
    }

    /// Anti-join insert: a staged row is inserted only if no target row matches its full key.
    pub fn insert_sql(&self) -> String {
        let targets: Vec<String> = self.columns.iter().map(MergeColumn::target).collect();
        let values: Vec<String> = self.columns.iter().map(MergeColumn::staged).collect();
        let target = quote_ident(self.table.table_name());
        format!(
            "INSERT INTO {target} ({}) SELECT {} FROM {} AS b WHERE NOT EXISTS (SELECT 1 FROM {target} AS a WHERE {})",
            targets.join(", "),
            values.join(", "),
            quote_ident(&self.staging_table),
            self.key_conditions()
        )
    }

    /// Runs the update and insert passes in one transaction, holding the table lock
    /// from before the first count until commit.
    pub async fn execute(&self, pool: &DbPool) -> Result<MergeResult> {
        let table = self.table.table_name();
        let failed = |stage: MergeStage| {
            move |source: sqlx::Error| IngestError::MergeFailed {
                table,
                stage,
                source,
            }
        };

        let mut tx = pool.begin().await.map_err(failed(MergeStage::Lock))?;
        lock_table(&mut *tx, self.table)
            .await
            .map_err(failed(MergeStage::Lock))?;

        let count_sql = self.count_sql();
        let rows_before = sqlx::query_scalar::<_, i64>(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(failed(MergeStage::Count))?;

        let rows_updated = if self.has_update_columns() {
            sqlx::query(&self.update_sql())
                .execute(&mut *tx)
                .await
                .map_err(failed(MergeStage::Update))?
                .rows_affected()
        } else {
            0
        };
        info!(table, rows_updated, "update pass finished");

        let rows_inserted = sqlx::query(&self.insert_sql())
            .execute(&mut *tx)
            .await
            .map_err(failed(MergeStage::Insert))?
            .rows_affected();
        info!(table, rows_inserted, "insert pass finished");

        let rows_after = sqlx::query_scalar::<_, i64>(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(failed(MergeStage::Count))?;

        tx.commit().await.map_err(failed(MergeStage::Commit))?;

        Ok(MergeResult {
            rows_updated,
            rows_inserted,
            rows_before,
            rows_after,
        })
    }
}
