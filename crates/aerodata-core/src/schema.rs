use sqlx::Row;
use tracing::{info, warn};

use crate::dataset::{iso_date_name, parse_date, Dataset};
use crate::db::{quote_ident, DbPool};
use crate::error::{IngestError, Result};
use crate::tables::{ColumnKind, TargetTable, IDENTITY_COLUMN};

/// Declared type of a newly observed date column on the wide table.
pub const DATE_COLUMN_TYPE: &str = "real";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `real` or `timestamp without time zone`.
    pub data_type: String,
}

impl LiveColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_data_type(&self.data_type)
    }
}

/// Persisted columns of a target table, identity column excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    columns: Vec<LiveColumn>,
}

impl LiveSchema {
    pub fn new(columns: Vec<LiveColumn>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .filter(|column| column.name != IDENTITY_COLUMN)
                .collect(),
        }
    }

    pub async fn fetch(pool: &DbPool, table: TargetTable) -> Result<Self> {
        let rows = sqlx::query(
            r#"
                SELECT column_name::text AS column_name, data_type::text AS data_type
                FROM information_schema.columns
                WHERE table_schema = current_schema() AND table_name = $1
                ORDER BY ordinal_position
            "#,
        )
        .bind(table.table_name())
        .fetch_all(pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(LiveColumn::new(
                row.try_get::<String, _>("column_name")?,
                row.try_get::<String, _>("data_type")?,
            ));
        }
        Ok(Self::new(columns))
    }

    pub fn columns(&self) -> &[LiveColumn] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn push(&mut self, column: LiveColumn) {
        if !self.contains(&column.name) {
            self.columns.push(column);
        }
    }
}

/// Outcome of reconciling one dataset against its table's live schema.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub schema: LiveSchema,
    pub added_columns: Vec<String>,
}

/// Date-named columns of the dataset, renamed in place to their ISO form.
///
/// A column is left under its source name when the ISO name is already taken.
pub fn canonicalize_date_columns(dataset: &mut Dataset) -> Result<Vec<String>> {
    let mut dated = Vec::new();
    for name in dataset.column_names() {
        let Some(date) = parse_date(&name) else {
            continue;
        };
        let iso = iso_date_name(date);
        if iso != name {
            if dataset.has_column(&iso) {
                warn!(column = %name, iso = %iso, "duplicate date column ignored");
                continue;
            }
            dataset.rename(&name, &iso)?;
        }
        dated.push(iso);
    }
    Ok(dated)
}

/// Date columns present in the dataset but not yet in the live schema.
pub fn missing_date_columns(dated: &[String], schema: &LiveSchema) -> Vec<String> {
    dated
        .iter()
        .filter(|name| !schema.contains(name))
        .cloned()
        .collect()
}

pub fn add_column_sql(table: TargetTable, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(table.table_name()),
        quote_ident(column),
        DATE_COLUMN_TYPE
    )
}

/// Profile columns, keys included, that the persisted table lacks.
pub fn missing_fixed_columns(table: TargetTable, schema: &LiveSchema) -> Vec<String> {
    table
        .profile()
        .fixed_columns
        .iter()
        .filter(|column| !schema.contains(column.name))
        .map(|column| column.name.to_string())
        .collect()
}

/// Fetches the live schema, which must cover every fixed column of the profile, and,
/// on the wide table, appends any newly observed date
/// columns. Growth is additive and safe to repeat.
pub async fn reconcile(
    pool: &DbPool,
    table: TargetTable,
    dataset: &mut Dataset,
) -> Result<Reconciliation> {
    let mut schema = LiveSchema::fetch(pool, table).await?;
    let profile = table.profile();

    let missing = missing_fixed_columns(table, &schema);
    if !missing.is_empty() {
        return Err(IngestError::SchemaMismatch {
            table: profile.name,
            missing,
        });
    }

    let mut added_columns = Vec::new();
    if profile.dynamic_date_columns {
        let dated = canonicalize_date_columns(dataset)?;
        for column in missing_date_columns(&dated, &schema) {
            sqlx::query(&add_column_sql(table, &column))
                .execute(pool)
                .await
                .map_err(|source| IngestError::SchemaEvolutionFailed {
                    table: profile.name,
                    column: column.clone(),
                    source,
                })?;
            info!(table = %table, column = %column, "added new date column");
            schema.push(LiveColumn::new(column.clone(), DATE_COLUMN_TYPE));
            added_columns.push(column);
        }
    }

    Ok(Reconciliation {
        schema,
        added_columns,
    })
}
