use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::IngestError;

/// Bi-hourly bucket columns shared by the Hirst station tables.
pub const BI_HOURLY_BUCKETS: [&str; 12] = [
    "00-02", "02-04", "04-06", "06-08", "08-10", "10-12", "12-14", "14-16", "16-18", "18-20",
    "20-22", "22-24",
];

/// Identity column present on every target table; never written by a merge.
pub const IDENTITY_COLUMN: &str = "id";

const LOCK_KEY_BASE: i64 = 0x4145_524F_0000; // "AERO"

/// Destination type family, derived from `information_schema.columns.data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Date,
    Timestamp,
    Text,
    Boolean,
    Other,
}

impl ColumnKind {
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "real" | "double precision" | "numeric" | "decimal" | "integer" | "smallint"
            | "bigint" => ColumnKind::Numeric,
            "date" => ColumnKind::Date,
            t if t.starts_with("timestamp") => ColumnKind::Timestamp,
            "text" | "character varying" | "character" => ColumnKind::Text,
            "boolean" => ColumnKind::Boolean,
            _ => ColumnKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> FixedColumn {
    FixedColumn { name, kind }
}

/// Static description of one target table.
#[derive(Debug)]
pub struct TableProfile {
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
    pub fixed_columns: &'static [FixedColumn],
    pub required_columns: &'static [&'static str],
    /// Source spellings accepted in place of the canonical column name.
    pub aliases: &'static [(&'static str, &'static str)],
    pub dynamic_date_columns: bool,
    /// Primary date key, indexed alongside the identity column.
    pub date_key: Option<&'static str>,
    pub secondary_index: Option<&'static str>,
}

impl TableProfile {
    pub fn identity_index(&self) -> String {
        format!("idx_id_{}", self.name)
    }

    /// Canonical name for a source column, after applying this table's aliases.
    pub fn canonical_name<'a>(&self, column: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(source, _)| *source == column)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(column)
    }

    pub fn missing_required<'a, I>(&self, columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = columns
            .into_iter()
            .map(|column| self.canonical_name(column))
            .collect();
        self.required_columns
            .iter()
            .filter(|required| !present.contains(required))
            .map(|required| required.to_string())
            .collect()
    }
}

macro_rules! bi_hourly_columns {
    ($station:literal) => {
        &[
            col($station, ColumnKind::Date),
            col("Particle", ColumnKind::Text),
            col("00-02", ColumnKind::Numeric),
            col("02-04", ColumnKind::Numeric),
            col("04-06", ColumnKind::Numeric),
            col("06-08", ColumnKind::Numeric),
            col("08-10", ColumnKind::Numeric),
            col("10-12", ColumnKind::Numeric),
            col("12-14", ColumnKind::Numeric),
            col("14-16", ColumnKind::Numeric),
            col("16-18", ColumnKind::Numeric),
            col("18-20", ColumnKind::Numeric),
            col("20-22", ColumnKind::Numeric),
            col("22-24", ColumnKind::Numeric),
            col("Daily Total", ColumnKind::Numeric),
            col("Pollen Factor", ColumnKind::Numeric),
            col("Spores Factor", ColumnKind::Numeric),
        ]
    };
}

static LTKLAI: TableProfile = TableProfile {
    name: "hirst_ltklai_bi_hourly_data",
    key_columns: &["LTKLAI", "Particle"],
    fixed_columns: bi_hourly_columns!("LTKLAI"),
    required_columns: &["LTKLAI"],
    aliases: &[],
    dynamic_date_columns: false,
    date_key: Some("LTKLAI"),
    secondary_index: Some("idx_ltklai"),
};

static LTSIAU: TableProfile = TableProfile {
    name: "hirst_ltsiau_bi_hourly_data",
    key_columns: &["LTSIAU", "Particle"],
    fixed_columns: bi_hourly_columns!("LTSIAU"),
    required_columns: &["LTSIAU"],
    aliases: &[],
    dynamic_date_columns: false,
    date_key: Some("LTSIAU"),
    secondary_index: Some("idx_ltsiau"),
};

static LTVILN: TableProfile = TableProfile {
    name: "hirst_ltviln_bi_hourly_data",
    key_columns: &["LTVILN", "Particle"],
    fixed_columns: bi_hourly_columns!("LTVILN"),
    required_columns: &["LTVILN"],
    aliases: &[],
    dynamic_date_columns: false,
    date_key: Some("LTVILN"),
    secondary_index: Some("idx_ltviln"),
};

static DAILY_TOTALS: TableProfile = TableProfile {
    name: "hirst_daily_particle_totals",
    key_columns: &["station", "particle"],
    fixed_columns: &[
        col("station", ColumnKind::Text),
        col("particle", ColumnKind::Text),
    ],
    required_columns: &["station", "particle"],
    aliases: &[("Station", "station"), ("Particle", "particle")],
    dynamic_date_columns: true,
    date_key: None,
    secondary_index: None,
};

static POLLEN_SENSE: TableProfile = TableProfile {
    name: "polen_sence_data",
    key_columns: &["time"],
    fixed_columns: &[
        col("time", ColumnKind::Timestamp),
        col("pollen", ColumnKind::Numeric),
        col("mold", ColumnKind::Numeric),
        col("plastic_particles", ColumnKind::Numeric),
    ],
    required_columns: &["time", "pollen"],
    aliases: &[],
    dynamic_date_columns: false,
    date_key: None,
    secondary_index: None,
};

/// The closed set of tables this engine writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTable {
    LtklaiBiHourly,
    LtsiauBiHourly,
    LtvilnBiHourly,
    DailyParticleTotals,
    PollenSense,
}

impl TargetTable {
    pub const ALL: [TargetTable; 5] = [
        TargetTable::LtklaiBiHourly,
        TargetTable::LtsiauBiHourly,
        TargetTable::LtvilnBiHourly,
        TargetTable::DailyParticleTotals,
        TargetTable::PollenSense,
    ];

    /// Bi-hourly tables in classification fallback order.
    pub const STATIONS: [TargetTable; 3] = [
        TargetTable::LtklaiBiHourly,
        TargetTable::LtsiauBiHourly,
        TargetTable::LtvilnBiHourly,
    ];

    pub fn profile(&self) -> &'static TableProfile {
        match self {
            TargetTable::LtklaiBiHourly => &LTKLAI,
            TargetTable::LtsiauBiHourly => &LTSIAU,
            TargetTable::LtvilnBiHourly => &LTVILN,
            TargetTable::DailyParticleTotals => &DAILY_TOTALS,
            TargetTable::PollenSense => &POLLEN_SENSE,
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.profile().name
    }

    /// Station column of a bi-hourly table.
    pub fn station_column(&self) -> Option<&'static str> {
        match self {
            TargetTable::LtklaiBiHourly => Some("LTKLAI"),
            TargetTable::LtsiauBiHourly => Some("LTSIAU"),
            TargetTable::LtvilnBiHourly => Some("LTVILN"),
            _ => None,
        }
    }

    /// Advisory lock key serialising ingestions into this table.
    pub fn lock_key(&self) -> i64 {
        let ordinal = Self::ALL
            .iter()
            .position(|table| table == self)
            .unwrap_or_default();
        LOCK_KEY_BASE + ordinal as i64
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for TargetTable {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|table| table.table_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IngestError::UnknownTable(wanted.to_string()))
    }
}

impl Serialize for TargetTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.table_name())
    }
}
