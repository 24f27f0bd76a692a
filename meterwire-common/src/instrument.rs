//! Instrument kinds and the aggregation/temporality policy values an export
//! client resolves for its pipeline.
//!
//! Selectors are plain function pointers: pure, configuration-supplied, and
//! immutable once a client is constructed. They stay valid for the whole
//! process lifetime, independent of any connection state.

use serde::{Deserialize, Serialize};

/// The kind of instrument a metric stream originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
    ObservableCounter,
    ObservableUpDownCounter,
    ObservableGauge,
}

impl InstrumentKind {
    /// Get the string representation used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up_down_counter",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::ObservableCounter => "observable_counter",
            InstrumentKind::ObservableUpDownCounter => "observable_up_down_counter",
            InstrumentKind::ObservableGauge => "observable_gauge",
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregation temporality reported for an instrument kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    /// Totals since a fixed start time.
    Cumulative,
    /// Changes since the previous report.
    Delta,
}

/// Aggregation strategy applied to an instrument kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Drop all data for the instrument.
    Drop,
    /// Arithmetic sum.
    Sum,
    /// Last reported value.
    LastValue,
    /// Histogram with explicit bucket boundaries.
    ExplicitBucketHistogram {
        boundaries: Vec<f64>,
        record_min_max: bool,
    },
}

/// Pure function resolving the temporality for an instrument kind.
pub type TemporalitySelector = fn(InstrumentKind) -> Temporality;

/// Pure function resolving the aggregation for an instrument kind.
pub type AggregationSelector = fn(InstrumentKind) -> Aggregation;

/// Default temporality: cumulative for every instrument kind.
pub fn default_temporality(_kind: InstrumentKind) -> Temporality {
    Temporality::Cumulative
}

/// Default aggregation per instrument kind: sums for additive instruments,
/// last-value for gauges, and the standard explicit bucket boundaries for
/// histograms.
pub fn default_aggregation(kind: InstrumentKind) -> Aggregation {
    match kind {
        InstrumentKind::Counter
        | InstrumentKind::UpDownCounter
        | InstrumentKind::ObservableCounter
        | InstrumentKind::ObservableUpDownCounter => Aggregation::Sum,
        InstrumentKind::ObservableGauge => Aggregation::LastValue,
        InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
            boundaries: vec![
                0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0,
                5000.0, 7500.0, 10000.0,
            ],
            record_min_max: true,
        },
    }
}
