//! Performance samples

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sample metadata: string keys to arbitrary JSON values
pub type Metadata = BTreeMap<String, Value>;

/// One measured value
///
/// Immutable once produced except for [`Sample::merge_metadata`], which
/// only ever adds keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Metric name (e.g., "Ops Throughput")
    pub metric: String,

    /// Measured value
    pub value: f64,

    /// Unit of `value`
    pub unit: String,

    /// Attribution metadata
    pub metadata: Metadata,

    /// When the sample was created
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Position in a time series, assigned by a [`SequenceCounter`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl Sample {
    /// Create a sample stamped with the current time
    pub fn new(
        metric: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            metric: metric.into(),
            value,
            unit: unit.into(),
            metadata,
            timestamp: chrono::Utc::now(),
            sequence: None,
        }
    }

    /// Attach a time-series position
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Add every key of `extra` not already present on this sample
    ///
    /// Existing keys always win, so merging the same map twice is the same
    /// as merging it once.
    pub fn merge_metadata(&mut self, extra: &Metadata) {
        for (key, value) in extra {
            self.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Monotonic sequence source for time-series samples
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    /// Counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next position
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
