//! Metric model: typed values, merge rules and the dump record format.

use crate::core::error::{Result, RunmonError};
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Kind of a metric. Closed set, never extended at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Point-in-time measurement, the latest write wins.
    Gauge,
    /// Accumulating measurement, updates add to the stored value.
    Counter,
}

impl MetricType {
    /// Wire and storage name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }

    /// Parse a textual measurement (`%f` for gauges, `%d` for counters).
    pub fn parse_value(&self, text: &str) -> Result<MetricValue> {
        match self {
            MetricType::Gauge => match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(MetricValue::Gauge(v)),
                Ok(_) => Err(RunmonError::validation(format!("gauge '{}' is not finite", text))),
                Err(e) => Err(RunmonError::parse(format!(
                    "can't parse gauge from '{}': {}",
                    text, e
                ))),
            },
            MetricType::Counter => text.parse::<i64>().map(MetricValue::Counter).map_err(|e| {
                RunmonError::parse(format!("can't parse counter from '{}': {}", text, e))
            }),
        }
    }
}

impl FromStr for MetricType {
    type Err = RunmonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            other => Err(RunmonError::unknown_type(other)),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement payload tagged with its type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    /// Type tag of this value.
    pub fn kind(&self) -> MetricType {
        match self {
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Counter(_) => MetricType::Counter,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Counter(_) => None,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            MetricValue::Gauge(_) => None,
        }
    }

    /// Combine a stored value with an incoming one.
    ///
    /// Gauges are replaced, counters are summed. Mixing types is rejected,
    /// a stored value is never reinterpreted under another type.
    pub fn merge(self, incoming: MetricValue) -> Result<MetricValue> {
        match (self, incoming) {
            (MetricValue::Gauge(_), MetricValue::Gauge(new)) => Ok(MetricValue::Gauge(new)),
            (MetricValue::Counter(old), MetricValue::Counter(delta)) => old
                .checked_add(delta)
                .map(MetricValue::Counter)
                .ok_or_else(|| {
                    RunmonError::validation(format!("counter overflow: {} + {}", old, delta))
                }),
            (stored, incoming) => Err(RunmonError::validation(format!(
                "type mismatch: stored {} can't merge {}",
                stored.kind(),
                incoming.kind()
            ))),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{:.3}", v),
            MetricValue::Counter(v) => write!(f, "{}", v),
        }
    }
}

/// A named measurement. Identity is the `(id, type)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "DumpRecord")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

/// A batch of metrics with no ordering guarantee.
pub type MetricList = Vec<Metric>;

impl Metric {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self::new(id, MetricValue::Counter(delta))
    }

    pub fn kind(&self) -> MetricType {
        self.value.kind()
    }

    /// Reject metrics that can never be stored.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RunmonError::validation("metric ID is empty"));
        }
        if let MetricValue::Gauge(v) = self.value {
            if !v.is_finite() {
                return Err(RunmonError::validation(format!(
                    "gauge '{}' is not finite",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Apply `incoming` on top of this stored metric.
    pub fn merge(&self, incoming: &Metric) -> Result<Metric> {
        if self.id != incoming.id {
            return Err(RunmonError::validation(format!(
                "can't merge metric '{}' into '{}'",
                incoming.id, self.id
            )));
        }
        Ok(Metric::new(self.id.clone(), self.value.merge(incoming.value)?))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind(), self.id, self.value)
    }
}

/// Group a list by metric type.
pub fn split_by_type(list: &[Metric]) -> HashMap<MetricType, MetricList> {
    let mut groups: HashMap<MetricType, MetricList> = HashMap::new();
    for metric in list {
        groups.entry(metric.kind()).or_default().push(metric.clone());
    }
    groups
}

/// Sort by the `<type>/<id>/<value>` rendering, used by listings.
pub fn sort_by_display(list: &mut [Metric]) {
    list.sort_by_cached_key(ToString::to_string);
}

/// One line of the JSON-lines dump: `{"ID":..,"Type":..,"Value":..}`.
#[derive(Deserialize)]
struct DumpRecord {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Type")]
    kind: MetricType,
    #[serde(rename = "Value")]
    value: serde_json::Number,
}

impl TryFrom<DumpRecord> for Metric {
    type Error = RunmonError;

    fn try_from(record: DumpRecord) -> Result<Self> {
        let value = match record.kind {
            MetricType::Gauge => record.value.as_f64().map(MetricValue::Gauge),
            MetricType::Counter => record.value.as_i64().map(MetricValue::Counter),
        }
        .ok_or_else(|| {
            RunmonError::validation(format!(
                "value {} is not a valid {} measurement",
                record.value, record.kind
            ))
        })?;
        Ok(Metric::new(record.id, value))
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("Metric", 3)?;
        record.serialize_field("ID", &self.id)?;
        record.serialize_field("Type", &self.kind())?;
        match self.value {
            MetricValue::Gauge(v) if !v.is_finite() => {
                return Err(S::Error::custom(format!("gauge '{}' is not finite", self.id)));
            },
            MetricValue::Gauge(v) => record.serialize_field("Value", &v)?,
            MetricValue::Counter(v) => record.serialize_field("Value", &v)?,
        }
        record.end()
    }
}
