//! JSON wire format shared by the agent client and the monitor API.

pub mod signing;

use crate::core::{Metric, MetricType, MetricValue, Result, RunmonError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use signing::{sign, verify};

/// Wire representation of a metric.
///
/// Exactly one of `delta` or `value` is expected, chosen by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metrics {
    /// Request body for a point read.
    pub fn query(id: impl Into<String>, kind: MetricType) -> Self {
        Self {
            id: id.into(),
            mtype: kind.as_str().to_string(),
            delta: None,
            value: None,
            hash: None,
        }
    }

    pub fn metric_type(&self) -> Result<MetricType> {
        self.mtype.parse()
    }

    /// Run the given checks in order, stopping at the first failure.
    pub fn validate(&self, checks: &[&dyn Fn(&Metrics) -> Result<()>]) -> Result<()> {
        checks.iter().try_for_each(|check| check(self))
    }

    /// Checks applied to incoming updates.
    pub fn validate_update(&self, key: Option<&str>) -> Result<()> {
        let hash_check = check_hash(key);
        let checks: [&dyn Fn(&Metrics) -> Result<()>; 4] =
            [&check_id, &check_type, &check_value, &hash_check];
        self.validate(&checks)
    }

    /// Convert to the domain model. A missing measurement is an error.
    pub fn to_metric(&self) -> Result<Metric> {
        let value = match self.metric_type()? {
            MetricType::Gauge => self.value.map(MetricValue::Gauge),
            MetricType::Counter => self.delta.map(MetricValue::Counter),
        }
        .ok_or_else(|| missing_measure(self))?;
        Ok(Metric::new(self.id.clone(), value))
    }
}

impl From<&Metric> for Metrics {
    fn from(metric: &Metric) -> Self {
        let mut wire = Metrics::query(metric.id.clone(), metric.kind());
        match metric.value {
            MetricValue::Gauge(v) => wire.value = Some(v),
            MetricValue::Counter(v) => wire.delta = Some(v),
        }
        wire
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.delta, self.value) {
            (Some(delta), _) => write!(f, "{}/{}/{}", self.id, self.mtype, delta),
            (None, Some(value)) => write!(f, "{}/{}/{}", self.id, self.mtype, value),
            (None, None) => write!(f, "{}/{}/<none>", self.id, self.mtype),
        }
    }
}

fn missing_measure(metrics: &Metrics) -> RunmonError {
    let field = if metrics.mtype == MetricType::Counter.as_str() { "delta" } else { "value" };
    RunmonError::validation(format!(
        "for type {} [{}] must not be empty",
        metrics.mtype, field
    ))
}

pub fn check_id(metrics: &Metrics) -> Result<()> {
    if metrics.id.is_empty() {
        return Err(RunmonError::validation("metric ID is empty"));
    }
    Ok(())
}

pub fn check_type(metrics: &Metrics) -> Result<()> {
    metrics.metric_type().map(|_| ())
}

pub fn check_value(metrics: &Metrics) -> Result<()> {
    let present = match metrics.metric_type() {
        Ok(MetricType::Gauge) => match metrics.value {
            Some(v) if !v.is_finite() => {
                return Err(RunmonError::validation(format!(
                    "gauge '{}' is not finite",
                    metrics.id
                )));
            },
            value => value.is_some(),
        },
        Ok(MetricType::Counter) => metrics.delta.is_some(),
        // Left to check_type.
        Err(_) => true,
    };
    if present {
        Ok(())
    } else {
        Err(missing_measure(metrics))
    }
}

/// Signature check, a no-op when no key is configured.
pub fn check_hash(key: Option<&str>) -> impl Fn(&Metrics) -> Result<()> + '_ {
    move |metrics| match key.filter(|k| !k.is_empty()) {
        Some(key) => verify(metrics, key),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_encoding_skips_absent_fields() {
        let json = serde_json::to_string(&Metrics::from(&Metric::counter("PollCount", 2))).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":2}"#);

        let json = serde_json::to_string(&Metrics::from(&Metric::gauge("Alloc", 0.5))).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":0.5}"#);
    }

    #[test]
    fn test_to_metric() {
        let wire: Metrics = serde_json::from_str(r#"{"id":"hits","type":"counter","delta":5}"#).unwrap();
        assert_eq!(wire.to_metric().unwrap(), Metric::counter("hits", 5));

        let wire: Metrics = serde_json::from_str(r#"{"id":"hits","type":"counter","value":5}"#).unwrap();
        assert!(wire.to_metric().is_err());
    }

    #[test]
    fn test_validators() {
        let unknown: Metrics = serde_json::from_str(r#"{"id":"x","type":"histogram","value":1}"#).unwrap();
        assert!(matches!(check_type(&unknown), Err(RunmonError::UnknownType(_))));
        assert!(check_value(&unknown).is_ok());

        let empty_id: Metrics = serde_json::from_str(r#"{"id":"","type":"gauge","value":1}"#).unwrap();
        assert!(check_id(&empty_id).is_err());

        let no_value: Metrics = serde_json::from_str(r#"{"id":"g","type":"gauge"}"#).unwrap();
        assert!(check_value(&no_value).is_err());

        let infinite = Metrics::from(&Metric::gauge("g", f64::INFINITY));
        assert!(matches!(check_value(&infinite), Err(RunmonError::Validation(_))));
    }

    #[test]
    fn test_validate_update_with_key() {
        let mut wire = Metrics::from(&Metric::gauge("temp", 19.0));
        assert!(wire.validate_update(None).is_ok());
        assert!(wire.validate_update(Some("")).is_ok());
        assert!(wire.validate_update(Some("secret")).is_err());

        sign(&mut wire, "secret").unwrap();
        assert!(wire.validate_update(Some("secret")).is_ok());
    }
}
