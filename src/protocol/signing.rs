//! HMAC-SHA256 signing of wire payloads.
//!
//! The signed text is `<id>:counter:<delta>` or `<id>:gauge:<value>` with the
//! gauge rendered to six fractional digits. Both sides must produce it
//! byte-for-byte.

use super::Metrics;
use crate::core::{MetricType, Result, RunmonError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Canonical text covered by the signature.
pub fn canonical_string(metrics: &Metrics) -> Result<String> {
    match metrics.metric_type()? {
        MetricType::Counter => {
            let delta = metrics.delta.ok_or_else(|| {
                RunmonError::validation(format!("can't sign counter '{}' without delta", metrics.id))
            })?;
            Ok(format!("{}:counter:{}", metrics.id, delta))
        },
        MetricType::Gauge => {
            let value = metrics.value.ok_or_else(|| {
                RunmonError::validation(format!("can't sign gauge '{}' without value", metrics.id))
            })?;
            Ok(format!("{}:gauge:{:.6}", metrics.id, value))
        },
    }
}

fn mac(key: &str, metrics: &Metrics) -> Result<HmacSha256> {
    let data = canonical_string(metrics)?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| RunmonError::signature(format!("invalid key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac)
}

/// Hex-encoded HMAC of the payload.
pub fn compute_hash(metrics: &Metrics, key: &str) -> Result<String> {
    Ok(hex::encode(mac(key, metrics)?.finalize().into_bytes()))
}

/// Fill `metrics.hash`.
pub fn sign(metrics: &mut Metrics, key: &str) -> Result<()> {
    metrics.hash = Some(compute_hash(metrics, key)?);
    Ok(())
}

/// Check `metrics.hash` in constant time. A missing hash is a failure.
pub fn verify(metrics: &Metrics, key: &str) -> Result<()> {
    let hash = metrics
        .hash
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RunmonError::signature(format!("metric '{}' is not signed", metrics.id)))?;
    let expected = hex::decode(hash)
        .map_err(|e| RunmonError::signature(format!("can't decode packet hash: {}", e)))?;
    mac(key, metrics)?
        .verify_slice(&expected)
        .map_err(|_| RunmonError::signature(format!("hash mismatch for metric '{}'", metrics.id)))
}
