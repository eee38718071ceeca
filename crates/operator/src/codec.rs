//! Conversion between the watch layer's untyped `DynamicObject` and the typed
//! [`TFJob`].
//!
//! Decoding is structural first (serde) and semantic second
//! ([`validate_spec`]). Nothing here logs; callers report failures.

use kube::api::DynamicObject;

use crate::crd::{validate_spec, TFJob, TFJobSpec};
use crate::{Error, Result};

/// A payload that could not be turned into a valid job.
///
/// `job` is the best-effort typed value: the decoded job when only validation
/// failed, or the object's metadata with an empty spec when the payload was
/// structurally wrong. It is always suitable for attaching events to.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub job: Box<TFJob>,
    pub reason: String,
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::FailedMarshal(err.reason)
    }
}

pub fn decode(obj: &DynamicObject) -> std::result::Result<TFJob, DecodeError> {
    let metadata_only = || TFJob {
        metadata: obj.metadata.clone(),
        spec: TFJobSpec::default(),
        status: None,
    };

    let value = serde_json::to_value(obj).map_err(|e| DecodeError {
        job: Box::new(metadata_only()),
        reason: e.to_string(),
    })?;
    let job: TFJob = serde_json::from_value(value).map_err(|e| DecodeError {
        job: Box::new(metadata_only()),
        reason: e.to_string(),
    })?;

    if let Err(e) = validate_spec(&job.spec) {
        return Err(DecodeError {
            job: Box::new(job),
            reason: e.to_string(),
        });
    }
    Ok(job)
}

/// Overwrites `target` with the flattened form of `job`.
pub fn encode(job: &TFJob, target: &mut DynamicObject) -> Result<()> {
    let value = serde_json::to_value(job).map_err(|e| Error::Encode(e.to_string()))?;
    *target = serde_json::from_value(value).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(())
}
