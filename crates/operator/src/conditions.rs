use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::crd::{TFJob, TFJobCondition, TFJobConditionType};
use crate::{Error, Result};

pub const TFJOB_CREATED_REASON: &str = "TFJobCreated";

/// Appends a condition stamped with the current time.
pub fn append_condition(
    job: &mut TFJob,
    condition_type: TFJobConditionType,
    reason: &str,
    message: &str,
) -> Result<()> {
    append_condition_at(job, condition_type, reason, message, Utc::now())
}

/// Appends a condition stamped with `now`.
///
/// Existing conditions are never touched. Fails if `now` is earlier than the
/// newest recorded condition.
pub fn append_condition_at(
    job: &mut TFJob,
    condition_type: TFJobConditionType,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let status = job.status.get_or_insert_with(Default::default);

    if let Some(last) = status.conditions.last() {
        if now < last.last_update_time.0 {
            return Err(Error::ConditionOrder(format!(
                "{:?} condition at {} precedes {:?} condition at {}",
                condition_type,
                now.to_rfc3339(),
                last.condition_type,
                last.last_update_time.0.to_rfc3339()
            )));
        }
    }

    status.conditions.push(TFJobCondition {
        condition_type,
        status: "True".to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_update_time: Time(now),
        last_transition_time: Time(now),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TFJobSpec;
    use chrono::Duration;

    fn job() -> TFJob {
        TFJob::new("train-1", TFJobSpec::default())
    }

    #[test]
    fn test_first_append_creates_status() {
        let mut job = job();
        append_condition(&mut job, TFJobConditionType::Created, TFJOB_CREATED_REASON, "created")
            .unwrap();

        let conditions = &job.status.unwrap().conditions;
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].condition_type, TFJobConditionType::Created);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason, TFJOB_CREATED_REASON);
    }

    #[test]
    fn test_appends_keep_prefix_and_order() {
        let mut job = job();
        let t0 = Utc::now();
        let steps = [
            (TFJobConditionType::Created, TFJOB_CREATED_REASON),
            (TFJobConditionType::Running, "TFJobRunning"),
            (TFJobConditionType::Running, "TFJobRunning"),
            (TFJobConditionType::Succeeded, "TFJobSucceeded"),
        ];

        for (i, (ty, reason)) in steps.iter().enumerate() {
            let before = job.status.clone().map(|s| s.conditions).unwrap_or_default();
            append_condition_at(&mut job, *ty, reason, "msg", t0 + Duration::seconds(i as i64))
                .unwrap();
            let after = &job.status.as_ref().unwrap().conditions;
            assert_eq!(after.len(), before.len() + 1);
            assert_eq!(&after[..before.len()], before.as_slice());
        }

        let conditions = &job.status.unwrap().conditions;
        assert!(conditions
            .windows(2)
            .all(|w| w[0].last_update_time.0 <= w[1].last_update_time.0));
        assert!(conditions.last().unwrap().condition_type.is_terminal());
    }

    #[test]
    fn test_equal_timestamps_are_allowed() {
        let mut job = job();
        let now = Utc::now();
        append_condition_at(&mut job, TFJobConditionType::Created, "a", "m", now).unwrap();
        append_condition_at(&mut job, TFJobConditionType::Created, "a", "m", now).unwrap();
        assert_eq!(job.status.unwrap().conditions.len(), 2);
    }

    #[test]
    fn test_clock_regression_is_rejected() {
        let mut job = job();
        let now = Utc::now();
        append_condition_at(&mut job, TFJobConditionType::Created, "a", "m", now).unwrap();

        let err = append_condition_at(
            &mut job,
            TFJobConditionType::Running,
            "TFJobRunning",
            "m",
            now - Duration::seconds(5),
        )
        .unwrap_err();

        assert!(matches!(err, Error::ConditionOrder(_)));
        assert_eq!(job.status.unwrap().conditions.len(), 1);
    }
}
