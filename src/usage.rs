//! Derived usage accounting: buckets, percentages and the daytime/nighttime
//! split of a combined quota.
//!
//! All functions here are pure. Missing required fields are reported as
//! [`ClientError::DataShape`]; nothing silently defaults to zero.

use serde::Serialize;
use serde_json::Value;

use crate::envelope::{get_path_value, value_as_f64, value_as_string, Envelope};
use crate::error::{ClientError, ClientResult};

pub const STANDARD_DETAIL_NAME: &str = "standard";
pub const TOTAL_DETAIL_NAME: &str = "total";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UsageBucket {
    pub used: f64,
    pub limit: f64,
    pub remaining: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total: UsageBucket,
    pub daytime: UsageBucket,
    pub nighttime: UsageBucket,
    pub reported_time: Option<String>,
}

/// One entry of the upstream `usageDetails` list.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageDetail {
    pub name: String,
    pub used: Option<f64>,
    pub limit: Option<f64>,
}

impl UsageDetail {
    fn from_value(value: &Value) -> Self {
        Self {
            name: value_as_string(value.get("name")).unwrap_or_default(),
            used: value.get("used").and_then(value_as_f64),
            limit: value.get("limit").and_then(value_as_f64),
        }
    }

    /// Trimmed, ASCII-case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name)
    }

    /// Converts the entry to a bucket; `used` and `limit` are both required.
    pub fn to_bucket(&self) -> ClientResult<UsageBucket> {
        match (self.used, self.limit) {
            (Some(used), Some(limit)) => Ok(compute_bucket(used, limit)),
            _ => Err(ClientError::DataShape(format!(
                "usage detail '{}' is missing used/limit",
                self.name
            ))),
        }
    }
}

/// `percentage = used / limit * 100` when `limit > 0`, else 0.
/// `remaining = max(limit - used, 0)`. Negative or non-finite inputs are
/// clamped to zero so the bucket fields stay non-negative.
pub fn compute_bucket(used: f64, limit: f64) -> UsageBucket {
    let used = non_negative(used);
    let limit = non_negative(limit);
    let percentage = if limit > 0.0 {
        used / limit * 100.0
    } else {
        0.0
    };
    UsageBucket {
        used,
        limit,
        remaining: (limit - used).max(0.0),
        percentage,
    }
}

/// Daytime is the "Standard" allowance as reported; nighttime is the rest of
/// the total, with its usage clamped at zero.
pub fn split_daytime_nighttime(
    total: &UsageBucket,
    standard: &UsageBucket,
) -> (UsageBucket, UsageBucket) {
    let daytime = compute_bucket(standard.used, standard.limit);
    let night_limit = total.limit - daytime.limit;
    let night_used = (total.used - daytime.used).max(0.0);
    (daytime, compute_bucket(night_used, night_limit))
}

/// Reads the usage-detail list from a data bundle, looking under
/// `my_package_info.usageDetails` first and `usageDetails` second.
pub fn usage_details(data_bundle: &Value) -> ClientResult<Vec<UsageDetail>> {
    let list = get_path_value(data_bundle, &["my_package_info", "usageDetails"])
        .or_else(|| data_bundle.get("usageDetails"))
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::DataShape("usageDetails list is missing".to_string()))?;
    Ok(list
        .iter()
        .filter(|entry| entry.is_object())
        .map(UsageDetail::from_value)
        .collect())
}

pub fn find_detail<'a>(details: &'a [UsageDetail], name: &str) -> ClientResult<&'a UsageDetail> {
    details
        .iter()
        .find(|detail| detail.is_named(name))
        .ok_or_else(|| ClientError::DataShape(format!("no usage detail named '{}'", name)))
}

/// The headline used/limit/percentage from `my_package_summary`.
pub fn usage_overview(envelope: &Envelope) -> ClientResult<UsageBucket> {
    let data_bundle = envelope.require_success("usage summary")?;
    let summary = data_bundle
        .get("my_package_summary")
        .ok_or_else(|| ClientError::DataShape("my_package_summary is missing".to_string()))?;
    let used = summary.get("used").and_then(value_as_f64);
    let limit = summary.get("limit").and_then(value_as_f64);
    match (used, limit) {
        (Some(used), Some(limit)) => Ok(compute_bucket(used, limit)),
        _ => Err(ClientError::DataShape(
            "my_package_summary is missing used/limit".to_string(),
        )),
    }
}

/// Full summary using `my_package_summary` as the total and the "Standard"
/// usage detail as the daytime allowance.
pub fn usage_summary_from_envelope(envelope: &Envelope) -> ClientResult<UsageSummary> {
    let total = usage_overview(envelope)?;
    let data_bundle = &envelope.data_bundle;
    let details = usage_details(data_bundle)?;
    let standard = find_detail(&details, STANDARD_DETAIL_NAME)?.to_bucket()?;
    let (daytime, nighttime) = split_daytime_nighttime(&total, &standard);
    Ok(UsageSummary {
        total,
        daytime,
        nighttime,
        reported_time: reported_time(data_bundle),
    })
}

pub(crate) fn reported_time(data_bundle: &Value) -> Option<String> {
    value_as_string(get_path_value(
        data_bundle,
        &["my_package_info", "reported_time"],
    ))
    .or_else(|| value_as_string(data_bundle.get("reported_time")))
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn bucket_matches_formula_for_regular_input() {
        for (used, limit) in [(0.0, 10.0), (2.5, 10.0), (10.0, 10.0), (33.3, 120.0)] {
            let bucket = compute_bucket(used, limit);
            assert!(approx(bucket.percentage, used / limit * 100.0));
            assert!(approx(bucket.remaining, limit - used));
        }
    }

    #[test]
    fn zero_limit_degrades_to_zero_percentage() {
        let bucket = compute_bucket(5.0, 0.0);
        assert_eq!(bucket.percentage, 0.0);
        assert_eq!(bucket.remaining, 0.0);

        let bucket = compute_bucket(0.0, 0.0);
        assert_eq!(bucket, UsageBucket::default());
    }

    #[test]
    fn overuse_clamps_remaining() {
        let bucket = compute_bucket(12.0, 10.0);
        assert_eq!(bucket.remaining, 0.0);
        assert!(approx(bucket.percentage, 120.0));
    }

    #[test]
    fn negative_inputs_are_clamped() {
        let bucket = compute_bucket(-3.0, -10.0);
        assert_eq!(bucket, UsageBucket::default());
    }

    #[test]
    fn compute_bucket_is_deterministic() {
        assert_eq!(compute_bucket(4.2, 17.0), compute_bucket(4.2, 17.0));
    }

    #[test]
    fn split_produces_complementary_nighttime() {
        let total = compute_bucket(45.0, 100.0);
        let standard = compute_bucket(30.0, 60.0);
        let (daytime, nighttime) = split_daytime_nighttime(&total, &standard);

        assert_eq!(
            daytime,
            UsageBucket {
                used: 30.0,
                limit: 60.0,
                remaining: 30.0,
                percentage: 50.0
            }
        );
        assert_eq!(
            nighttime,
            UsageBucket {
                used: 15.0,
                limit: 40.0,
                remaining: 25.0,
                percentage: 37.5
            }
        );
        assert!(approx(daytime.used + nighttime.used, total.used));
    }

    #[test]
    fn split_clamps_nighttime_usage() {
        let total = compute_bucket(10.0, 100.0);
        let standard = compute_bucket(12.0, 60.0);
        let (_, nighttime) = split_daytime_nighttime(&total, &standard);
        assert_eq!(nighttime.used, 0.0);
        assert_eq!(nighttime.remaining, 40.0);
    }

    fn sample_envelope() -> Envelope {
        Envelope::from_value(json!({
            "isSuccess": true,
            "status": "OK",
            "dataBundle": {
                "my_package_summary": {"used": 45, "limit": 100},
                "my_package_info": {
                    "reported_time": "18-Oct-2026 09:15 AM",
                    "usageDetails": [
                        {"name": "Standard", "used": 30, "limit": 60, "remaining": 30}
                    ]
                }
            }
        }))
    }

    #[test]
    fn summary_from_envelope_splits_the_package() {
        let summary = usage_summary_from_envelope(&sample_envelope()).expect("summary");
        assert!(approx(summary.total.percentage, 45.0));
        assert!(approx(summary.daytime.percentage, 50.0));
        assert!(approx(summary.nighttime.percentage, 37.5));
        assert_eq!(summary.reported_time.as_deref(), Some("18-Oct-2026 09:15 AM"));
    }

    #[test]
    fn summary_accepts_top_level_usage_details() {
        let envelope = Envelope::from_value(json!({
            "isSuccess": true,
            "dataBundle": {
                "my_package_summary": {"used": "45", "limit": "100"},
                "usageDetails": [{"name": " standard ", "used": "30", "limit": "60"}]
            }
        }));
        let summary = usage_summary_from_envelope(&envelope).expect("summary");
        assert!(approx(summary.nighttime.used, 15.0));
        assert_eq!(summary.reported_time, None);
    }

    #[test]
    fn missing_standard_detail_is_a_shape_error() {
        let envelope = Envelope::from_value(json!({
            "isSuccess": true,
            "dataBundle": {
                "my_package_summary": {"used": 45, "limit": 100},
                "usageDetails": [{"name": "Night", "used": 15, "limit": 40}]
            }
        }));
        let err = usage_summary_from_envelope(&envelope).expect_err("no standard");
        assert!(matches!(err, ClientError::DataShape(_)));
    }

    #[test]
    fn overview_requires_success_and_fields() {
        let failed = Envelope::from_value(json!({"isSuccess": false}));
        assert!(matches!(
            usage_overview(&failed),
            Err(ClientError::DataShape(_))
        ));

        let partial = Envelope::from_value(json!({
            "isSuccess": true,
            "dataBundle": {"my_package_summary": {"used": 3}}
        }));
        assert!(matches!(
            usage_overview(&partial),
            Err(ClientError::DataShape(_))
        ));
    }

    #[test]
    fn detail_without_limit_cannot_become_a_bucket() {
        let detail = UsageDetail {
            name: "Standard".to_string(),
            used: Some(1.0),
            limit: None,
        };
        assert!(detail.to_bucket().is_err());
    }
}
