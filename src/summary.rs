//! Daily usage summary built from the "total" and "standard" entries of the
//! usage-detail list.

use std::fmt::Write as _;

use crate::envelope::Envelope;
use crate::error::ClientResult;
use crate::usage::{
    find_detail, reported_time, split_daytime_nighttime, usage_details, UsageBucket,
    UsageSummary, STANDARD_DETAIL_NAME, TOTAL_DETAIL_NAME,
};

/// Builds the summary or fails with `DataShape`; never returns a partially
/// populated summary.
pub fn summarize(envelope: &Envelope) -> ClientResult<UsageSummary> {
    let data_bundle = envelope.require_success("usage summary")?;
    let details = usage_details(data_bundle)?;
    let total = find_detail(&details, TOTAL_DETAIL_NAME)?.to_bucket()?;
    let standard = find_detail(&details, STANDARD_DETAIL_NAME)?.to_bucket()?;
    let (daytime, nighttime) = split_daytime_nighttime(&total, &standard);

    tracing::debug!(
        total_used = total.used,
        daytime_used = daytime.used,
        nighttime_used = nighttime.used,
        "daily summary computed"
    );

    Ok(UsageSummary {
        total,
        daytime,
        nighttime,
        reported_time: reported_time(data_bundle),
    })
}

pub fn render_daily_summary(summary: &UsageSummary) -> String {
    let mut out = String::from("Here is your daily data usage summary:\n\n");
    push_block(&mut out, "Daytime (Standard) Usage", &summary.daytime);
    push_block(&mut out, "Nighttime Usage", &summary.nighttime);
    push_block(&mut out, "Total (Day + Night)", &summary.total);
    if let Some(reported_time) = &summary.reported_time {
        let _ = writeln!(out, "Reported at {}", reported_time);
    }
    out
}

fn push_block(out: &mut String, title: &str, bucket: &UsageBucket) {
    let _ = writeln!(out, "**{}:**", title);
    let _ = writeln!(
        out,
        " - Used: {}GB out of {}GB ({:.1}%, {}GB left)\n",
        format_gb(bucket.used),
        format_gb(bucket.limit),
        bucket.percentage,
        format_gb(bucket.remaining)
    );
}

fn format_gb(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use serde_json::json;

    fn envelope(details: serde_json::Value) -> Envelope {
        Envelope::from_value(json!({
            "isSuccess": true,
            "dataBundle": {"my_package_info": {"usageDetails": details}}
        }))
    }

    #[test]
    fn summarizes_total_and_standard_entries() {
        let summary = summarize(&envelope(json!([
            {"name": "Total (Standard + Free)", "used": 20, "limit": 20},
            {"name": "TOTAL", "used": 45.0, "limit": 100.0},
            {"name": "  Standard ", "used": 30.0, "limit": 60.0}
        ])))
        .expect("summary");

        assert_eq!(summary.total.used, 45.0);
        assert_eq!(summary.daytime.limit, 60.0);
        assert_eq!(summary.nighttime.used, 15.0);
        assert_eq!(summary.nighttime.limit, 40.0);
        assert_eq!(summary.nighttime.percentage, 37.5);
    }

    #[test]
    fn unsuccessful_envelope_is_a_shape_error() {
        let envelope = Envelope::from_value(json!({
            "isSuccess": false,
            "dataBundle": {"my_package_info": {"usageDetails": []}}
        }));
        assert!(matches!(
            summarize(&envelope),
            Err(ClientError::DataShape(_))
        ));
    }

    #[test]
    fn missing_detail_list_is_a_shape_error() {
        let envelope = Envelope::from_value(json!({"isSuccess": true, "dataBundle": {}}));
        assert!(matches!(
            summarize(&envelope),
            Err(ClientError::DataShape(_))
        ));
    }

    #[test]
    fn both_entries_are_required() {
        let only_total = envelope(json!([{"name": "total", "used": 4, "limit": 10}]));
        assert!(matches!(
            summarize(&only_total),
            Err(ClientError::DataShape(_))
        ));

        let null_used = envelope(json!([
            {"name": "total", "used": 4, "limit": 10},
            {"name": "standard", "used": null, "limit": 5}
        ]));
        assert!(matches!(
            summarize(&null_used),
            Err(ClientError::DataShape(_))
        ));
    }

    #[test]
    fn rendered_summary_lists_each_bucket() {
        let summary = summarize(&envelope(json!([
            {"name": "total", "used": 45, "limit": 100},
            {"name": "standard", "used": 30, "limit": 60}
        ])))
        .expect("summary");
        let text = render_daily_summary(&summary);
        assert!(text.contains("**Daytime (Standard) Usage:**\n - Used: 30.0GB out of 60.0GB (50.0%"));
        assert!(text.contains("**Nighttime Usage:**\n - Used: 15.0GB out of 40.0GB (37.5%"));
        assert!(text.contains("**Total (Day + Night):**\n - Used: 45.0GB out of 100.0GB"));
        assert!(!text.contains("Reported at"));
    }

    #[test]
    fn format_gb_rounds_to_two_places() {
        assert_eq!(format_gb(12.3456), "12.35");
        assert_eq!(format_gb(3.0), "3.0");
    }
}
