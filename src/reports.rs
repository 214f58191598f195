//! Typed views over the billing, profile and VAS bundle payloads.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::envelope::{value_as_f64, value_as_string, Envelope};
use crate::error::{ClientError, ClientResult};

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillStatus {
    pub status: String,
    pub amount: Option<f64>,
    pub due_date: Option<String>,
}

impl BillStatus {
    pub fn from_envelope(envelope: &Envelope) -> ClientResult<Self> {
        let data = envelope.require_success("bill status")?;
        Ok(Self {
            status: value_as_string(data.get("bill_code_desc"))
                .unwrap_or_else(|| "Unknown".to_string()),
            amount: data.get("bill_value").and_then(value_as_f64),
            due_date: value_as_string(data.get("due_date")),
        })
    }
}

/// The latest bill from the bill payment request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillReminder {
    pub bill_amount: String,
    pub due_date: String,
    pub outstanding_balance: String,
}

impl BillReminder {
    pub fn from_envelope(envelope: &Envelope) -> ClientResult<Self> {
        let data = envelope.require_success("bill payment")?;
        let first_bill = data
            .get("listofbillingInquiryType")
            .and_then(Value::as_array)
            .and_then(|bills| bills.first())
            .ok_or_else(|| {
                ClientError::DataShape("no billing information available".to_string())
            })?;
        let field = |key: &str| {
            value_as_string(first_bill.get(key)).unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        Ok(Self {
            bill_amount: field("billAmount"),
            due_date: field("paymentDueDate"),
            outstanding_balance: field("outstandingBalance"),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "**Bill Payment Reminder**\n\
             Current Bill Amount: LKR {}\n\
             Payment Due Date: {}\n\
             Outstanding Balance: LKR {}\n\n\
             Please ensure timely payment to avoid any interruption in service.",
            self.bill_amount, self.due_date, self.outstanding_balance
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    pub full_name: String,
    pub package: String,
}

impl ProfileInfo {
    pub fn from_envelope(envelope: &Envelope) -> ClientResult<Self> {
        let data = envelope.require_success("profile")?;
        let required = |key: &str| {
            value_as_string(data.get(key))
                .ok_or_else(|| ClientError::DataShape(format!("profile is missing {}", key)))
        };
        Ok(Self {
            full_name: required("fullname")?,
            package: required("subscriber_package_display")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VasBundle {
    pub name: String,
    pub used: f64,
    pub expiry_date: Option<String>,
}

/// Active VAS bundles. An empty list is a valid result.
pub fn vas_bundles(envelope: &Envelope) -> ClientResult<Vec<VasBundle>> {
    let data = envelope.require_success("VAS bundles")?;
    let Some(entries) = data.get("usageDetails").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    Ok(entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| VasBundle {
            name: value_as_string(entry.get("name")).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            used: entry.get("used").and_then(value_as_f64).unwrap_or(0.0),
            expiry_date: value_as_string(entry.get("expiry_date")),
        })
        .collect())
}

pub fn render_vas_bundles(bundles: &[VasBundle]) -> String {
    if bundles.is_empty() {
        return "No active VAS bundles.".to_string();
    }
    let mut out = String::from("**VAS Bundles Update:**\n");
    for bundle in bundles {
        let _ = write!(
            out,
            "- **{}**\n  - Data Used: {}GB\n  - Expiry Date: {}\n\n",
            bundle.name,
            bundle.used,
            bundle.expiry_date.as_deref().unwrap_or(NOT_AVAILABLE)
        );
    }
    out
}
