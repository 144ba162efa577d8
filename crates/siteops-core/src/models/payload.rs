//! Category-specific record payloads

use serde::{Deserialize, Serialize};

use super::RecordCategory;

/// Attendance marking for a single worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    HalfDay,
    Leave,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestUrgency {
    Low,
    #[default]
    Normal,
    Urgent,
}

/// One line of a material request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialItem {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Payload of a queued record, one variant per category.
///
/// Fields added after the first release must be optional or carry a serde
/// default so that records already sitting in a device's outbox still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RecordPayload {
    Attendance {
        worker_id: String,
        site_id: String,
        #[serde(default)]
        status: AttendanceStatus,
        /// Check-in time (Unix ms)
        #[serde(default)]
        check_in: Option<i64>,
        /// Check-out time (Unix ms)
        #[serde(default)]
        check_out: Option<i64>,
        #[serde(default)]
        note: Option<String>,
    },
    DailyReport {
        site_id: String,
        /// Calendar date of the report, `YYYY-MM-DD`
        report_date: String,
        summary: String,
        #[serde(default)]
        weather: Option<String>,
        #[serde(default)]
        workers_on_site: Option<u32>,
        #[serde(default)]
        issues: Vec<String>,
    },
    MaterialRequest {
        site_id: String,
        items: Vec<MaterialItem>,
        #[serde(default)]
        urgency: RequestUrgency,
        /// Date the material is needed on site, `YYYY-MM-DD`
        #[serde(default)]
        needed_by: Option<String>,
        #[serde(default)]
        note: Option<String>,
    },
}

impl RecordPayload {
    pub const fn category(&self) -> RecordCategory {
        match self {
            Self::Attendance { .. } => RecordCategory::Attendance,
            Self::DailyReport { .. } => RecordCategory::DailyReport,
            Self::MaterialRequest { .. } => RecordCategory::MaterialRequest,
        }
    }

    /// Site the record belongs to.
    pub fn site_id(&self) -> &str {
        match self {
            Self::Attendance { site_id, .. }
            | Self::DailyReport { site_id, .. }
            | Self::MaterialRequest { site_id, .. } => site_id,
        }
    }

    /// Short human-readable description for listings.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Attendance {
                worker_id, status, ..
            } => format!("{worker_id} {status:?}"),
            Self::DailyReport {
                report_date,
                summary,
                ..
            } => {
                let first_line = summary.lines().next().unwrap_or("");
                format!("{report_date} {first_line}")
            }
            Self::MaterialRequest { items, urgency, .. } => {
                format!("{} item(s), {urgency:?}", items.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn category_follows_variant() {
        let payload = RecordPayload::DailyReport {
            site_id: "s1".to_string(),
            report_date: "2026-10-19".to_string(),
            summary: "Slab poured".to_string(),
            weather: None,
            workers_on_site: Some(12),
            issues: vec![],
        };
        assert_eq!(payload.category(), RecordCategory::DailyReport);
        assert_eq!(payload.site_id(), "s1");
    }

    #[test]
    fn older_payloads_decode_with_defaults() {
        // Stored before `status`, `urgency` and `issues` existed.
        let attendance: RecordPayload = serde_json::from_str(
            r#"{"category":"attendance","worker_id":"w1","site_id":"s1"}"#,
        )
        .unwrap();
        assert_eq!(
            attendance,
            RecordPayload::Attendance {
                worker_id: "w1".to_string(),
                site_id: "s1".to_string(),
                status: AttendanceStatus::Present,
                check_in: None,
                check_out: None,
                note: None,
            }
        );

        let request: RecordPayload = serde_json::from_str(
            r#"{"category":"material_request","site_id":"s1","items":[{"name":"rebar","quantity":2.5}]}"#,
        )
        .unwrap();
        let RecordPayload::MaterialRequest { urgency, items, .. } = request else {
            panic!("expected material request");
        };
        assert_eq!(urgency, RequestUrgency::Normal);
        assert_eq!(items[0].unit, None);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let result =
            serde_json::from_str::<RecordPayload>(r#"{"category":"invoice","site_id":"s1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn summary_uses_first_report_line() {
        let payload = RecordPayload::DailyReport {
            site_id: "s1".to_string(),
            report_date: "2026-10-19".to_string(),
            summary: "Formwork done\nRebar pending".to_string(),
            weather: None,
            workers_on_site: None,
            issues: vec![],
        };
        assert_eq!(payload.summary(), "2026-10-19 Formwork done");
    }
}
