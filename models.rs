use crate::classifier::{Diagnosis, DiagnosisResult};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

pub const SCAN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const HISTORY_DATE_FORMAT: &str = "%b %d, %Y %H:%M";

/// A saved scan, as stored in the per-user history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRecord {
    pub id: String,
    pub user_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub image_path: String,
    pub condition: String,
    pub confidence: f64,
    pub recommendations: String,
}

impl ScanRecord {
    pub fn from_result(
        user_id: &str,
        taken_at: DateTime<Local>,
        image_path: String,
        result: &DiagnosisResult,
    ) -> Self {
        Self {
            id: scan_id(taken_at),
            user_id: user_id.to_string(),
            timestamp: taken_at.timestamp(),
            image_path,
            condition: result.label.clone(),
            confidence: result.confidence as f64,
            recommendations: result.recommendation.clone(),
        }
    }

    pub fn taken_at(&self) -> Option<DateTime<Local>> {
        Local.timestamp_opt(self.timestamp, 0).single()
    }

    pub fn history_line(&self) -> String {
        let date = self
            .taken_at()
            .map(|t| t.format(HISTORY_DATE_FORMAT).to_string())
            .unwrap_or_else(|| "unknown date".into());
        format!(
            "{}  {}  {}  {}",
            self.id,
            date,
            self.condition,
            format_confidence(self.confidence)
        )
    }
}

pub fn scan_id(taken_at: DateTime<Local>) -> String {
    taken_at.format(SCAN_ID_FORMAT).to_string()
}

/// `Confidence: 70.0%`
pub fn format_confidence(confidence: f64) -> String {
    format!("Confidence: {:.1}%", confidence * 100.0)
}

/// What the front end prints for one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub image: String,
    #[serde(flatten)]
    pub diagnosis: Diagnosis,
    pub scan_id: Option<String>,
    pub report_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::SkinCondition;

    #[test]
    fn record_carries_result_fields() {
        let taken_at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let result = DiagnosisResult::for_condition(SkinCondition::Dermatofibroma, 0.81);
        let record = ScanRecord::from_result("user-1", taken_at, "/tmp/scan.jpg".into(), &result);
        assert_eq!(record.id, "20240309_140507");
        assert_eq!(record.condition, "Dermatofibroma");
        assert_eq!(record.recommendations, result.recommendation);
        assert_eq!(record.taken_at(), Some(taken_at));
        assert!(record.history_line().contains("Mar 09, 2024 14:05"));
    }

    #[test]
    fn confidence_has_one_decimal() {
        assert_eq!(format_confidence(0.7), "Confidence: 70.0%");
        assert_eq!(format_confidence(0.98765), "Confidence: 98.8%");
    }
}
