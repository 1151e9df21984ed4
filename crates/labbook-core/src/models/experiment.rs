use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::contains_ignore_case;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    InProgress,
    Completed,
    Submitted,
    Approved,
    Rejected,
    /// A status this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl ExperimentStatus {
    /// Statuses a researcher can pick on the experiment form.
    pub const EDITABLE: [ExperimentStatus; 3] = [
        ExperimentStatus::Draft,
        ExperimentStatus::InProgress,
        ExperimentStatus::Completed,
    ];

    /// Wire name, as used in URLs and query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "DRAFT",
            ExperimentStatus::InProgress => "IN_PROGRESS",
            ExperimentStatus::Completed => "COMPLETED",
            ExperimentStatus::Submitted => "SUBMITTED",
            ExperimentStatus::Approved => "APPROVED",
            ExperimentStatus::Rejected => "REJECTED",
            ExperimentStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentStatus::Draft => write!(f, "Draft"),
            ExperimentStatus::InProgress => write!(f, "In Progress"),
            ExperimentStatus::Completed => write!(f, "Completed"),
            ExperimentStatus::Submitted => write!(f, "Submitted"),
            ExperimentStatus::Approved => write!(f, "Approved"),
            ExperimentStatus::Rejected => write!(f, "Rejected"),
            ExperimentStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::str::FromStr for ExperimentStatus {
    type Err = String;

    /// Accepts wire names and display names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "DRAFT" => Ok(ExperimentStatus::Draft),
            "IN_PROGRESS" => Ok(ExperimentStatus::InProgress),
            "COMPLETED" => Ok(ExperimentStatus::Completed),
            "SUBMITTED" => Ok(ExperimentStatus::Submitted),
            "APPROVED" => Ok(ExperimentStatus::Approved),
            "REJECTED" => Ok(ExperimentStatus::Rejected),
            _ => Err(format!("Unknown experiment status: {}", s)),
        }
    }
}

/// A lab experiment record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub materials: Option<String>,
    #[serde(default)]
    pub procedure_steps: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub results: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub status: ExperimentStatus,
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub experiment_date: Option<NaiveDate>,
    // Server-managed fields, never sent back
    #[serde(default, skip_serializing)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub user_full_name: Option<String>,
}

/// Null or unreadable values fall back to the default instead of failing the record.
fn deserialize_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl Experiment {
    /// A new draft dated today.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            status: ExperimentStatus::Draft,
            experiment_date: Some(Local::now().date_naive()),
            ..Default::default()
        }
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("(untitled)")
    }

    /// Dashboard search: case-insensitive title match. Untitled experiments never match.
    pub fn matches_search(&self, term: &str) -> bool {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => contains_ignore_case(title, term),
            _ => false,
        }
    }

    pub fn formatted_date(&self) -> String {
        match self.experiment_date {
            Some(date) => date.format("%b %d, %Y").to_string(),
            None => "N/A".to_string(),
        }
    }
}

/// Experiments whose title matches `term`, in their original order.
pub fn filter_by_title<'a>(experiments: &'a [Experiment], term: &str) -> Vec<&'a Experiment> {
    experiments.iter().filter(|e| e.matches_search(term)).collect()
}

/// One page of a paged listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.number + 1 >= self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_experiment_response() {
        let json = r#"{"id": 7, "title": "Yeast growth", "objective": "Measure", "procedureSteps": "1. Mix", "status": "IN_PROGRESS", "experimentDate": "2024-03-05", "createdAt": "2024-03-01T09:00:00", "updatedAt": null, "userFullName": "Alice Liddell"}"#;
        let exp: Experiment = serde_json::from_str(json).expect("Failed to parse experiment JSON");
        assert_eq!(exp.id, Some(7));
        assert_eq!(exp.status, ExperimentStatus::InProgress);
        assert_eq!(exp.procedure_steps.as_deref(), Some("1. Mix"));
        assert_eq!(exp.experiment_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(exp.formatted_date(), "Mar 05, 2024");
        assert_eq!(exp.user_full_name.as_deref(), Some("Alice Liddell"));
    }

    #[test]
    fn test_serialize_omits_server_fields() {
        let mut exp = Experiment::new("Titration");
        exp.created_at = Some("2024-01-01T00:00:00".to_string());
        let value = serde_json::to_value(&exp).unwrap();
        assert_eq!(value["title"], "Titration");
        assert_eq!(value["status"], "DRAFT");
        assert!(value.get("id").is_none());
        assert!(value.get("createdAt").is_none());
        assert!(value.get("procedureSteps").is_some());
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let exp: Experiment = serde_json::from_str(r#"{"title": "x", "status": "ARCHIVED"}"#).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Unknown);
    }

    #[test]
    fn test_null_and_malformed_fields_use_defaults() {
        let exp: Experiment =
            serde_json::from_str(r#"{"title": "x", "status": null, "experimentDate": "03/05/2024"}"#).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Draft);
        assert_eq!(exp.experiment_date, None);
        assert_eq!(exp.formatted_date(), "N/A");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("draft".parse(), Ok(ExperimentStatus::Draft));
        assert_eq!("In Progress".parse(), Ok(ExperimentStatus::InProgress));
        assert_eq!("in-progress".parse(), Ok(ExperimentStatus::InProgress));
        assert_eq!("REJECTED".parse(), Ok(ExperimentStatus::Rejected));
        assert!("archived".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn test_filter_by_title() {
        let experiments = vec![
            Experiment::new("Yeast Growth"),
            Experiment::new("Acid titration"),
            Experiment { title: None, ..Default::default() },
            Experiment::new(""),
        ];

        let all = filter_by_title(&experiments, "");
        assert_eq!(all.len(), 2);

        let matched = filter_by_title(&experiments, "YEAST");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].title_or_default(), "Yeast Growth");

        assert!(filter_by_title(&experiments, "enzyme").is_empty());
    }

    #[test]
    fn test_page_parsing() {
        let json = r#"{"content": [{"title": "a"}], "totalElements": 11, "totalPages": 2, "number": 1, "size": 10}"#;
        let page: Page<Experiment> = serde_json::from_str(json).unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_elements, 11);
        assert!(page.is_last());
    }
}
