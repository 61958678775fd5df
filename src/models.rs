use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marks ceiling assumed when a record carries none.
pub const DEFAULT_MAX_MARKS: f64 = 50.0;

/// A mark row as it comes out of the store or a CSV file, before defaults apply.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct MarkRow {
    pub student_id: Uuid,
    pub student_name: Option<String>,
    pub subject_id: Option<Uuid>,
    pub subject_name: Option<String>,
    pub department: Option<String>,
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkStatus {
    Pending,
    Finalized,
    Other(String),
}

impl MarkStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("PENDING") => MarkStatus::Pending,
            Some("FINALIZED") => MarkStatus::Finalized,
            Some(other) => MarkStatus::Other(other.to_string()),
            None => MarkStatus::Other(String::new()),
        }
    }
}

/// A single assessment mark with every optional field already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkRecord {
    pub student_id: Uuid,
    pub student_name: Option<String>,
    pub subject_id: Option<Uuid>,
    pub subject_name: Option<String>,
    pub department: Option<String>,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub status: MarkStatus,
}

impl MarkRecord {
    /// Applies the defaulting rules: missing or non-finite marks count as 0,
    /// a missing, zero or negative ceiling becomes [`DEFAULT_MAX_MARKS`].
    pub fn from_row(row: MarkRow) -> Self {
        let marks_obtained = row.marks_obtained.filter(|v| v.is_finite()).unwrap_or(0.0);
        let max_marks = row
            .max_marks
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_MAX_MARKS);

        MarkRecord {
            student_id: row.student_id,
            student_name: row.student_name.filter(|name| !name.trim().is_empty()),
            subject_id: row.subject_id,
            subject_name: row.subject_name.filter(|name| !name.trim().is_empty()),
            department: row.department,
            marks_obtained,
            max_marks,
            status: MarkStatus::parse(row.status.as_deref()),
        }
    }

    pub fn percent(&self) -> f64 {
        self.marks_obtained / self.max_marks * 100.0
    }

    pub fn student_label(&self) -> String {
        self.student_name
            .clone()
            .unwrap_or_else(|| self.student_id.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeDistribution {
    #[serde(rename = "A")]
    pub a: usize,
    #[serde(rename = "B")]
    pub b: usize,
    #[serde(rename = "C")]
    pub c: usize,
    #[serde(rename = "D")]
    pub d: usize,
    #[serde(rename = "F")]
    pub f: usize,
}

impl GradeDistribution {
    pub fn total(&self) -> usize {
        self.a + self.b + self.c + self.d + self.f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u32,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub grade_distribution: GradeDistribution,
    pub alerts: Vec<Alert>,
    pub faculty_count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStats {
    pub average: f64,
    pub pass_percentage: f64,
    pub at_risk_count: usize,
    pub total_students: usize,
}

/// Faculty row as stored, before its subjects are attached.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FacultyRow {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub subjects: Vec<String>,
}

impl Faculty {
    pub fn from_row(row: FacultyRow, subjects: Vec<String>) -> Self {
        Faculty {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            department: row.department,
            designation: row.designation,
            subjects,
        }
    }
}

/// Body of `POST /faculty`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFaculty {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: Option<String>,
    pub department: String,
    pub designation: String,
}

/// A faculty account ready to persist; the password is already hashed.
#[derive(Debug, Clone)]
pub struct FacultyInsert {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub department: String,
    pub designation: String,
}
