use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::models::{Alert, AlertSeverity, GradeDistribution, MarkRecord, MarkStatus, Overview};
use crate::stats::{round1, student_averages};

pub fn grade_distribution(records: &[MarkRecord]) -> GradeDistribution {
    let mut bands = GradeDistribution::default();

    for record in records {
        let percent = record.percent();
        if percent >= 80.0 {
            bands.a += 1;
        } else if percent >= 60.0 {
            bands.b += 1;
        } else if percent >= 40.0 {
            bands.c += 1;
        } else if percent >= 20.0 {
            bands.d += 1;
        } else {
            bands.f += 1;
        }
    }

    bands
}

/// Mean score per subject name, in order of first appearance.
/// Records without a subject are left out.
pub fn subject_averages(records: &[MarkRecord]) -> Vec<(String, f64)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(&str, f64, usize)> = Vec::new();

    for record in records {
        let Some(subject) = record.subject_name.as_deref() else {
            continue;
        };
        let slot = *index.entry(subject).or_insert_with(|| {
            totals.push((subject, 0.0, 0));
            totals.len() - 1
        });
        totals[slot].1 += record.marks_obtained;
        totals[slot].2 += 1;
    }

    // Every slot holds at least one record, so the division is safe.
    totals
        .into_iter()
        .map(|(subject, sum, count)| (subject.to_string(), sum / count as f64))
        .collect()
}

struct AlertLog {
    alerts: Vec<Alert>,
    next_id: u32,
    timestamp: DateTime<Utc>,
}

impl AlertLog {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            alerts: Vec::new(),
            next_id: 1,
            timestamp,
        }
    }

    fn make(&mut self, severity: AlertSeverity, message: String) -> Alert {
        let alert = Alert {
            id: self.next_id,
            severity,
            message,
            timestamp: self.timestamp,
        };
        self.next_id += 1;
        alert
    }

    fn push(&mut self, severity: AlertSeverity, message: String) {
        let alert = self.make(severity, message);
        self.alerts.push(alert);
    }

    fn push_front(&mut self, severity: AlertSeverity, message: String) {
        let alert = self.make(severity, message);
        self.alerts.insert(0, alert);
    }
}

/// Derives the alert list for a set of marks.
///
/// Ids follow generation order: student warnings, the cohort alert (which is
/// then moved to the front), subject warnings, the pending notice. When no
/// rule fires a single informational alert is returned instead.
pub fn derive_alerts(
    records: &[MarkRecord],
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut log = AlertLog::new(now);

    let at_risk: Vec<_> = student_averages(records)
        .into_iter()
        .filter(|student| student.average < thresholds.at_risk)
        .collect();

    for student in at_risk.iter().take(thresholds.student_alert_cap) {
        log.push(
            AlertSeverity::Warning,
            format!(
                "Student {} has a low average of {:.1}/{}",
                student.label,
                round1(student.average),
                thresholds.scale
            ),
        );
    }

    if at_risk.len() > thresholds.cohort_critical {
        log.push_front(
            AlertSeverity::Critical,
            format!(
                "{} students are at risk with averages below {}/{}",
                at_risk.len(),
                thresholds.at_risk,
                thresholds.scale
            ),
        );
    }

    for (subject, average) in subject_averages(records) {
        if average < thresholds.subject_warning {
            log.push(
                AlertSeverity::Warning,
                format!(
                    "Subject {} has a low class average of {:.1}/{}",
                    subject,
                    round1(average),
                    thresholds.scale
                ),
            );
        }
    }

    let pending = records
        .iter()
        .filter(|record| record.status == MarkStatus::Pending)
        .count();
    if pending > 0 {
        log.push(
            AlertSeverity::Info,
            format!("{pending} mark entries are pending review"),
        );
    }

    if log.alerts.is_empty() {
        log.push(
            AlertSeverity::Info,
            "All department metrics are within acceptable range".to_string(),
        );
    }

    log.alerts
}

pub fn build_overview(
    records: &[MarkRecord],
    faculty_count: i64,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Overview {
    Overview {
        grade_distribution: grade_distribution(records),
        alerts: derive_alerts(records, thresholds, now),
        faculty_count,
    }
}

pub fn build_overview_now(
    records: &[MarkRecord],
    faculty_count: i64,
    thresholds: &Thresholds,
) -> Overview {
    build_overview(records, faculty_count, thresholds, Utc::now())
}
