use std::collections::HashMap;

use uuid::Uuid;

use crate::config::Thresholds;
use crate::models::{DepartmentStats, MarkRecord};

/// Mean score of one student across every record they appear in.
#[derive(Debug, Clone)]
pub struct StudentAverage {
    pub student_id: Uuid,
    pub label: String,
    pub average: f64,
}

/// Rounds to one decimal place, halves away from zero.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-student means in order of each student's first appearance.
pub fn student_averages(records: &[MarkRecord]) -> Vec<StudentAverage> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut totals: Vec<(Uuid, String, f64, usize)> = Vec::new();

    for record in records {
        let slot = *index.entry(record.student_id).or_insert_with(|| {
            totals.push((record.student_id, record.student_label(), 0.0, 0));
            totals.len() - 1
        });
        let entry = &mut totals[slot];
        entry.2 += record.marks_obtained;
        entry.3 += 1;
    }

    totals
        .into_iter()
        .map(|(student_id, label, sum, count)| StudentAverage {
            student_id,
            label,
            average: sum / count as f64,
        })
        .collect()
}

pub fn department_stats(records: &[MarkRecord], thresholds: &Thresholds) -> DepartmentStats {
    let students = student_averages(records);
    if students.is_empty() {
        return DepartmentStats::default();
    }

    let total = students.len();
    let passed = students
        .iter()
        .filter(|s| s.average >= thresholds.pass)
        .count();
    let at_risk = students
        .iter()
        .filter(|s| s.average < thresholds.at_risk)
        .count();
    let mean_of_means = students.iter().map(|s| s.average).sum::<f64>() / total as f64;

    DepartmentStats {
        average: round1(mean_of_means),
        pass_percentage: round1(passed as f64 * 100.0 / total as f64),
        at_risk_count: at_risk,
        total_students: total,
    }
}
