use std::fmt::Write;

use crate::models::{DepartmentStats, Overview};
use crate::stats::round1;

pub fn build_report(department: Option<&str>, overview: &Overview, stats: &DepartmentStats) -> String {
    let mut output = String::new();
    let department_label = department.unwrap_or("all departments");

    let _ = writeln!(output, "# Department Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} faculty members)",
        department_label, overview.faculty_count
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Statistics");

    if stats.total_students == 0 {
        let _ = writeln!(output, "No marks recorded for this department.");
    } else {
        let _ = writeln!(output, "- Students assessed: {}", stats.total_students);
        let _ = writeln!(output, "- Average score: {:.1}", stats.average);
        let _ = writeln!(output, "- Pass rate: {:.1}%", stats.pass_percentage);
        let _ = writeln!(output, "- Students at risk: {}", stats.at_risk_count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");

    let bands = &overview.grade_distribution;
    let total = bands.total();
    for (grade, count) in [
        ("A", bands.a),
        ("B", bands.b),
        ("C", bands.c),
        ("D", bands.d),
        ("F", bands.f),
    ] {
        let share = if total == 0 {
            0.0
        } else {
            round1(count as f64 * 100.0 / total as f64)
        };
        let _ = writeln!(output, "- {grade}: {count} marks ({share:.1}%)");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");

    for alert in &overview.alerts {
        let _ = writeln!(
            output,
            "- [{}] #{} {}",
            alert.severity, alert.id, alert.message
        );
    }

    output
}
