use serde::Serialize;
use std::collections::HashMap;

/// Subject total assumed when a mark row carries none.
pub const DEFAULT_TOTAL_MARKS: f64 = 100.0;

/// Largest subject total accepted when subjects or settings are saved.
pub const MAX_TOTAL_MARKS: f64 = 10_000.0;

/// Half-up 1-decimal rounding used for every displayed mark percentage:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Half-up rounding to a whole number (`floor(x + 0.5)`).
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkRecord {
    pub student_id: String,
    pub subject_id: String,
    pub exam_period_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
}

impl MarkRecord {
    /// Missing marks count as zero.
    pub fn obtained_or_default(&self) -> f64 {
        self.marks_obtained.unwrap_or(0.0)
    }

    /// Missing subject totals count as [`DEFAULT_TOTAL_MARKS`].
    pub fn total_or_default(&self) -> f64 {
        self.total_marks.unwrap_or(DEFAULT_TOTAL_MARKS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotal {
    pub student_id: String,
    pub total_obtained: f64,
    pub total_possible: f64,
    pub percentage: f64,
}

impl StudentTotal {
    /// Zero row for an enrolled student with no marks in scope.
    pub fn empty(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            total_obtained: 0.0,
            total_possible: 0.0,
            percentage: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    #[serde(flatten)]
    pub total: StudentTotal,
    pub rank: usize,
}

fn percent_of(obtained: f64, possible: f64) -> f64 {
    if possible > 0.0 {
        round_off_1_decimal(obtained / possible * 100.0)
    } else {
        0.0
    }
}

/// Groups mark rows per student, in order of first appearance.
///
/// Values are summed as-is: a mark above its subject total is not clamped and
/// simply yields a percentage above 100.
pub fn compute_totals(marks: &[MarkRecord]) -> Vec<StudentTotal> {
    let mut out: Vec<StudentTotal> = Vec::new();
    let mut index_by_student: HashMap<&str, usize> = HashMap::new();

    for m in marks {
        let idx = *index_by_student
            .entry(m.student_id.as_str())
            .or_insert_with(|| {
                out.push(StudentTotal::empty(m.student_id.clone()));
                out.len() - 1
            });
        let entry = &mut out[idx];
        entry.total_obtained += m.obtained_or_default();
        entry.total_possible += m.total_or_default();
    }

    for t in &mut out {
        t.percentage = percent_of(t.total_obtained, t.total_possible);
    }
    out
}

/// Ordinal ranking by percentage descending.
///
/// The sort is stable, so equal percentages keep their input order and still
/// receive distinct sequential ranks (80, 80, 75 -> 1, 2, 3).
pub fn rank(mut totals: Vec<StudentTotal>) -> Vec<RankedStudent> {
    totals.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    totals
        .into_iter()
        .enumerate()
        .map(|(i, total)| RankedStudent { total, rank: i + 1 })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub month: String,
    pub year: i64,
    pub present_days: Option<i64>,
    pub total_working_days: Option<i64>,
}

impl AttendanceRecord {
    pub fn present_or_default(&self) -> i64 {
        self.present_days.unwrap_or(0)
    }

    pub fn working_or_default(&self) -> i64 {
        self.total_working_days.unwrap_or(0)
    }

    /// Whole-number percentage for this month alone.
    pub fn percentage(&self) -> i64 {
        attendance_percentage(self.present_or_default(), self.working_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub overall_percentage: i64,
    pub total_present: i64,
    pub total_working_days: i64,
    pub per_month: Vec<AttendanceRecord>,
}

pub fn attendance_percentage(present: i64, working: i64) -> i64 {
    if working > 0 {
        round_half_up(present as f64 / working as f64 * 100.0)
    } else {
        0
    }
}

/// Overall attendance across every month supplied. Records are passed through
/// unchanged in `per_month`; out-of-range counts are not corrected.
pub fn compute_attendance_summary(records: Vec<AttendanceRecord>) -> AttendanceSummary {
    let total_present = records
        .iter()
        .fold(0i64, |acc, r| acc.saturating_add(r.present_or_default()));
    let total_working_days = records
        .iter()
        .fold(0i64, |acc, r| acc.saturating_add(r.working_or_default()));
    AttendanceSummary {
        overall_percentage: attendance_percentage(total_present, total_working_days),
        total_present,
        total_working_days,
        per_month: records,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamRef {
    pub id: String,
    pub name: String,
    /// Sort key; exams are reported in ascending order of this value.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPercentage {
    pub exam_id: String,
    pub exam_name: String,
    pub total_obtained: f64,
    pub total_possible: f64,
    pub percentage: f64,
}

/// Per-exam totals for one student's marks, oldest exam first.
///
/// Marks pointing at an exam missing from `exams` are grouped under
/// "Unknown" with an empty sort key.
pub fn compute_exam_trend(marks: &[MarkRecord], exams: &[ExamRef]) -> Vec<ExamPercentage> {
    let exam_by_id: HashMap<&str, &ExamRef> = exams.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut groups: Vec<(String, ExamPercentage)> = Vec::new();
    let mut index_by_exam: HashMap<&str, usize> = HashMap::new();
    for m in marks {
        let idx = *index_by_exam
            .entry(m.exam_period_id.as_str())
            .or_insert_with(|| {
                let (name, key) = match exam_by_id.get(m.exam_period_id.as_str()) {
                    Some(e) => (e.name.clone(), e.created_at.clone()),
                    None => ("Unknown".to_string(), String::new()),
                };
                groups.push((
                    key,
                    ExamPercentage {
                        exam_id: m.exam_period_id.clone(),
                        exam_name: name,
                        total_obtained: 0.0,
                        total_possible: 0.0,
                        percentage: 0.0,
                    },
                ));
                groups.len() - 1
            });
        let entry = &mut groups[idx].1;
        entry.total_obtained += m.obtained_or_default();
        entry.total_possible += m.total_or_default();
    }

    groups.sort_by(|a, b| a.0.cmp(&b.0));
    groups
        .into_iter()
        .map(|(_, mut e)| {
            e.percentage = percent_of(e.total_obtained, e.total_possible);
            e
        })
        .collect()
}

/// Whole-number percentage for a single subject row. A row without a total
/// reads as 0% here, unlike the aggregate defaults.
pub fn subject_percentage(obtained: Option<f64>, total: Option<f64>) -> i64 {
    match total {
        Some(t) if t != 0.0 => round_half_up(obtained.unwrap_or(0.0) / t * 100.0),
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceBand {
    Good,
    Average,
    Poor,
}

impl PerformanceBand {
    pub fn from_percentage(pct: i64) -> Self {
        if pct >= 60 {
            PerformanceBand::Good
        } else if pct >= 40 {
            PerformanceBand::Average
        } else {
            PerformanceBand::Poor
        }
    }
}
