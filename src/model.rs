use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Outcome of normalizing one raw mark cell from an export grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkValue {
    /// A mark on the exporter's 10-point numeric scale.
    Numeric(f64),
    /// "įsk" — credit. Carries no numeric value.
    Credit,
    /// "nsk" — no credit.
    NoCredit,
    /// Empty, "-", "atl", an absence marker or an hour total. Not a mark.
    Blank,
}

impl MarkValue {
    pub fn numeric(self) -> Option<f64> {
        match self {
            MarkValue::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

/// Digits with at most one dot, the only numeric shape the exporter writes.
fn is_plain_decimal(s: &str) -> bool {
    !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().filter(|c| *c == '.').count() <= 1
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Normalizes a raw mark cell onto the single numeric scale used downstream.
///
/// The exporter writes numbers, credit markers and a handful of placeholder
/// strings; `IN`/`PR` special-programme suffixes may be glued onto any of
/// them. A zero is "no mark given", not a grade of zero. Anything else is an
/// error, never a silently dropped cell.
pub fn normalize_mark(raw: &str) -> Result<MarkValue, String> {
    let t = raw.trim();
    if t.is_empty() || t == "-" || t == "atl" {
        return Ok(MarkValue::Blank);
    }
    if t == "įsk" {
        return Ok(MarkValue::Credit);
    }
    if t == "nsk" {
        return Ok(MarkValue::NoCredit);
    }
    // Absence markers occasionally leak into mark columns.
    if t == "n" || t == "nk" || t == "nl" {
        return Ok(MarkValue::Blank);
    }
    // Missed-hour totals, e.g. "4 val."
    if t.ends_with("val.") || t.ends_with("val") {
        return Ok(MarkValue::Blank);
    }

    let stripped = t.replace("IN", "").replace("PR", "");
    let s = stripped.trim();
    match s {
        "įsk" => return Ok(MarkValue::Credit),
        "nsk" => return Ok(MarkValue::NoCredit),
        "atl" => return Ok(MarkValue::Blank),
        "0" | "0.0" => return Ok(MarkValue::Blank),
        _ => {}
    }
    if is_plain_decimal(s) {
        if let Ok(v) = s.parse::<f64>() {
            if v == 0.0 {
                return Ok(MarkValue::Blank);
            }
            return Ok(MarkValue::Numeric(v));
        }
    }
    Err(format!("unrecognized mark value '{}'", raw))
}

/// Canonical names for subjects the exporter is known to alias.
pub mod subjects {
    pub const INFORMATION_TECHNOLOGY: &str = "Informacinės technologijos";
    pub const PHYSICAL_EDUCATION: &str = "Fizinis ugdymas";
    pub const TECHNOLOGIES: &str = "Technologijos";
}

/// Maps an exported subject name to its canonical form so that per-subject
/// series line up across exports that renamed a subject mid-year.
pub fn canonical_subject_name(name: &str) -> String {
    let cleaned = name.trim();
    let low = cleaned.to_lowercase();
    match low.as_str() {
        "informatika" => return subjects::INFORMATION_TECHNOLOGY.to_string(),
        "kūno kultūra" => return subjects::PHYSICAL_EDUCATION.to_string(),
        _ => {}
    }
    // Craft and textile electives are technology courses on report cards.
    if low.contains("menas") && low.contains("amatai") {
        return subjects::TECHNOLOGIES.to_string();
    }
    if low.contains("tekstilė") || low.contains("apranga") {
        return subjects::TECHNOLOGIES.to_string();
    }
    cleaned.to_string()
}

/// Elective modules are graded separately and excluded from averages.
pub fn is_module_subject(name: &str) -> bool {
    name.contains("modulis")
}

/// One normalized mark for one pupil in one subject. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub pupil: String,
    pub subject: String,
    pub date: NaiveDate,
    pub mark: f64,
    /// True when the mark was issued for a closed grading period, as
    /// opposed to a provisional in-progress value.
    pub finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

/// One missed (or attended) lesson for one pupil. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub pupil: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodKind {
    Trimester,
    Semester,
    Month,
}

/// Finalization is a state carried on the period itself, not a bool derived
/// at call sites, so both report code paths agree on what "issued" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodStatus {
    Finalized,
    InProgress,
}

/// One academic time window on a chart axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicPeriod {
    pub kind: PeriodKind,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: PeriodStatus,
}

impl AcademicPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Label plus stated boundaries, as shown in diagnostics.
    pub fn describe(&self) -> String {
        format!("{} ({} - {})", self.label, self.start, self.end)
    }
}

/// A school year running Sep 1 of `start_year` through Aug 31 of the next
/// calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcademicYear {
    pub start_year: i32,
}

impl AcademicYear {
    pub fn new(start_year: i32) -> Self {
        AcademicYear { start_year }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let y = date.year();
        let m = date.month();
        (y == self.start_year && m >= 9) || (y == self.start_year + 1 && m <= 8)
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start_year, self.start_year + 1)
    }
}
