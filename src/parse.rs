use std::fs::File;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::model::{
    canonical_subject_name, is_module_subject, normalize_mark, AcademicPeriod, AcademicYear,
    AttendanceRecord, AttendanceStatus, GradeRecord, MarkValue, PeriodKind, PeriodStatus,
};

/// The two export types the external school-record system produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    AchievementAttendanceSummary,
    AveragesReport,
}

impl ReportKind {
    /// Title the exporter prints on the first grid row.
    pub fn title(self) -> &'static str {
        match self {
            ReportKind::AchievementAttendanceSummary => {
                "Mokinių pasiekimų ir lankomumo suvestinė"
            }
            ReportKind::AveragesReport => "Mokinių vidurkių suvestinė",
        }
    }
}

/// One subject column of the export grid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectColumn {
    /// Name exactly as exported.
    pub name: String,
    /// Canonical name used on record and series level.
    pub canonical: String,
    /// Elective module, excluded from averaging.
    pub module: bool,
}

#[derive(Debug, Clone)]
struct PupilRow {
    name: String,
    /// Raw mark cells, one per subject column.
    marks: Vec<String>,
    /// The exporter's own overall average for the pupil.
    average: Option<f64>,
    missed_total: u32,
    justified_illness: u32,
    justified_other: u32,
    not_justified: u32,
}

/// Per-pupil figures as stated by the exporter, for listing UIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PupilSummary {
    pub name: String,
    pub average: Option<f64>,
    pub missed_total: u32,
    pub justified_illness: u32,
    pub justified_other: u32,
    pub not_justified: u32,
}

/// One parsed export file.
///
/// Holds the declared window, the column layout and the raw pupil rows.
/// Record sequences are produced lazily; calling [`grade_records`] or
/// [`attendance_records`] again yields a fresh cursor with no shared state,
/// which is the restart contract for re-running an analysis.
///
/// [`grade_records`]: ParsedReport::grade_records
/// [`attendance_records`]: ParsedReport::attendance_records
#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub kind: ReportKind,
    pub class_name: String,
    pub period: AcademicPeriod,
    pub subjects: Vec<SubjectColumn>,
    /// The exporter's own class-wide average, informational only.
    pub class_average: Option<f64>,
    /// File name, used in diagnostics.
    pub source: String,
    pupil_rows: Vec<PupilRow>,
}

const TITLE_PREFIX: &str = "Ataskaita:";
const CLASS_PREFIX: &str = "Klasė:";
const PERIOD_PREFIX: &str = "Laikotarpis:";
const PUPIL_HEADER: &str = "Mokinys";
const AVERAGE_HEADER: &str = "Vidurkis";
const CLASS_AVERAGE_MARKER: &str = "Dalyko vidurkis";
const ATTENDANCE_HEADERS: [&str; 4] =
    ["Praleista", "Dėl ligos", "Dėl kitų priežasčių", "Nepateisinta"];

/// Reads and validates one exported report file against its declared type.
///
/// `year` is the current academic year as selected by the caller; the
/// summary report type guarantees only that year's finalized periods, so
/// anything else is rejected here rather than misplotted later.
pub fn parse_report(
    path: &Path,
    kind: ReportKind,
    year: AcademicYear,
) -> Result<ParsedReport, EngineError> {
    let source = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let file = File::open(path).map_err(|cause| EngineError::Io {
        source: source.clone(),
        cause,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut grid: Vec<StringRecord> = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| EngineError::malformed(&source, e.to_string()))?;
        grid.push(row);
    }

    let title = marker_row(&grid, TITLE_PREFIX)
        .ok_or_else(|| EngineError::malformed(&source, "missing report title row"))?;
    let title = title.trim_end_matches(['.', ',', ' ']);
    if title != kind.title() {
        return Err(EngineError::malformed(
            &source,
            format!("report title '{}' does not match the declared type", title),
        ));
    }

    let class_name = marker_row(&grid, CLASS_PREFIX)
        .ok_or_else(|| EngineError::malformed(&source, "missing class row"))?;
    let class_name = if class_name.chars().all(|c| c.is_ascii_digit()) && !class_name.is_empty() {
        // Non-gymnasium grades are exported as a bare number.
        format!("{} klasė", class_name)
    } else {
        class_name.to_string()
    };

    let period_stmt = marker_row(&grid, PERIOD_PREFIX)
        .ok_or_else(|| EngineError::malformed(&source, "missing period row"))?;
    let period = match kind {
        ReportKind::AchievementAttendanceSummary => {
            parse_summary_period(&source, period_stmt, year)?
        }
        ReportKind::AveragesReport => parse_averages_period(&source, period_stmt)?,
    };

    let header_idx = grid
        .iter()
        .position(|row| cell(row, 1) == PUPIL_HEADER)
        .ok_or_else(|| EngineError::malformed(&source, "missing pupil header row"))?;
    let header = &grid[header_idx];

    let average_col = (2..header.len())
        .find(|&i| cell(header, i) == AVERAGE_HEADER)
        .ok_or_else(|| EngineError::malformed(&source, "missing average column"))?;

    let mut subjects = Vec::with_capacity(average_col - 2);
    for i in 2..average_col {
        let name = cell(header, i);
        if name.is_empty() {
            return Err(EngineError::malformed(
                &source,
                format!("empty subject header in column {}", i + 1),
            ));
        }
        subjects.push(SubjectColumn {
            name: name.to_string(),
            canonical: canonical_subject_name(name),
            module: is_module_subject(name),
        });
    }

    for (offset, expected) in ATTENDANCE_HEADERS.iter().enumerate() {
        let got = cell(header, average_col + 1 + offset);
        if got != *expected {
            return Err(EngineError::malformed(
                &source,
                format!("missing attendance column '{}'", expected),
            ));
        }
    }

    let mut pupil_rows: Vec<PupilRow> = Vec::new();
    let mut class_average: Option<Option<f64>> = None;
    for row in &grid[header_idx + 1..] {
        let name = cell(row, 1);
        if name.is_empty() {
            continue;
        }
        if name == CLASS_AVERAGE_MARKER {
            class_average = Some(numeric_cell(&source, row, average_col)?);
            break;
        }
        let marks = (2..average_col)
            .map(|i| cell(row, i).to_string())
            .collect::<Vec<_>>();
        pupil_rows.push(PupilRow {
            name: name.to_string(),
            marks,
            average: numeric_cell(&source, row, average_col)?,
            missed_total: count_cell(&source, row, average_col + 1)?,
            justified_illness: count_cell(&source, row, average_col + 2)?,
            justified_other: count_cell(&source, row, average_col + 3)?,
            not_justified: count_cell(&source, row, average_col + 4)?,
        });
    }
    let Some(class_average) = class_average else {
        return Err(EngineError::malformed(
            &source,
            format!("missing '{}' row", CLASS_AVERAGE_MARKER),
        ));
    };

    // A summary export with no class average has not been issued yet; the
    // summary type only ever covers finalized periods.
    if kind == ReportKind::AchievementAttendanceSummary && class_average.is_none() {
        return Err(EngineError::unsupported_period(
            &source,
            format!("period '{}' has not been issued yet", period.label),
        ));
    }

    debug!(
        source = %source,
        period = %period.describe(),
        pupils = pupil_rows.len(),
        subjects = subjects.len(),
        "parsed report"
    );

    Ok(ParsedReport {
        kind,
        class_name,
        period,
        subjects,
        class_average,
        source,
        pupil_rows,
    })
}

impl ParsedReport {
    /// Lazily yields one record per pupil/subject cell that normalizes to a
    /// numeric mark. Credit markers, placeholders and elective-module cells
    /// yield nothing; unreadable cells yield an error.
    pub fn grade_records(
        &self,
    ) -> impl Iterator<Item = Result<GradeRecord, EngineError>> + '_ {
        let date = self.period.end;
        let finalized = self.period.status == PeriodStatus::Finalized;
        self.pupil_rows.iter().flat_map(move |row| {
            self.subjects
                .iter()
                .zip(row.marks.iter())
                .filter_map(move |(subject, raw)| {
                    if subject.module {
                        return None;
                    }
                    match normalize_mark(raw) {
                        Ok(MarkValue::Numeric(mark)) => Some(Ok(GradeRecord {
                            pupil: row.name.clone(),
                            subject: subject.canonical.clone(),
                            date,
                            mark,
                            finalized,
                        })),
                        Ok(_) => None,
                        Err(detail) => Some(Err(EngineError::malformed(&self.source, detail))),
                    }
                })
        })
    }

    /// Lazily expands the exporter's absence counts into one record per
    /// missed lesson, dated on the window end. These report types never
    /// state presence or lateness, so only `Excused` and `Absent` occur.
    pub fn attendance_records(&self) -> impl Iterator<Item = AttendanceRecord> + '_ {
        let date = self.period.end;
        self.pupil_rows.iter().flat_map(move |row| {
            let excused = (row.justified_illness + row.justified_other) as usize;
            let absent = row.not_justified as usize;
            std::iter::repeat(AttendanceStatus::Excused)
                .take(excused)
                .chain(std::iter::repeat(AttendanceStatus::Absent).take(absent))
                .map(move |status| AttendanceRecord {
                    pupil: row.name.clone(),
                    date,
                    status,
                })
        })
    }

    /// Pupils in exported order, with the exporter's own figures.
    pub fn pupils(&self) -> Vec<PupilSummary> {
        self.pupil_rows
            .iter()
            .map(|row| PupilSummary {
                name: row.name.clone(),
                average: row.average,
                missed_total: row.missed_total,
                justified_illness: row.justified_illness,
                justified_other: row.justified_other,
                not_justified: row.not_justified,
            })
            .collect()
    }

    /// Pupil names in exported order.
    pub fn pupil_names(&self) -> Vec<String> {
        self.pupil_rows.iter().map(|row| row.name.clone()).collect()
    }
}

fn cell<'a>(row: &'a StringRecord, col: usize) -> &'a str {
    row.get(col).unwrap_or("").trim()
}

/// Finds the row starting with `prefix` and returns the remainder of that
/// cell. The grid has no fixed row numbers worth trusting.
fn marker_row<'a>(grid: &'a [StringRecord], prefix: &str) -> Option<&'a str> {
    grid.iter().find_map(|row| {
        let c = cell(row, 0);
        c.strip_prefix(prefix).map(|rest| rest.trim())
    })
}

fn numeric_cell(
    source: &str,
    row: &StringRecord,
    col: usize,
) -> Result<Option<f64>, EngineError> {
    match normalize_mark(cell(row, col)) {
        Ok(v) => Ok(v.numeric()),
        Err(detail) => Err(EngineError::malformed(source, detail)),
    }
}

fn count_cell(source: &str, row: &StringRecord, col: usize) -> Result<u32, EngineError> {
    let raw = cell(row, col);
    if raw.is_empty() {
        return Ok(0);
    }
    // The exporter sometimes writes counts as floats ("12.0").
    raw.parse::<u32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|v| v as u32))
        .ok_or_else(|| {
            EngineError::malformed(source, format!("unreadable attendance count '{}'", raw))
        })
}

fn parse_iso_date(source: &str, raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::malformed(source, format!("unreadable date '{}'", raw)))
}

fn parse_date_range(source: &str, raw: &str) -> Result<(NaiveDate, NaiveDate), EngineError> {
    let Some((start, end)) = raw.split_once(" - ") else {
        return Err(EngineError::malformed(
            source,
            format!("unreadable period range '{}'", raw),
        ));
    };
    let start = parse_iso_date(source, start)?;
    let end = parse_iso_date(source, end)?;
    if end < start {
        return Err(EngineError::malformed(
            source,
            format!("period range '{}' ends before it starts", raw),
        ));
    }
    Ok((start, end))
}

/// Summary statement: `<y1>-<y2> m. m. <label> (<start> - <end>)`.
fn parse_summary_period(
    source: &str,
    stmt: &str,
    year: AcademicYear,
) -> Result<AcademicPeriod, EngineError> {
    let (head, dates) = stmt
        .split_once('(')
        .ok_or_else(|| EngineError::malformed(source, "period row lacks stated boundaries"))?;
    let dates = dates.trim_end_matches(')');
    let (start, end) = parse_date_range(source, dates)?;

    let label_start = ["m. m.", "m.m."]
        .iter()
        .find_map(|sep| head.find(sep).map(|i| i + sep.len()))
        .ok_or_else(|| {
            EngineError::malformed(source, format!("unreadable period statement '{}'", stmt))
        })?;
    let years = head[..label_start].trim_end_matches(['m', '.', ' ']).trim();
    let label = head[label_start..].trim().to_string();

    let (y1, y2) = years
        .split_once('-')
        .and_then(|(a, b)| Some((a.trim().parse::<i32>().ok()?, b.trim().parse::<i32>().ok()?)))
        .ok_or_else(|| {
            EngineError::malformed(source, format!("unreadable school year '{}'", years))
        })?;
    if y2 != y1 + 1 {
        return Err(EngineError::malformed(
            source,
            format!("school year '{}' is not a single year span", years),
        ));
    }

    if label == "metinis" {
        // The yearly roll-up is not a grading-period window.
        return Err(EngineError::unsupported_period(
            source,
            "yearly summary covers the whole school year, not a grading period",
        ));
    }
    let kind = if label.contains("trimestras") {
        PeriodKind::Trimester
    } else if label.contains("pusmetis") {
        PeriodKind::Semester
    } else {
        return Err(EngineError::malformed(
            source,
            format!("unrecognized period label '{}'", label),
        ));
    };

    if y1 != year.start_year {
        return Err(EngineError::unsupported_period(
            source,
            format!(
                "school year {}-{} is outside the current year {}; request an archive export",
                y1,
                y2,
                year.label()
            ),
        ));
    }
    if !year.contains(start) || !year.contains(end) {
        return Err(EngineError::unsupported_period(
            source,
            format!("period '{}' lies outside school year {}", label, year.label()),
        ));
    }

    Ok(AcademicPeriod {
        kind,
        label,
        start,
        end,
        status: PeriodStatus::Finalized,
    })
}

/// Averages statement: a bare `<start> - <end>` range. A window covering
/// exactly one calendar month is a month period; any other window is an
/// in-progress grading period, tagged trimester or semester by its span
/// since the exporter states no label on this path.
fn parse_averages_period(source: &str, stmt: &str) -> Result<AcademicPeriod, EngineError> {
    let (start, end) = parse_date_range(source, stmt)?;

    let whole_month = start.day() == 1
        && start.month() == end.month()
        && start.year() == end.year()
        && end.succ_opt().map(|d| d.day() == 1).unwrap_or(false);
    if whole_month {
        return Ok(AcademicPeriod {
            kind: PeriodKind::Month,
            label: format!("{:04}-{:02}", start.year(), start.month()),
            start,
            end,
            status: PeriodStatus::InProgress,
        });
    }

    let span_days = (end - start).num_days();
    let kind = if span_days <= 120 {
        PeriodKind::Trimester
    } else {
        PeriodKind::Semester
    };
    Ok(AcademicPeriod {
        kind,
        label: format!("{} - {}", start, end),
        start,
        end,
        status: PeriodStatus::InProgress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_path(rel: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
    }

    fn year() -> AcademicYear {
        AcademicYear::new(2024)
    }

    #[test]
    fn parse_first_trimester_summary() {
        let p = fixture_path("fixtures/reports/8a_trim1.csv");
        let report =
            parse_report(&p, ReportKind::AchievementAttendanceSummary, year()).expect("parse");

        assert_eq!(report.class_name, "8A");
        assert_eq!(report.period.kind, PeriodKind::Trimester);
        assert_eq!(report.period.label, "I trimestras");
        assert_eq!(report.period.status, PeriodStatus::Finalized);
        assert_eq!(
            report.period.start,
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
        );
        assert_eq!(
            report.period.end,
            NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()
        );

        // The module column parses but is not a chartable subject.
        assert_eq!(report.subjects.len(), 4);
        assert!(report.subjects[3].module);

        let pupils = report.pupils();
        assert_eq!(pupils.len(), 3);
        assert_eq!(pupils[0].name, "Jonaitis Jonas");
        assert_eq!(pupils[0].average, Some(9.0));
        assert_eq!(pupils[0].missed_total, 12);
        assert_eq!(pupils[0].justified_illness, 8);
        assert_eq!(pupils[0].justified_other, 2);
        assert_eq!(pupils[0].not_justified, 2);
    }

    #[test]
    fn grade_records_skip_modules_and_credit_marks() {
        let p = fixture_path("fixtures/reports/8a_trim1.csv");
        let report =
            parse_report(&p, ReportKind::AchievementAttendanceSummary, year()).expect("parse");

        let records: Vec<_> = report
            .grade_records()
            .collect::<Result<_, _>>()
            .expect("records");
        // 3 pupils x 3 chartable subjects, minus Tomas' "įsk" physics cell.
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| r.finalized));
        assert!(records.iter().all(|r| r.date == report.period.end));
        assert!(records.iter().all(|r| r.subject != "Matematikos modulis"));
    }

    #[test]
    fn grade_records_restart_from_scratch() {
        let p = fixture_path("fixtures/reports/8a_trim1.csv");
        let report =
            parse_report(&p, ReportKind::AchievementAttendanceSummary, year()).expect("parse");

        let first: Vec<_> = report
            .grade_records()
            .collect::<Result<_, _>>()
            .expect("first pass");
        let second: Vec<_> = report
            .grade_records()
            .collect::<Result<_, _>>()
            .expect("second pass");
        assert_eq!(first, second);
    }

    #[test]
    fn attendance_counts_expand_to_records() {
        let p = fixture_path("fixtures/reports/8a_trim1.csv");
        let report =
            parse_report(&p, ReportKind::AchievementAttendanceSummary, year()).expect("parse");

        let jonas: Vec<_> = report
            .attendance_records()
            .filter(|r| r.pupil == "Jonaitis Jonas")
            .collect();
        assert_eq!(jonas.len(), 12);
        let excused = jonas
            .iter()
            .filter(|r| r.status == AttendanceStatus::Excused)
            .count();
        let absent = jonas
            .iter()
            .filter(|r| r.status == AttendanceStatus::Absent)
            .count();
        assert_eq!(excused, 10);
        assert_eq!(absent, 2);
    }

    #[test]
    fn monthly_averages_report_is_a_month_period() {
        let p = fixture_path("fixtures/reports/8a_2024-09.csv");
        let report = parse_report(&p, ReportKind::AveragesReport, year()).expect("parse");

        assert_eq!(report.period.kind, PeriodKind::Month);
        assert_eq!(report.period.label, "2024-09");
        assert_eq!(report.period.status, PeriodStatus::InProgress);
        let records: Vec<_> = report
            .grade_records()
            .collect::<Result<_, _>>()
            .expect("records");
        assert!(records.iter().all(|r| !r.finalized));
    }

    #[test]
    fn declared_type_mismatch_is_malformed() {
        let p = fixture_path("fixtures/reports/8a_2024-09.csv");
        let err = parse_report(&p, ReportKind::AchievementAttendanceSummary, year())
            .expect_err("must fail");
        assert_eq!(err.code(), "malformed_report");
    }

    #[test]
    fn unissued_summary_is_unsupported() {
        let p = fixture_path("fixtures/reports/8a_trim3_unissued.csv");
        let err = parse_report(&p, ReportKind::AchievementAttendanceSummary, year())
            .expect_err("must fail");
        assert_eq!(err.code(), "unsupported_period");
    }

    #[test]
    fn foreign_school_year_is_unsupported() {
        let p = fixture_path("fixtures/reports/8a_oldyear.csv");
        let err = parse_report(&p, ReportKind::AchievementAttendanceSummary, year())
            .expect_err("must fail");
        assert_eq!(err.code(), "unsupported_period");
    }

    #[test]
    fn yearly_summary_is_unsupported() {
        let p = fixture_path("fixtures/reports/8a_metinis.csv");
        let err = parse_report(&p, ReportKind::AchievementAttendanceSummary, year())
            .expect_err("must fail");
        assert_eq!(err.code(), "unsupported_period");
    }

    #[test]
    fn missing_file_is_io() {
        let p = fixture_path("fixtures/reports/nope.csv");
        let err = parse_report(&p, ReportKind::AveragesReport, year()).expect_err("must fail");
        assert_eq!(err.code(), "io_error");
    }
}
