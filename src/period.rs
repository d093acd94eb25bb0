use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use crate::error::EngineError;
use crate::model::{AcademicPeriod, GradeRecord, PeriodKind, PeriodStatus};
use crate::parse::ParsedReport;

/// Which time axis an analysis runs on.
///
/// `Declared` trusts the exporters' stated windows (finalized trimesters and
/// semesters, or in-progress grading windows from the averages path).
/// `Monthly` derives calendar months purely from record dates, independent
/// of any export boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodAxis {
    Declared,
    Monthly,
}

/// Records grouped onto one ordered period axis.
///
/// `buckets` is parallel to `periods`; a period that attracted no records
/// keeps its empty bucket so trend axes stay continuous.
#[derive(Debug, Clone)]
pub struct ClassifiedRecords {
    pub periods: Vec<AcademicPeriod>,
    pub buckets: Vec<Vec<GradeRecord>>,
}

impl ClassifiedRecords {
    fn empty() -> Self {
        ClassifiedRecords {
            periods: Vec::new(),
            buckets: Vec::new(),
        }
    }
}

/// Groups the records of a set of parsed reports onto one period axis.
///
/// Classification is recomputed from scratch on every call; nothing is
/// cached across requests.
pub fn classify(
    reports: &[ParsedReport],
    axis: PeriodAxis,
) -> Result<ClassifiedRecords, EngineError> {
    match axis {
        PeriodAxis::Monthly => classify_monthly(reports),
        PeriodAxis::Declared => classify_declared(reports),
    }
}

fn classify_monthly(reports: &[ParsedReport]) -> Result<ClassifiedRecords, EngineError> {
    let mut records: Vec<GradeRecord> = Vec::new();
    let mut windows: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    for report in reports {
        let window = (report.period.start, report.period.end);
        if windows.contains(&window) {
            debug!(source = %report.source, period = %report.period.describe(),
                "duplicate period window, report skipped");
            continue;
        }
        windows.push(window);
        for record in report.grade_records() {
            records.push(record?);
        }
    }
    if records.is_empty() {
        return Ok(ClassifiedRecords::empty());
    }

    let mut lo = (records[0].date.year(), records[0].date.month());
    let mut hi = lo;
    for r in &records {
        let ym = (r.date.year(), r.date.month());
        if ym < lo {
            lo = ym;
        }
        if ym > hi {
            hi = ym;
        }
    }

    // Every month from first to last appears exactly once, so interior
    // months with no records become explicit empty periods.
    let mut periods = Vec::new();
    let mut buckets: Vec<Vec<GradeRecord>> = Vec::new();
    let (mut y, mut m) = lo;
    loop {
        let Some(period) = month_period(y, m) else {
            break;
        };
        periods.push(period);
        buckets.push(Vec::new());
        if (y, m) == hi {
            break;
        }
        (y, m) = next_month(y, m);
    }

    for record in records {
        let ym = (record.date.year(), record.date.month());
        let offset = month_offset(lo, ym);
        buckets[offset].push(record);
    }

    debug!(months = periods.len(), "classified records onto month axis");
    Ok(ClassifiedRecords { periods, buckets })
}

fn classify_declared(reports: &[ParsedReport]) -> Result<ClassifiedRecords, EngineError> {
    let mut periods: Vec<AcademicPeriod> = Vec::new();
    let mut buckets: Vec<Vec<GradeRecord>> = Vec::new();

    for report in reports {
        let window = &report.period;
        // An identical window is the same period re-exported; folding it in
        // keeps re-imports idempotent. The original tool skipped reports it
        // had already seen.
        let seen = periods
            .iter()
            .any(|p| p.start == window.start && p.end == window.end);
        if seen {
            debug!(source = %report.source, period = %window.describe(),
                "duplicate period window, report skipped");
            continue;
        }
        periods.push(window.clone());
        let mut bucket = Vec::new();
        for record in report.grade_records() {
            bucket.push(record?);
        }
        buckets.push(bucket);
    }

    let mut order: Vec<usize> = (0..periods.len()).collect();
    order.sort_by_key(|&i| periods[i].start);
    let periods: Vec<AcademicPeriod> = order.iter().map(|&i| periods[i].clone()).collect();
    let buckets: Vec<Vec<GradeRecord>> = order.into_iter().map(|i| buckets[i].clone()).collect();

    for pair in periods.windows(2) {
        if pair[1].start <= pair[0].end {
            return Err(EngineError::AmbiguousPeriod {
                first: pair[0].describe(),
                second: pair[1].describe(),
            });
        }
    }

    debug!(periods = periods.len(), "classified records onto declared axis");
    Ok(ClassifiedRecords { periods, buckets })
}

fn next_month(y: i32, m: u32) -> (i32, u32) {
    if m == 12 {
        (y + 1, 1)
    } else {
        (y, m + 1)
    }
}

fn month_offset(lo: (i32, u32), ym: (i32, u32)) -> usize {
    ((ym.0 - lo.0) * 12 + ym.1 as i32 - lo.1 as i32) as usize
}

fn month_period(y: i32, m: u32) -> Option<AcademicPeriod> {
    let start = NaiveDate::from_ymd_opt(y, m, 1)?;
    let (ny, nm) = next_month(y, m);
    let end = NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?;
    Some(AcademicPeriod {
        kind: PeriodKind::Month,
        label: format!("{:04}-{:02}", y, m),
        start,
        end,
        // Calendar months are trend windows; they never finalize.
        status: PeriodStatus::InProgress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AcademicYear;
    use crate::parse::{parse_report, ReportKind};
    use std::path::PathBuf;

    fn fixture_path(rel: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
    }

    fn load(rel: &str, kind: ReportKind) -> ParsedReport {
        parse_report(&fixture_path(rel), kind, AcademicYear::new(2024)).expect("parse fixture")
    }

    #[test]
    fn month_axis_fills_interior_gaps() {
        let reports = vec![
            load("fixtures/reports/8a_2024-09.csv", ReportKind::AveragesReport),
            load("fixtures/reports/8a_2024-10.csv", ReportKind::AveragesReport),
            load("fixtures/reports/8a_2024-12.csv", ReportKind::AveragesReport),
        ];
        let classified = classify(&reports, PeriodAxis::Monthly).expect("classify");

        let labels: Vec<&str> = classified
            .periods
            .iter()
            .map(|p| p.label.as_str())
            .collect();
        assert_eq!(labels, vec!["2024-09", "2024-10", "2024-11", "2024-12"]);
        assert!(classified.buckets[2].is_empty());
        assert!(!classified.buckets[0].is_empty());
        assert!(!classified.buckets[3].is_empty());
    }

    #[test]
    fn month_axis_ignores_input_order() {
        let reports = vec![
            load("fixtures/reports/8a_2024-12.csv", ReportKind::AveragesReport),
            load("fixtures/reports/8a_2024-09.csv", ReportKind::AveragesReport),
        ];
        let classified = classify(&reports, PeriodAxis::Monthly).expect("classify");
        assert_eq!(classified.periods[0].label, "2024-09");
        assert_eq!(classified.periods.last().map(|p| p.label.as_str()), Some("2024-12"));
    }

    #[test]
    fn declared_axis_is_chronological() {
        let reports = vec![
            load(
                "fixtures/reports/8a_trim2.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
            load(
                "fixtures/reports/8a_trim1.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
        ];
        let classified = classify(&reports, PeriodAxis::Declared).expect("classify");
        assert_eq!(classified.periods.len(), 2);
        assert_eq!(classified.periods[0].label, "I trimestras");
        assert_eq!(classified.periods[1].label, "II trimestras");
    }

    #[test]
    fn duplicate_window_folds_into_one_period() {
        let reports = vec![
            load(
                "fixtures/reports/8a_trim1.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
            load(
                "fixtures/reports/8a_trim1.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
        ];
        let classified = classify(&reports, PeriodAxis::Declared).expect("classify");
        assert_eq!(classified.periods.len(), 1);
    }

    #[test]
    fn overlapping_windows_are_ambiguous() {
        let reports = vec![
            load(
                "fixtures/reports/8a_trim2.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
            load(
                "fixtures/reports/8a_trim_overlap.csv",
                ReportKind::AchievementAttendanceSummary,
            ),
        ];
        let err = classify(&reports, PeriodAxis::Declared).expect_err("must fail");
        assert_eq!(err.code(), "ambiguous_period");
    }

    #[test]
    fn empty_input_yields_empty_axis() {
        let classified = classify(&[], PeriodAxis::Monthly).expect("classify");
        assert!(classified.periods.is_empty());
        let classified = classify(&[], PeriodAxis::Declared).expect("classify");
        assert!(classified.periods.is_empty());
    }
}
