use serde::Serialize;

use crate::model::{AcademicPeriod, GradeRecord, PeriodStatus};
use crate::period::ClassifiedRecords;

/// A pupil's average for one period, overall or for one subject.
/// Derived, recomputed on demand; never stored apart from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PupilAverage {
    pub pupil: String,
    pub period: AcademicPeriod,
    pub subject: Option<String>,
    /// `None` when no marks fell into the scope; an empty period has no
    /// average, not an average of zero.
    pub value: Option<f64>,
    pub sample_count: usize,
}

/// The class-wide average for one period, overall or for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAverage {
    pub period: AcademicPeriod,
    pub subject: Option<String>,
    pub value: Option<f64>,
    pub sample_count: usize,
}

/// Plain arithmetic mean over marks: sum of marks / count.
///
/// Pupil and class figures share this one formula, so overlaying the two
/// series never needs cross-normalization.
pub fn mark_mean<'a, I>(records: I) -> (Option<f64>, usize)
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for r in records {
        sum += r.mark;
        count += 1;
    }
    if count == 0 {
        (None, 0)
    } else {
        (Some(sum / count as f64), count)
    }
}

/// A finalized window averages only officially issued marks; an in-progress
/// window averages everything it attracted.
fn in_scope(
    record: &GradeRecord,
    status: PeriodStatus,
    pupil: Option<&str>,
    subject: Option<&str>,
) -> bool {
    if status == PeriodStatus::Finalized && !record.finalized {
        return false;
    }
    if let Some(p) = pupil {
        if record.pupil != p {
            return false;
        }
    }
    if let Some(s) = subject {
        if record.subject != s {
            return false;
        }
    }
    true
}

/// Class-wide average for one classified period.
pub fn class_average(
    classified: &ClassifiedRecords,
    period_idx: usize,
    subject: Option<&str>,
) -> ClassAverage {
    let period = &classified.periods[period_idx];
    let (value, sample_count) = mark_mean(
        classified.buckets[period_idx]
            .iter()
            .filter(|r| in_scope(r, period.status, None, subject)),
    );
    ClassAverage {
        period: period.clone(),
        subject: subject.map(|s| s.to_string()),
        value,
        sample_count,
    }
}

/// One pupil's average for one classified period.
pub fn pupil_average(
    classified: &ClassifiedRecords,
    period_idx: usize,
    pupil: &str,
    subject: Option<&str>,
) -> PupilAverage {
    let period = &classified.periods[period_idx];
    let (value, sample_count) = mark_mean(
        classified.buckets[period_idx]
            .iter()
            .filter(|r| in_scope(r, period.status, Some(pupil), subject)),
    );
    PupilAverage {
        pupil: pupil.to_string(),
        period: period.clone(),
        subject: subject.map(|s| s.to_string()),
        value,
        sample_count,
    }
}

/// Pupil and class averages over the identical period/subject scope,
/// paired for overlay charts.
pub fn compare_pupil_to_class(
    classified: &ClassifiedRecords,
    period_idx: usize,
    pupil: &str,
    subject: Option<&str>,
) -> (PupilAverage, ClassAverage) {
    (
        pupil_average(classified, period_idx, pupil, subject),
        class_average(classified, period_idx, subject),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PeriodKind, PeriodStatus};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn record(pupil: &str, subject: &str, mark: f64, finalized: bool) -> GradeRecord {
        GradeRecord {
            pupil: pupil.to_string(),
            subject: subject.to_string(),
            date: date(30),
            mark,
            finalized,
        }
    }

    fn period(status: PeriodStatus) -> AcademicPeriod {
        AcademicPeriod {
            kind: PeriodKind::Month,
            label: "2024-09".to_string(),
            start: date(1),
            end: date(30),
            status,
        }
    }

    fn classified(status: PeriodStatus, records: Vec<GradeRecord>) -> ClassifiedRecords {
        ClassifiedRecords {
            periods: vec![period(status)],
            buckets: vec![records],
        }
    }

    #[test]
    fn mean_of_8_9_10_is_exactly_9() {
        let c = classified(
            PeriodStatus::InProgress,
            vec![
                record("A", "Matematika", 8.0, false),
                record("A", "Fizika", 9.0, false),
                record("A", "Istorija", 10.0, false),
            ],
        );
        let avg = class_average(&c, 0, None);
        assert_eq!(avg.value, Some(9.0));
        assert_eq!(avg.sample_count, 3);
    }

    #[test]
    fn empty_scope_has_no_value() {
        let c = classified(PeriodStatus::InProgress, vec![]);
        let avg = class_average(&c, 0, None);
        assert_eq!(avg.value, None);
        assert_eq!(avg.sample_count, 0);

        let avg = pupil_average(&c, 0, "A", None);
        assert_eq!(avg.value, None);
        assert_eq!(avg.sample_count, 0);
    }

    #[test]
    fn finalized_period_ignores_provisional_marks() {
        let c = classified(
            PeriodStatus::Finalized,
            vec![
                record("A", "Matematika", 10.0, true),
                record("A", "Matematika", 2.0, false),
            ],
        );
        let avg = class_average(&c, 0, None);
        assert_eq!(avg.value, Some(10.0));
        assert_eq!(avg.sample_count, 1);
    }

    #[test]
    fn in_progress_period_uses_all_marks() {
        let c = classified(
            PeriodStatus::InProgress,
            vec![
                record("A", "Matematika", 10.0, true),
                record("A", "Matematika", 2.0, false),
            ],
        );
        let avg = class_average(&c, 0, None);
        assert_eq!(avg.value, Some(6.0));
        assert_eq!(avg.sample_count, 2);
    }

    #[test]
    fn subject_scope_filters_records() {
        let c = classified(
            PeriodStatus::InProgress,
            vec![
                record("A", "Matematika", 8.0, false),
                record("A", "Fizika", 10.0, false),
            ],
        );
        let avg = pupil_average(&c, 0, "A", Some("Matematika"));
        assert_eq!(avg.value, Some(8.0));
        assert_eq!(avg.sample_count, 1);
    }

    #[test]
    fn compare_pairs_identical_scope() {
        let c = classified(
            PeriodStatus::InProgress,
            vec![
                record("A", "Matematika", 8.0, false),
                record("B", "Matematika", 10.0, false),
            ],
        );
        let (a, class) = compare_pupil_to_class(&c, 0, "A", None);
        assert_eq!(a.value, Some(8.0));
        assert_eq!(class.value, Some(9.0));
        assert_eq!(a.period.label, class.period.label);

        let (b, class) = compare_pupil_to_class(&c, 0, "B", None);
        assert_eq!(b.value, Some(10.0));
        assert_eq!(class.value, Some(9.0));
    }
}
