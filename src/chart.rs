use serde::Serialize;
use tracing::{info, warn};

use crate::calc;
use crate::error::EngineError;
use crate::model::AcademicPeriod;
use crate::parse::ParsedReport;
use crate::period::{classify, ClassifiedRecords, PeriodAxis};

/// One analysis the GUI can request. Each variant carries exactly the
/// entity selection it needs, so an under-specified request cannot be
/// expressed.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    /// Class-wide view over finalized trimester/semester windows.
    ClassFinalized,
    /// Class-wide view over in-progress windows.
    ClassRolling { axis: PeriodAxis },
    /// One pupil, one series per subject.
    PupilSubjects {
        pupil: String,
        subject: Option<String>,
        axis: PeriodAxis,
    },
    /// One pupil's overall average overlaid with the class average.
    PupilVsClass {
        pupil: String,
        subject: Option<String>,
        axis: PeriodAxis,
    },
}

/// One aligned value on a series: the period label it belongs to and the
/// value, or an explicit gap when the scope had no marks. A gap is never
/// plotted as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub period: String,
    pub value: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

/// Chart-ready output: a chronological period axis and series aligned onto
/// it. The assembler performs no aggregation arithmetic of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartModel {
    pub title: String,
    pub class_name: String,
    pub periods: Vec<AcademicPeriod>,
    pub series: Vec<Series>,
}

/// Series label for the class-wide average line.
pub const CLASS_SERIES_NAME: &str = "Klasės vidurkis";

/// Assembles the chart for one analysis over a set of parsed reports.
pub fn assemble(
    reports: &[ParsedReport],
    request: &AnalysisRequest,
) -> Result<ChartModel, EngineError> {
    let class_name = latest_report(reports)
        .map(|r| r.class_name.clone())
        .unwrap_or_default();

    match request {
        AnalysisRequest::ClassFinalized => {
            let classified = classify(reports, PeriodAxis::Declared)?;
            let title = format!("{} mokinių bendrų vidurkių pokytis", class_name);
            class_chart(reports, classified, class_name, title)
        }
        AnalysisRequest::ClassRolling { axis } => {
            let classified = classify(reports, *axis)?;
            let title = match axis {
                PeriodAxis::Monthly => format!("{} mokinių mėnesiniai vidurkiai", class_name),
                PeriodAxis::Declared => {
                    format!("{} mokinių vidurkiai pagal laikotarpius", class_name)
                }
            };
            class_chart(reports, classified, class_name, title)
        }
        AnalysisRequest::PupilSubjects {
            pupil,
            subject,
            axis,
        } => {
            let classified = classify(reports, *axis)?;
            pupil_subjects_chart(reports, classified, class_name, pupil, subject.as_deref())
        }
        AnalysisRequest::PupilVsClass {
            pupil,
            subject,
            axis,
        } => {
            let classified = classify(reports, *axis)?;
            pupil_vs_class_chart(reports, classified, class_name, pupil, subject.as_deref())
        }
    }
}

/// The pupil roster comes from the chronologically newest report; pupils
/// who left the class earlier are not charted.
fn roster(reports: &[ParsedReport]) -> Vec<String> {
    let Some(latest) = latest_report(reports) else {
        return Vec::new();
    };
    let roster = latest.pupil_names();
    for report in reports {
        for name in report.pupil_names() {
            if !roster.contains(&name) {
                warn!(pupil = %name, source = %report.source,
                    "pupil missing from the newest report, ignored");
            }
        }
    }
    roster
}

fn latest_report(reports: &[ParsedReport]) -> Option<&ParsedReport> {
    reports.iter().max_by_key(|r| r.period.start)
}

fn class_chart(
    reports: &[ParsedReport],
    classified: ClassifiedRecords,
    class_name: String,
    title: String,
) -> Result<ChartModel, EngineError> {
    let mut series = Vec::new();

    let class_points = (0..classified.periods.len())
        .map(|i| {
            let avg = calc::class_average(&classified, i, None);
            SeriesPoint {
                period: avg.period.label,
                value: avg.value,
                sample_count: avg.sample_count,
            }
        })
        .collect();
    series.push(Series {
        name: CLASS_SERIES_NAME.to_string(),
        points: class_points,
    });

    for pupil in roster(reports) {
        let points = (0..classified.periods.len())
            .map(|i| {
                let avg = calc::pupil_average(&classified, i, &pupil, None);
                SeriesPoint {
                    period: avg.period.label,
                    value: avg.value,
                    sample_count: avg.sample_count,
                }
            })
            .collect();
        series.push(Series {
            name: pupil,
            points,
        });
    }

    info!(periods = classified.periods.len(), series = series.len(), "assembled class chart");
    Ok(ChartModel {
        title,
        class_name,
        periods: classified.periods,
        series,
    })
}

fn pupil_subjects_chart(
    reports: &[ParsedReport],
    classified: ClassifiedRecords,
    class_name: String,
    pupil: &str,
    subject: Option<&str>,
) -> Result<ChartModel, EngineError> {
    if !reports
        .iter()
        .any(|r| r.pupil_names().iter().any(|n| n.as_str() == pupil))
    {
        warn!(pupil = %pupil, "pupil not present in any report");
    }

    let subjects: Vec<String> = match subject {
        Some(s) => vec![s.to_string()],
        None => {
            let mut names: Vec<String> = classified
                .buckets
                .iter()
                .flatten()
                .filter(|r| r.pupil == pupil)
                .map(|r| r.subject.clone())
                .collect();
            names.sort();
            names.dedup();
            names
        }
    };

    let series = subjects
        .into_iter()
        .map(|subject| {
            let points = (0..classified.periods.len())
                .map(|i| {
                    let avg = calc::pupil_average(&classified, i, pupil, Some(subject.as_str()));
                    SeriesPoint {
                        period: avg.period.label,
                        value: avg.value,
                        sample_count: avg.sample_count,
                    }
                })
                .collect();
            Series {
                name: subject,
                points,
            }
        })
        .collect::<Vec<_>>();

    info!(pupil = %pupil, series = series.len(), "assembled pupil subject chart");
    Ok(ChartModel {
        title: format!("{} dalykų vidurkiai", pupil),
        class_name,
        periods: classified.periods,
        series,
    })
}

fn pupil_vs_class_chart(
    reports: &[ParsedReport],
    classified: ClassifiedRecords,
    class_name: String,
    pupil: &str,
    subject: Option<&str>,
) -> Result<ChartModel, EngineError> {
    if !reports
        .iter()
        .any(|r| r.pupil_names().iter().any(|n| n.as_str() == pupil))
    {
        warn!(pupil = %pupil, "pupil not present in any report");
    }

    let mut pupil_points = Vec::with_capacity(classified.periods.len());
    let mut class_points = Vec::with_capacity(classified.periods.len());
    for i in 0..classified.periods.len() {
        let (p, c) = calc::compare_pupil_to_class(&classified, i, pupil, subject);
        pupil_points.push(SeriesPoint {
            period: p.period.label,
            value: p.value,
            sample_count: p.sample_count,
        });
        class_points.push(SeriesPoint {
            period: c.period.label,
            value: c.value,
            sample_count: c.sample_count,
        });
    }

    Ok(ChartModel {
        title: format!("{} ir klasės vidurkis", pupil),
        class_name,
        periods: classified.periods,
        series: vec![
            Series {
                name: pupil.to_string(),
                points: pupil_points,
            },
            Series {
                name: CLASS_SERIES_NAME.to_string(),
                points: class_points,
            },
        ],
    })
}
