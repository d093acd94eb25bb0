use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::chart::AnalysisRequest;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::AcademicYear;
use crate::parse::{parse_report, ReportKind};
use crate::period::PeriodAxis;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_year(req: &Request) -> Result<AcademicYear, serde_json::Value> {
    req.params
        .get("academicYear")
        .and_then(|v| v.as_i64())
        .map(|y| AcademicYear::new(y as i32))
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "missing academicYear (calendar year the school year starts in)",
                None,
            )
        })
}

fn required_kind(req: &Request) -> Result<ReportKind, serde_json::Value> {
    match required_str(req, "reportType")?.as_str() {
        "achievement_attendance_summary" => Ok(ReportKind::AchievementAttendanceSummary),
        "averages_report" => Ok(ReportKind::AveragesReport),
        other => Err(err(
            &req.id,
            "bad_params",
            format!("unknown reportType '{}'", other),
            None,
        )),
    }
}

fn period_axis(req: &Request, default: PeriodAxis) -> Result<PeriodAxis, serde_json::Value> {
    match req.params.get("periodKind").and_then(|v| v.as_str()) {
        None => Ok(default),
        Some("month") => Ok(PeriodAxis::Monthly),
        Some("declared") => Ok(PeriodAxis::Declared),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            format!("periodKind must be 'month' or 'declared', got '{}'", other),
            None,
        )),
    }
}

fn resolve(state: &AppState, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return path;
    }
    match &state.workspace {
        Some(ws) => ws.join(path),
        None => path,
    }
}

fn report_paths(state: &AppState, req: &Request) -> Result<Vec<PathBuf>, serde_json::Value> {
    let Some(raw) = req.params.get("reportPaths").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing reportPaths", None));
    };
    let mut out = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "reportPaths must contain only strings",
                None,
            ));
        };
        out.push(resolve(state, s));
    }
    if out.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            "reportPaths must contain at least one file",
            None,
        ));
    }
    Ok(out)
}

/// Parses a single export and returns what the exporter states about it,
/// for file listing and pupil selection in the GUI.
fn handle_report_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let year = match required_year(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let report = match parse_report(&resolve(state, &path), kind, year) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };

    ok(
        &req.id,
        json!({
            "className": report.class_name,
            "period": report.period,
            "classAverage": report.class_average,
            "subjects": report.subjects,
            "pupils": report.pupils(),
        }),
    )
}

fn handle_analysis_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mode = match required_str(req, "mode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let year = match required_year(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let paths = match report_paths(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let analysis = match mode.as_str() {
        "class.finalized" => {
            if kind != ReportKind::AchievementAttendanceSummary {
                return err(
                    &req.id,
                    "bad_params",
                    "class.finalized requires achievement_attendance_summary reports",
                    None,
                );
            }
            AnalysisRequest::ClassFinalized
        }
        "class.rolling" => {
            if kind != ReportKind::AveragesReport {
                return err(
                    &req.id,
                    "bad_params",
                    "class.rolling requires averages_report reports",
                    None,
                );
            }
            let axis = match period_axis(req, PeriodAxis::Monthly) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            AnalysisRequest::ClassRolling { axis }
        }
        "pupil.subjects" => {
            if kind != ReportKind::AveragesReport {
                return err(
                    &req.id,
                    "bad_params",
                    "pupil.subjects requires averages_report reports",
                    None,
                );
            }
            let pupil = match required_str(req, "pupil") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let axis = match period_axis(req, PeriodAxis::Monthly) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            AnalysisRequest::PupilSubjects {
                pupil,
                subject: optional_str(req, "subject"),
                axis,
            }
        }
        "pupil.vsClass" => {
            let pupil = match required_str(req, "pupil") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let default_axis = match kind {
                ReportKind::AchievementAttendanceSummary => PeriodAxis::Declared,
                ReportKind::AveragesReport => PeriodAxis::Monthly,
            };
            let axis = match period_axis(req, default_axis) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            AnalysisRequest::PupilVsClass {
                pupil,
                subject: optional_str(req, "subject"),
                axis,
            }
        }
        other => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown analysis mode '{}'", other),
                None,
            )
        }
    };

    info!(mode = %mode, reports = paths.len(), "running analysis");
    match crate::run_analysis(&paths, kind, year, &analysis) {
        Ok(chart) => ok(&req.id, json!(chart)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.preview" => Some(handle_report_preview(state, req)),
        "analysis.run" => Some(handle_analysis_run(state, req)),
        _ => None,
    }
}
