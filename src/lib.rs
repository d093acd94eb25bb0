//! Report-parsing and period-aggregation engine for "Mano Dienynas"
//! achievement and averages exports.
//!
//! The pipeline runs strictly forward: parse → classify → aggregate →
//! assemble. Each stage is a pure function over the previous stage's
//! output; nothing is cached across requests and nothing here touches the
//! GUI. The sidecar binary exposes the engine over a line-delimited JSON
//! protocol on stdin/stdout.

pub mod calc;
pub mod chart;
pub mod error;
pub mod ipc;
pub mod model;
pub mod parse;
pub mod period;

use std::path::PathBuf;

pub use chart::{assemble, AnalysisRequest, ChartModel};
pub use error::EngineError;
pub use model::AcademicYear;
pub use parse::{parse_report, ParsedReport, ReportKind};

/// Parses every listed export under one declared report type and assembles
/// the requested chart in a single pass.
///
/// Output depends only on the file contents and the request; given the same
/// inputs the result is identical on every run.
pub fn run_analysis(
    paths: &[PathBuf],
    kind: ReportKind,
    year: AcademicYear,
    request: &AnalysisRequest,
) -> Result<ChartModel, EngineError> {
    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        reports.push(parse_report(path, kind, year)?);
    }
    chart::assemble(&reports, request)
}
