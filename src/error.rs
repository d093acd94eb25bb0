use std::fmt;

/// Failures raised at the parser/classifier boundary.
///
/// These propagate to the caller unchanged; the engine never substitutes
/// partial data for a report that failed to parse or classify, since a wrong
/// academic window would silently corrupt every chart derived from it.
#[derive(Debug)]
pub enum EngineError {
    /// The file does not structurally match the declared report type:
    /// wrong title row, missing columns, an unreadable cell.
    MalformedReport { source: String, detail: String },
    /// The report states a period outside the guaranteed scope of its
    /// report type, e.g. a historical school year or a not-yet-issued
    /// grading period on the summary path.
    UnsupportedPeriod { source: String, detail: String },
    /// Two source-declared periods of the requested kind intersect in
    /// their date ranges, so records cannot be attributed to exactly one.
    AmbiguousPeriod { first: String, second: String },
    /// The file could not be read at all.
    Io { source: String, cause: std::io::Error },
}

impl EngineError {
    pub fn malformed(source: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::MalformedReport {
            source: source.into(),
            detail: detail.into(),
        }
    }

    pub fn unsupported_period(source: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::UnsupportedPeriod {
            source: source.into(),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code, used verbatim on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::MalformedReport { .. } => "malformed_report",
            EngineError::UnsupportedPeriod { .. } => "unsupported_period",
            EngineError::AmbiguousPeriod { .. } => "ambiguous_period",
            EngineError::Io { .. } => "io_error",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MalformedReport { source, detail } => {
                write!(f, "{}: {}", source, detail)
            }
            EngineError::UnsupportedPeriod { source, detail } => {
                write!(f, "{}: {}", source, detail)
            }
            EngineError::AmbiguousPeriod { first, second } => {
                write!(f, "periods '{}' and '{}' overlap", first, second)
            }
            EngineError::Io { source, cause } => {
                write!(f, "cannot read '{}': {}", source, cause)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
