use thiserror::Error;

/// Application-wide error type.
///
/// Data-quality problems (bad emails, duplicate owners, unwanted columns) are
/// not errors: they are routed to side files. Everything here aborts the run.
#[derive(Debug, Error)]
pub enum AppError {
    // ── File system ───────────────────────────────────────────────────────────
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Input format ──────────────────────────────────────────────────────────
    #[error("Invalid input: {0}")]
    Format(String),

    // ── CSV output ────────────────────────────────────────────────────────────
    #[error("CSV write error: {0}")]
    Csv(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps an I/O error with a short description of what was being done.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            context: context.into(),
            source,
        }
    }

    /// Classifies a `csv` reader error: I/O failures stay I/O, everything
    /// else (bad quoting, ragged rows, invalid UTF-8) is a format error.
    pub(crate) fn csv_read(context: &str, err: csv::Error) -> Self {
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => AppError::io(context, source),
            _ => AppError::Format(format!("{}: {}", context, message)),
        }
    }

    /// A one-line suggestion printed next to the error by the binary.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AppError::Io { .. } => {
                Some("Check that the source file exists and the output directory is writable")
            }
            AppError::Format(_) => Some("Fix the source CSV and run again"),
            AppError::Csv(_) => Some("Check free disk space in the output directory"),
            AppError::Internal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<AppError> {
        vec![
            AppError::io(
                "open source.csv",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ),
            AppError::Format("missing header".into()),
            AppError::Csv("disk full".into()),
            AppError::Internal("task panicked".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_display() {
        for variant in all_variants() {
            assert!(
                !variant.to_string().trim().is_empty(),
                "Empty message for {:?}",
                variant
            );
        }
    }

    #[test]
    fn io_error_keeps_context_and_source() {
        let err = AppError::io(
            "open source.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let msg = err.to_string();
        assert!(msg.contains("open source.csv"));
        assert!(msg.contains("no such file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn user_facing_errors_have_hints() {
        let actionable = vec![
            AppError::io("x", std::io::Error::new(std::io::ErrorKind::Other, "y")),
            AppError::Format("bad date".into()),
        ];
        for variant in actionable {
            let hint = variant.hint().expect("expected a hint");
            assert!(!hint.trim().is_empty(), "Empty hint for {:?}", variant);
        }
    }

    #[test]
    fn csv_parse_errors_become_format_errors() {
        let data = "a,b\n1,2,3\n";
        let mut reader = csv::ReaderBuilder::new()
            .flexible(false)
            .from_reader(data.as_bytes());
        let err = reader
            .records()
            .next()
            .expect("one record")
            .expect_err("ragged row should fail");

        match AppError::csv_read("read row", err) {
            AppError::Format(msg) => assert!(msg.starts_with("read row")),
            other => panic!("Expected Format, got {:?}", other),
        }
    }
}
