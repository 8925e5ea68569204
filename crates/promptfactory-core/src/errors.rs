use thiserror::Error;

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// Why an uploaded version file was refused. Nothing is mutated when this
/// is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("version file is not valid JSON: {0}")]
    Malformed(String),
    #[error("version file is missing required field `{0}`")]
    MissingField(String),
    #[error("version file does not match the expected shape: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),
}

/// Maps an error chain to a short diagnostic for the CLI, when it is one we
/// know how to explain.
pub fn try_map_error(err: &anyhow::Error) -> Option<String> {
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return Some(format!("{e}\nhint: run `promptfactory init` to write a sample config"));
    }
    if let Some(e) = err.downcast_ref::<ImportError>() {
        return Some(format!("import failed: {e}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_lists_every_problem() {
        let e = ImportError::SchemaViolation(vec!["a".into(), "b".into()]);
        assert_eq!(
            e.to_string(),
            "version file does not match the expected shape: a; b"
        );
    }

    #[test]
    fn test_try_map_error_recognises_known_errors() {
        let err = anyhow::Error::new(ConfigError("bad version".into()));
        assert!(try_map_error(&err).unwrap().starts_with("config error: bad version"));

        let err = anyhow::Error::new(ImportError::MissingField("data".into()));
        assert!(try_map_error(&err).unwrap().contains("`data`"));

        assert!(try_map_error(&anyhow::anyhow!("other")).is_none());
    }
}
