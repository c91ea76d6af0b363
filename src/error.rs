pub type SignweaveResult<T> = Result<T, SignweaveError>;

#[derive(thiserror::Error, Debug)]
pub enum SignweaveError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SignweaveError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_parse_failures_carry_the_parser_diagnostic() {
        let err = crate::notation::parse_document("<sigml>").unwrap_err();
        assert!(matches!(err, SignweaveError::Parse(_)));
        // message names the category so callers can log it verbatim
        assert!(err.to_string().starts_with("parse error:"));
    }

    #[test]
    fn config_validation_names_the_offending_slot() {
        let mut cfg = crate::timing::TimingConfig::default();
        cfg.wrist_slot = f32::NAN;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, SignweaveError::Validation(_)));
        assert!(err.to_string().contains("wrist_slot"));
    }

    #[test]
    fn wrapped_errors_keep_their_context_chain() {
        let base = anyhow::anyhow!("timing table unreadable").context("loading configuration");
        let err: SignweaveError = base.into();
        assert!(err.to_string().contains("loading configuration"));
        assert!(format!("{err:#}").contains("timing table unreadable"));
    }
}
