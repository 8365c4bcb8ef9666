pub type ArgentumResult<T> = Result<T, ArgentumError>;

#[derive(thiserror::Error, Debug)]
pub enum ArgentumError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource exhausted: {0}")]
    Resource(String),

    #[error("params version error: {0}")]
    ParamsVersion(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("inconsistent output: {0}")]
    InconsistentOutput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArgentumError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn params_version(msg: impl Into<String>) -> Self {
        Self::ParamsVersion(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentOutput(msg.into())
    }

    /// Return `true` for the cancellation status.
    ///
    /// Cancellation is not a failure; callers distinguish it from success by
    /// the returned status rather than by error downcasting.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ArgentumError::config("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(
            ArgentumError::resource("x")
                .to_string()
                .contains("resource exhausted:")
        );
        assert!(
            ArgentumError::params_version("x")
                .to_string()
                .contains("params version error:")
        );
        assert!(
            ArgentumError::inconsistent("x")
                .to_string()
                .contains("inconsistent output:")
        );
    }

    #[test]
    fn cancelled_is_a_status_not_a_failure() {
        assert!(ArgentumError::Cancelled.is_cancelled());
        assert!(!ArgentumError::validation("x").is_cancelled());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ArgentumError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
