/// Errors produced when building or calling a throttling strategy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleError {
    /// A construction parameter or a per-call token count was out of range.
    ///
    /// Construction fails outright. A rejected call leaves the strategy untouched.
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// The offending parameter.
        name: &'static str,
        /// What the parameter must satisfy.
        reason: &'static str,
    },
}

impl ThrottleError {
    pub(crate) fn invalid(name: &'static str, reason: &'static str) -> Self {
        Self::InvalidArgument { name, reason }
    }
}
