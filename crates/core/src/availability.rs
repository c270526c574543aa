/// Outcome of loading or probing a model once at startup.
#[derive(Debug, Clone)]
pub enum ModelAvailability<M> {
    Available(M),
    Unavailable { reason: String },
}

impl<M> ModelAvailability<M> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn model(&self) -> Option<&M> {
        match self {
            Self::Available(model) => Some(model),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }

    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> ModelAvailability<N> {
        match self {
            Self::Available(model) => ModelAvailability::Available(f(model)),
            Self::Unavailable { reason } => ModelAvailability::Unavailable { reason },
        }
    }

    pub fn or_else(self, other: impl FnOnce(String) -> M) -> M {
        match self {
            Self::Available(model) => model,
            Self::Unavailable { reason } => other(reason),
        }
    }
}

impl<M, E: std::fmt::Display> From<Result<M, E>> for ModelAvailability<M> {
    fn from(result: Result<M, E>) -> Self {
        match result {
            Ok(model) => Self::Available(model),
            Err(error) => Self::unavailable(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ModelAvailability;

    #[test]
    fn failed_load_keeps_reason() {
        let loaded: ModelAvailability<u8> = Err::<u8, _>("connection refused").into();
        assert!(!loaded.is_available());
        assert_eq!(loaded.reason(), Some("connection refused"));
        assert_eq!(loaded.or_else(|_| 7), 7);
    }

    #[test]
    fn map_preserves_variant() {
        let loaded = ModelAvailability::Available(2u8).map(u16::from);
        assert_eq!(loaded.model(), Some(&2u16));
    }
}
