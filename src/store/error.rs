use crate::diary::DiaryError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PolicyViolation(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{}", summary(.0))]
    Invalid(Vec<String>),
    #[error("internal inconsistency: {0}")]
    Integrity(String),
}

fn summary(messages: &[String]) -> String {
    match messages.first() {
        Some(first) => format!("{} problem(s) found, first: {first}", messages.len()),
        None => "validation failed".to_string(),
    }
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, name: &str) -> Self {
        StoreError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Itemised messages for validation failures; the single message otherwise.
    pub fn messages(&self) -> Vec<String> {
        match self {
            StoreError::Invalid(msgs) => msgs.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::PolicyViolation(_) => "policy",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Forbidden(_) => "forbidden",
            StoreError::Invalid(_) => "invalid",
            StoreError::Integrity(_) => "integrity",
        }
    }
}

impl From<DiaryError> for StoreError {
    fn from(e: DiaryError) -> Self {
        match e {
            DiaryError::Unavailable(reason) => StoreError::Unavailable(reason),
            DiaryError::NotFound(name) => StoreError::not_found("booking", &name),
            DiaryError::Integrity(msg) => StoreError::Integrity(msg),
            DiaryError::EmptyName => StoreError::Invalid(vec![e.to_string()]),
            DiaryError::NameInUse(_) | DiaryError::Conflict | DiaryError::Mismatch { .. } => {
                StoreError::Conflict(e.to_string())
            }
        }
    }
}
