// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Configuration and data errors that can be detected without
// touching a tensor. Application code wraps them in anyhow.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain_classes must name at least one class")]
    EmptyDomainClasses,

    #[error("{num_labels} labels cannot be split into domains of {num_classes} classes")]
    IndivisibleLabels { num_labels: usize, num_classes: usize },

    #[error("label id {label} is outside [0, {num_labels})")]
    LabelOutOfRange { label: usize, num_labels: usize },

    #[error("label '{0}' is not in the label vocabulary")]
    UnknownLabel(String),

    #[error("token '{token}' on line {line} is not in the token vocabulary")]
    UnknownToken { token: String, line: usize },

    #[error("token file has {tokens} lines but label file has {labels}")]
    LineCountMismatch { tokens: usize, labels: usize },

    #[error("{0} must be greater than zero")]
    InvalidDimension(&'static str),
}
