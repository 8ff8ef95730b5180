use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum LockGraphError {
    #[error("No locks to display in database {0}")]
    EmptyResult(String),
    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("Malformed lock row {row}: missing field '{field}'")]
    MalformedRow { row: usize, field: &'static str },
    #[error("Invalid designator '{0}': {1}")]
    InvalidDesignator(String, String),
    #[error("Unsupported output format '{0}'")]
    UnsupportedFormat(String),
    #[error("Failed to render lock graph: {0}")]
    Render(String),
}
