/// Shared error type used across all stashforge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// A short machine-readable code, used by the HTTP layer to pick a
    /// status code for the `{"detail": ...}` body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "INVALID_JSON",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Validation(_) => "VALIDATION",
            Error::Plugin(_) => "PLUGIN_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Auth(_) => "AUTH_ERROR",
            Error::Other(_) => "ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_message() {
        let e = Error::NotFound("task abc".into());
        assert_eq!(e.to_string(), "not found: task abc");
        assert_eq!(e.code(), "NOT_FOUND");
    }

    #[test]
    fn json_error_converts_via_from() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let e: Error = parse_err.into();
        assert_eq!(e.code(), "INVALID_JSON");
    }
}
