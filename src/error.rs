/// Crate-level error types for filinglens diagnostics.
use std::path::PathBuf;

/// Every error names the code, tag, or file involved so a diagnostic can be
/// produced without a debugger. The engine boundary converts the soft-fail
/// variants (`InvalidReference`, `NoMatch`, `MarkupParse`) into plain,
/// unhighlighted rendering; only the CLI surfaces them to a user.
#[allow(clippy::error_impl_error, reason = "crate-wide error type")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// `.filinglens.toml` parsed but holds values the engine cannot use.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Which value was rejected and why.
        reason: String,
    },

    /// A reference code failed validation (length, alphabet, or kind rules).
    #[error("invalid reference `{code}`: {reason}")]
    InvalidReference {
        /// The raw code as supplied, sigil included.
        code: String,
        /// Why the code was rejected.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of a report failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// The markup tokenizer gave up on the input.
    #[error("markup parse failed: {reason}")]
    MarkupParse {
        /// Tokenizer message including the byte offset.
        reason: String,
    },

    /// The locator resolved but nothing in the document matched it.
    #[error("no match for reference `{code}`")]
    NoMatch {
        /// The cleaned reference code.
        code: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A document-kind tag did not map to any known kind.
    #[error("unknown document kind: `{tag}`")]
    UnknownDocumentKind {
        /// The tag as supplied.
        tag: String,
    },
}

impl Error {
    /// Whether this error is an expected steady-state outcome that should
    /// degrade to plain rendering rather than abort the pipeline.
    pub fn is_soft(&self) -> bool {
        return matches!(
            self,
            Error::InvalidReference { .. } | Error::NoMatch { .. } | Error::MarkupParse { .. }
        );
    }
}
