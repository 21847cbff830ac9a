use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Model provider error: {0}")]
    Llm(String),

    #[error("Tab not found: {0}")]
    TabNotFound(u64),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, AstaError>;

/// Failure of a single call into the page.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    /// The page-side script threw.
    #[error("{message}")]
    Script { message: String },

    /// The command never reached the page or its reply was lost.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The page answered with something other than what was asked for.
    #[error("unexpected reply from page: {0}")]
    Decode(String),

    #[error("page is closed")]
    Closed,
}

impl PageError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }
}
