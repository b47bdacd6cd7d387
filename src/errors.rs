use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Localization error: {0}")]
    Localization(String),

    #[error("Goal '{goal}' could not be completed after {turns} turns")]
    TaskIncomplete { goal: String, turns: u32 },

    #[error("Input error: {0}")]
    Input(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl PilotError {
    pub fn not_connected() -> Self {
        PilotError::Connection("not connected to a remote-framebuffer server".into())
    }
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
