//! Pipeline error types.

/// Errors at the edges of the pipeline: configuration and input loading.
///
/// `process_tip` itself never returns one of these.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Invalid tip input: {0}")]
    Input(#[from] serde_json::Error),

    #[error("Pipeline is missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Backend setup failed: {0}")]
    Backend(#[from] triage_agent::LlmError),
}
