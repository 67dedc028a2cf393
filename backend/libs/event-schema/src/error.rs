use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload does not match {name}: {source}")]
    PayloadMismatch {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported schema version {version} for {name}")]
    UnsupportedVersion { name: String, version: u32 },

    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);
