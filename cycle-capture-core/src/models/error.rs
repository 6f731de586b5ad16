use thiserror::Error;

/// Errors that abort an export session.
///
/// Every variant except `Archive` and `Storage` maps onto the failure kinds
/// the host UI distinguishes; none of them leave a partial file behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no audio was captured")]
    EmptyCapture,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("recording failed: {0}")]
    Recording(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("export cancelled")]
    Cancelled,
}

/// Errors raised by the audio graph's connection primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(u64),

    #[error("cannot connect node {source_node} to {destination}: {reason}")]
    ConnectionRefused {
        source_node: u64,
        destination: u64,
        reason: String,
    },
}
