use thiserror::Error;

/// Main error type for the demuxer facade and worker
#[derive(Error, Debug)]
pub enum DemuxError {
    /// A data request was issued before a source was loaded
    #[error("source is not loaded. call load() first")]
    NoSource,

    /// An error originating from the demux engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The worker answered a request with an error message
    #[error("{0}")]
    Remote(String),

    /// No response arrived within the configured request timeout
    #[error("Request {0} timed out")]
    Timeout(u64),

    /// The worker thread exited before answering
    #[error("Demuxer worker is gone")]
    WorkerGone,

    /// The worker answered with a reply of the wrong shape
    #[error("Unexpected reply for {0}")]
    UnexpectedReply(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Demux-engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Engine-wide initialization failed
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input source
    #[error("Cannot open input file: {0}")]
    OpenInput(String),

    /// Failure locating stream information within a source
    #[error("Cannot find stream information: {0}")]
    FindStreamInfo(String),

    /// The selected stream does not exist in the source
    #[error("Cannot find wanted stream in the input file")]
    StreamNotFound,

    /// Failure seeking to a timestamp
    #[error("Cannot seek to the specified timestamp: {0}")]
    Seek(String),

    /// Failure reading a packet
    #[error("Failed to read packet: {0}")]
    ReadPacket(String),

    /// The source uses something the engine cannot handle
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DemuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message() {
        assert_eq!(
            DemuxError::NoSource.to_string(),
            "source is not loaded. call load() first"
        );
    }

    #[test]
    fn test_engine_error_wraps() {
        let err: DemuxError = EngineError::StreamNotFound.into();
        assert_eq!(
            err.to_string(),
            "Engine error: Cannot find wanted stream in the input file"
        );
    }
}
