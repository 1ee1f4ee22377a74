/// Error type for portage-inspect parsing and operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid package atom.
    #[error("invalid atom: {0}")]
    InvalidAtom(String),

    /// Invalid IUSE flag entry.
    #[error("invalid IUSE entry: {0}")]
    InvalidIUse(String),

    /// Invalid keyword string.
    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),

    /// Invalid repository configuration.
    #[error("invalid repos.conf: {0}")]
    InvalidReposConf(String),

    /// Filesystem or pipe failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// An external command could not be spawned or exited unsuccessfully.
    #[error("command failed: {0}")]
    Command(String),

    /// An external command exceeded its time limit and was killed.
    #[error("command timed out: {0}")]
    Timeout(String),
}

/// Result type for portage-inspect operations.
pub type Result<T> = std::result::Result<T, Error>;
