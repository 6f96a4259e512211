use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse extended XYZ data: {details} (at line ~{line})")]
    Parse { line: usize, details: String },

    #[error("frame {frame} has no numeric property '{key}'")]
    MissingProperty { frame: usize, key: String },
}

impl Error {
    pub fn parse(line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            line,
            details: details.into(),
        }
    }
}
