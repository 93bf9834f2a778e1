use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
