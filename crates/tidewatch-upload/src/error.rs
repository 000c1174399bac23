use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request build failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] tidewatch_core::StoreError),

    #[error("gzip encoding failed: {0}")]
    Compression(#[from] std::io::Error),
}
