use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockStoreError {
    #[error("store unavailable for option {0:?}")]
    Unavailable(String),
}
