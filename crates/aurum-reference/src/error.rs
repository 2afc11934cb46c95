use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error(transparent)]
    Persistence(#[from] aurum_persistence::PersistenceError),
}

pub type ReferenceResult<T> = Result<T, ReferenceError>;
