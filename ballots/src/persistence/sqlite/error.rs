use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("sqlx error")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("count {0} does not fit in a result column")]
    CountOverflow(u64),
}
