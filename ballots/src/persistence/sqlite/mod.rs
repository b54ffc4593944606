mod error;
mod store;

pub use error::SqlError;
pub use store::{open_pool, SqlitePollStore};
