mod connection;
pub(crate) mod plates;

pub(crate) use connection::{open_pool, run_migrations};
