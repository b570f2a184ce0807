pub mod checksum;
pub mod collection;
pub mod control;
pub mod database;
pub mod error;
pub mod mirror;
pub mod package;
pub mod pool;
pub mod reflist;
pub mod release;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;
