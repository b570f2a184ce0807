pub mod mirror;
pub mod package;
pub mod reflist;
pub mod snapshot;
