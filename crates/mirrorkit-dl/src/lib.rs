pub mod downloader;
pub mod error;
pub mod http_client;
pub mod queue;
pub mod retry;
