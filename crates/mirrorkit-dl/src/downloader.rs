use std::sync::atomic::AtomicBool;

use tracing::{debug, trace};
use ureq::Agent;
use url::Url;

use crate::{
    error::{DownloadError, Result},
    http_client::ClientConfig,
    retry::RetryPolicy,
};

/// Whole-file retrieval with retry.
///
/// Implementations must be usable from many threads at once.
pub trait Downloader: Send + Sync {
    /// Fetches `url`, giving up early once `cancel` is set.
    fn fetch_url_cancellable(&self, url: &str, cancel: &AtomicBool) -> Result<Vec<u8>>;

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_url_cancellable(url, &AtomicBool::new(false))
    }
}

pub struct HttpDownloader {
    agent: Agent,
    retry: RetryPolicy,
}

impl HttpDownloader {
    pub fn new(config: &ClientConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            agent: config.build()?,
            retry,
        })
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        trace!(url, "GET");
        let mut resp = self.agent.get(url).call()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()?;
        debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

impl Downloader for HttpDownloader {
    fn fetch_url_cancellable(&self, url: &str, cancel: &AtomicBool) -> Result<Vec<u8>> {
        Url::parse(url).map_err(|err| {
            DownloadError::InvalidUrl {
                url: url.to_string(),
                source: err,
            }
        })?;

        self.retry.run(url, cancel, || self.fetch_once(url))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    /// Serves canned responses, one per connection, and counts requests.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });

        (format!("http://{addr}"), hits)
    }

    fn downloader(retries: u32) -> HttpDownloader {
        let config = ClientConfig {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        HttpDownloader::new(&config, RetryPolicy::new(retries, Duration::ZERO)).unwrap()
    }

    #[test]
    fn test_fetch_success() {
        let (base, hits) = serve(vec![(200, "Origin: Debian\n")]);
        let body = downloader(0)
            .fetch_url(&format!("{base}/dists/wheezy/Release"))
            .unwrap();
        assert_eq!(body, b"Origin: Debian\n");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetch_retries_server_error() {
        let (base, hits) = serve(vec![(503, ""), (200, "ok")]);
        let body = downloader(2).fetch_url(&format!("{base}/a")).unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fetch_not_found_is_final() {
        let (base, hits) = serve(vec![(404, ""), (200, "never")]);
        let err = downloader(3).fetch_url(&format!("{base}/missing")).unwrap_err();
        assert!(matches!(err, DownloadError::HttpError { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetch_invalid_url() {
        let err = downloader(0).fetch_url("not a url").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
