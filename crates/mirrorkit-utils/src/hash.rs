use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns the lowercase hex MD5 digest of `data`.
///
/// Only used to check archives that publish nothing stronger.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Returns the lowercase hex blake3 digest of `data`.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Calculates the SHA-256 checksum of a file.
///
/// The file is streamed in fixed-size chunks, so large package files are never held in
/// memory.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// use mirrorkit_utils::error::HashResult;
/// use mirrorkit_utils::hash::sha256_file;
///
/// fn main() -> HashResult<()> {
///     let checksum = sha256_file("/srv/pool/ab/cd/file.deb")?;
///     println!("Checksum is {}", checksum);
///     Ok(())
/// }
/// ```
pub fn sha256_file<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err: io::Error| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let mut file = File::open(file_path).map_err(read_failed)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(read_failed)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verifies the SHA-256 checksum of a file against an expected value.
///
/// The comparison is case-insensitive.
pub fn verify_sha256_file<P: AsRef<Path>>(file_path: P, expected: &str) -> HashResult<bool> {
    let actual = sha256_file(file_path)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    #[test]
    fn test_sha256_hex() {
        assert_eq!(sha256_hex(b"hello world\n"), HELLO_SHA256);
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b"hello world\n"), "6f5902ac237024bdd0c176cb93063dc4");
    }

    #[test]
    fn test_blake3_hex() {
        assert_eq!(
            blake3_hex(b"hello world\n"),
            "dc5a4edb8240b018124052c330270696f96771a63b45250a5c17d3000e823355"
        );
    }

    #[test]
    fn test_sha256_file_matches_in_memory() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();

        assert_eq!(sha256_file(file.path()).unwrap(), HELLO_SHA256);
        assert!(verify_sha256_file(file.path(), &HELLO_SHA256.to_uppercase()).unwrap());
        assert!(!verify_sha256_file(file.path(), "deadbeef").unwrap());
    }

    #[test]
    fn test_sha256_file_not_found() {
        let result = sha256_file("/path/to/nonexistent/file");
        assert!(matches!(result, Err(HashError::ReadFailed { .. })));
    }
}
