use std::path::{Path, PathBuf};

use mirrorkit_utils::{fs::write_atomic, hash::blake3_hex};

use crate::{error::Result, package::PackageFile};

/// On-disk pool of package files, shared by all mirrors.
///
/// Files are stored under two levels of fan-out taken from the digest that
/// download verifies, so the same file from two archives lands in the same
/// place.
#[derive(Clone, Debug)]
pub struct PackagePool {
    root: PathBuf,
}

impl PackagePool {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `root/ab/cd/<digest>_<basename>`
    ///
    /// Anything but a hex digest falls back to a hash of the filename, so the
    /// path never leaves `root`.
    pub fn path_for(&self, file: &PackageFile) -> PathBuf {
        let digest = file
            .checksums
            .verified_digest()
            .filter(|d| d.len() >= 4 && d.bytes().all(|b| b.is_ascii_hexdigit()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| blake3_hex(file.filename.as_bytes()));
        let basename = match file.basename() {
            "" | "." | ".." => "file",
            name => name,
        };

        self.root
            .join(&digest[..2])
            .join(&digest[2..4])
            .join(format!("{digest}_{basename}"))
    }

    /// Whether the pool holds `file` and its content still matches the
    /// listed checksums.
    pub fn contains(&self, file: &PackageFile) -> bool {
        let path = self.path_for(file);
        let size_matches = std::fs::metadata(&path)
            .map(|meta| meta.is_file() && meta.len() == file.checksums.size)
            .unwrap_or(false);

        size_matches
            && std::fs::read(&path)
                .map(|data| file.checksums.verify(&data).is_ok())
                .unwrap_or(false)
    }

    /// Writes `data` for `file`. Callers store only data that passed
    /// verification.
    pub fn store(&self, file: &PackageFile, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(file);
        write_atomic(&path, data)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::checksum::ChecksumInfo;

    const SHA256: &str = "8ed3f6ad685b959ead7022518e1af76cd816f8e8ec7ccdda1ed4018e8f2223f8";
    const MD5: &str = "2c1743a391305fbf367df8e4f069f9f9";

    fn deb(sha256: Option<&str>) -> PackageFile {
        PackageFile {
            filename: "pool/main/a/alpha/alpha_1.0_amd64.deb".into(),
            checksums: ChecksumInfo {
                size: 5,
                md5: Some(MD5.into()),
                sha1: None,
                sha256: sha256.map(String::from),
            },
        }
    }

    #[test]
    fn test_path_layout() {
        let pool = PackagePool::new("/srv/pool");
        let file = deb(Some(&SHA256.to_uppercase()));
        assert_eq!(
            pool.path_for(&file),
            PathBuf::from(format!("/srv/pool/8e/d3/{SHA256}_alpha_1.0_amd64.deb"))
        );

        let md5_only = deb(None);
        assert_eq!(
            pool.path_for(&md5_only),
            PathBuf::from(format!("/srv/pool/2c/17/{MD5}_alpha_1.0_amd64.deb"))
        );
    }

    #[test]
    fn test_path_ignores_sha1_and_stays_in_root() {
        let pool = PackagePool::new("/srv/pool");

        let mut file = deb(None);
        file.checksums.sha1 = Some("../../../escaped".into());
        assert_eq!(
            pool.path_for(&file),
            PathBuf::from(format!("/srv/pool/2c/17/{MD5}_alpha_1.0_amd64.deb"))
        );

        let mut hostile = deb(None);
        hostile.filename = "pool/..".into();
        hostile.checksums.md5 = Some("../../../escaped".into());
        let path = pool.path_for(&hostile);
        assert!(path.starts_with("/srv/pool"));
        assert_eq!(path.components().count(), "/srv/pool/ab/cd/x".split('/').count());
        assert!(path.to_string_lossy().ends_with("_file"));

        hostile.checksums.md5 = Some(format!("a\u{e9}{}", "0".repeat(29)));
        assert!(pool.path_for(&hostile).starts_with("/srv/pool"));
    }

    #[test]
    fn test_store_and_contains() {
        let dir = tempdir().unwrap();
        let pool = PackagePool::new(dir.path());
        let file = deb(Some(SHA256));

        assert!(!pool.contains(&file));
        let path = pool.store(&file, b"alpha").unwrap();
        assert!(pool.contains(&file));
        assert_eq!(std::fs::read(path).unwrap(), b"alpha");

        // A truncated file does not count.
        std::fs::write(pool.path_for(&file), b"alp").unwrap();
        assert!(!pool.contains(&file));

        // Neither does one of the right size with other bytes.
        std::fs::write(pool.path_for(&file), b"ALPHA").unwrap();
        assert!(!pool.contains(&file));
    }
}
