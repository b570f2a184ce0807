//! Expected sizes and digests of remote files.

use mirrorkit_utils::hash::{md5_hex, sha256_hex};
use serde::{Deserialize, Serialize};

/// Size and digests listed for a file in a Release or index file.
///
/// SHA1 is carried so records stay complete, but only SHA256 and MD5 are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Digest algorithms an archive may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Md5,
    Sha1,
    Sha256,
}

impl DigestKind {
    pub fn hex_len(self) -> usize {
        match self {
            DigestKind::Md5 => 32,
            DigestKind::Sha1 => 40,
            DigestKind::Sha256 => 64,
        }
    }

    /// Lowercases `value` and checks it is a hex digest of the right length.
    pub fn parse(self, value: &str) -> Result<String, String> {
        let digest = value.to_ascii_lowercase();
        if digest.len() == self.hex_len() && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(digest)
        } else {
            Err(format!("invalid {self:?} digest `{value}`"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub kind: &'static str,
    pub expected: String,
    pub actual: String,
}

/// A mismatch that was tolerated because checksum errors were ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub url: String,
    pub kind: &'static str,
    pub expected: String,
    pub actual: String,
}

impl Anomaly {
    pub fn new(url: impl Into<String>, mismatch: Mismatch) -> Self {
        Self {
            url: url.into(),
            kind: mismatch.kind,
            expected: mismatch.expected,
            actual: mismatch.actual,
        }
    }
}

impl ChecksumInfo {
    /// Checks `data` against the size, then the strongest digest available.
    pub fn verify(&self, data: &[u8]) -> Result<(), Mismatch> {
        let size = data.len() as u64;
        if size != self.size {
            return Err(Mismatch {
                kind: "size",
                expected: self.size.to_string(),
                actual: size.to_string(),
            });
        }

        if let Some(expected) = &self.sha256 {
            return compare("sha256", expected, sha256_hex(data));
        }
        if let Some(expected) = &self.md5 {
            return compare("md5", expected, md5_hex(data));
        }
        Ok(())
    }

    /// The digest [`verify`](Self::verify) checks: SHA256, else MD5.
    pub fn verified_digest(&self) -> Option<&str> {
        self.sha256.as_deref().or(self.md5.as_deref())
    }

    /// Fills digests missing here from `other`. Returns false if sizes disagree.
    pub(crate) fn merge(&mut self, other: &ChecksumInfo) -> bool {
        if self.size != other.size {
            return false;
        }
        if self.md5.is_none() {
            self.md5.clone_from(&other.md5);
        }
        if self.sha1.is_none() {
            self.sha1.clone_from(&other.sha1);
        }
        if self.sha256.is_none() {
            self.sha256.clone_from(&other.sha256);
        }
        true
    }
}

fn compare(kind: &'static str, expected: &str, actual: String) -> Result<(), Mismatch> {
    if expected.eq_ignore_ascii_case(&actual) {
        Ok(())
    } else {
        Err(Mismatch {
            kind,
            expected: expected.to_string(),
            actual,
        })
    }
}
