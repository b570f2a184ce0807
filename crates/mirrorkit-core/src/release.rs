//! Release file parsing.

use std::collections::BTreeMap;

use crate::{
    checksum::{ChecksumInfo, DigestKind},
    control::parse_stanzas,
};

/// Checksum sections and which digest each one carries.
const SECTIONS: [(&str, DigestKind); 3] = [
    ("MD5Sum", DigestKind::Md5),
    ("SHA1", DigestKind::Sha1),
    ("SHA256", DigestKind::Sha256),
];

/// A parsed Release document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFile {
    /// Every field except the checksum sections.
    pub meta: BTreeMap<String, String>,
    /// Files listed in the checksum sections, keyed by path relative to the
    /// distribution directory.
    pub files: BTreeMap<String, ChecksumInfo>,
}

impl ReleaseFile {
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(data).map_err(|err| format!("not UTF-8: {err}"))?;
        let mut stanzas = parse_stanzas(text).map_err(|err| err.to_string())?;
        if stanzas.len() != 1 {
            return Err(format!("expected one paragraph, found {}", stanzas.len()));
        }
        let stanza = stanzas.remove(0);

        let mut files: BTreeMap<String, ChecksumInfo> = BTreeMap::new();
        for (section, digest) in SECTIONS {
            for line in stanza.lines(section) {
                let (path, entry) = parse_entry(line, digest)
                    .ok_or_else(|| format!("malformed {section} entry `{line}`"))?;
                match files.get_mut(&path) {
                    Some(existing) => {
                        if !existing.merge(&entry) {
                            return Err(format!("conflicting sizes for {path}"));
                        }
                    }
                    None => {
                        files.insert(path, entry);
                    }
                }
            }
        }

        if files.is_empty() {
            return Err("no checksum sections".into());
        }

        let meta = stanza
            .fields()
            .filter(|(name, _)| {
                !SECTIONS
                    .iter()
                    .any(|(section, _)| section.eq_ignore_ascii_case(name))
            })
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Ok(Self { meta, files })
    }

    /// Binary architectures offered. `source` is never listed here.
    pub fn architectures(&self) -> Vec<String> {
        split_list(self.field("Architectures"))
            .filter(|arch| *arch != "source")
            .map(String::from)
            .collect()
    }

    /// Components, with any `updates/` style prefix stripped.
    pub fn components(&self) -> Vec<String> {
        split_list(self.field("Components"))
            .map(|c| c.rsplit('/').next().unwrap_or(c).to_string())
            .collect()
    }

    fn field(&self, name: &str) -> &str {
        self.meta
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split_whitespace()
}

fn parse_entry(line: &str, digest: DigestKind) -> Option<(String, ChecksumInfo)> {
    let mut parts = line.split_whitespace();
    let hash = digest.parse(parts.next()?).ok()?;
    let size = parts.next()?.parse().ok()?;
    let path = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }

    let mut info = ChecksumInfo {
        size,
        ..Default::default()
    };
    match digest {
        DigestKind::Md5 => info.md5 = Some(hash),
        DigestKind::Sha1 => info.sha1 = Some(hash),
        DigestKind::Sha256 => info.sha256 = Some(hash),
    }
    Some((path, info))
}
