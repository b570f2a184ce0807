//! Package records parsed from `Packages` and `Sources` indices.

use std::fmt;

use mirrorkit_utils::hash::blake3_hex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    checksum::{ChecksumInfo, DigestKind},
    control::{split_paragraphs, Stanza},
};

/// Number of hex digits of the file digest kept in a package key.
const KEY_HASH_LEN: usize = 16;

/// Which kind of index a stanza came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Binary,
    Source,
}

/// A file belonging to a package, relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    pub filename: String,
    #[serde(flatten)]
    pub checksums: ChecksumInfo,
}

impl PackageFile {
    pub fn basename(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }
}

/// Metadata for one package as listed by an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    /// `source` for source packages.
    pub architecture: String,
    pub source: Option<String>,
    pub files: Vec<PackageFile>,
    /// The stanza exactly as the index listed it.
    pub stanza: String,
}

impl PackageRecord {
    /// Content key: `P{arch} {name} {version} {digest}`.
    ///
    /// The digest covers every file's name, size and checksums, so the same
    /// package served by two archives gets the same key.
    pub fn key(&self) -> String {
        let mut files: Vec<&PackageFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut material = String::new();
        for file in files {
            let c = &file.checksums;
            material.push_str(&format!(
                "{}\0{}\0{}\0{}\0{}\n",
                file.filename,
                c.size,
                c.md5.as_deref().unwrap_or_default(),
                c.sha1.as_deref().unwrap_or_default(),
                c.sha256.as_deref().unwrap_or_default(),
            ));
        }
        let digest = blake3_hex(material.as_bytes());

        format!(
            "P{} {} {} {}",
            self.architecture,
            self.name,
            self.version,
            &digest[..KEY_HASH_LEN]
        )
    }

    pub fn from_stanza(stanza: &Stanza, kind: IndexKind) -> Result<Self, String> {
        match kind {
            IndexKind::Binary => Self::from_binary_stanza(stanza),
            IndexKind::Source => Self::from_source_stanza(stanza),
        }
    }

    pub fn from_binary_stanza(stanza: &Stanza) -> Result<Self, String> {
        let name = required(stanza, "Package")?.to_string();
        let version = required(stanza, "Version")?.to_string();
        let architecture = required(stanza, "Architecture")?.to_string();
        let filename = required(stanza, "Filename")?.to_string();
        let size = required(stanza, "Size")?
            .parse()
            .map_err(|_| "field `Size` is not a number".to_string())?;

        let checksums = ChecksumInfo {
            size,
            md5: digest_field(stanza, "MD5sum", DigestKind::Md5)?,
            sha1: digest_field(stanza, "SHA1", DigestKind::Sha1)?,
            sha256: digest_field(stanza, "SHA256", DigestKind::Sha256)?,
        };

        Ok(Self {
            name,
            version,
            architecture,
            source: stanza.get("Source").map(source_name),
            files: vec![PackageFile {
                filename,
                checksums,
            }],
            stanza: stanza.to_string(),
        })
    }

    /// Source stanzas list their files in `Files` and `Checksums-*`, relative
    /// to `Directory`.
    pub fn from_source_stanza(stanza: &Stanza) -> Result<Self, String> {
        let directory = required(stanza, "Directory")?.trim_end_matches('/');
        let mut files: Vec<PackageFile> = Vec::new();

        let sections: [(&str, DigestKind, fn(&mut ChecksumInfo, String)); 3] = [
            ("Files", DigestKind::Md5, |c, h| c.md5 = Some(h)),
            ("Checksums-Sha1", DigestKind::Sha1, |c, h| c.sha1 = Some(h)),
            ("Checksums-Sha256", DigestKind::Sha256, |c, h| c.sha256 = Some(h)),
        ];

        for (section, kind, set) in sections {
            for line in stanza.lines(section) {
                let mut parts = line.split_whitespace();
                let (Some(hash), Some(size), Some(name), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(format!("malformed `{section}` entry `{line}`"));
                };
                let size: u64 = size
                    .parse()
                    .map_err(|_| format!("malformed `{section}` entry `{line}`"))?;
                let hash = kind
                    .parse(hash)
                    .map_err(|err| format!("`{section}`: {err}"))?;
                if name.contains('/') {
                    return Err(format!("malformed `{section}` entry `{line}`"));
                }
                let filename = format!("{directory}/{name}");

                let idx = match files.iter().position(|f| f.filename == filename) {
                    Some(idx) => idx,
                    None => {
                        files.push(PackageFile {
                            filename,
                            checksums: ChecksumInfo {
                                size,
                                ..Default::default()
                            },
                        });
                        files.len() - 1
                    }
                };
                let file = &mut files[idx];
                if file.checksums.size != size {
                    return Err(format!("conflicting sizes for {}", file.filename));
                }
                set(&mut file.checksums, hash);
            }
        }

        if files.is_empty() {
            return Err("source package lists no files".into());
        }

        let name = required(stanza, "Package")?.to_string();
        Ok(Self {
            source: Some(name.clone()),
            name,
            version: required(stanza, "Version")?.to_string(),
            architecture: "source".into(),
            files,
            stanza: stanza.to_string(),
        })
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.name, self.version, self.architecture)
    }
}

fn digest_field(stanza: &Stanza, field: &str, kind: DigestKind) -> Result<Option<String>, String> {
    stanza
        .get(field)
        .map(|value| kind.parse(value).map_err(|err| format!("field `{field}`: {err}")))
        .transpose()
}

fn required<'a>(stanza: &'a Stanza, field: &str) -> Result<&'a str, String> {
    stanza
        .get(field)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing field `{field}`"))
}

/// `Source: foo (1.2-1)` names the source `foo`.
fn source_name(value: &str) -> String {
    value.split_whitespace().next().unwrap_or(value).to_string()
}

/// Parses a whole index. Stanzas are parsed in parallel; the result keeps
/// index order. Errors carry the line the offending stanza starts on.
pub fn parse_index(text: &str, kind: IndexKind) -> Result<Vec<PackageRecord>, String> {
    let paragraphs = split_paragraphs(text);

    let parsed: Vec<Option<PackageRecord>> = paragraphs
        .par_iter()
        .map(|p| {
            let stanza = Stanza::parse(p.text, p.first_line).map_err(|err| err.to_string())?;
            if stanza.is_empty() {
                return Ok(None);
            }
            PackageRecord::from_stanza(&stanza, kind)
                .map(Some)
                .map_err(|err| format!("line {}: {err}", p.first_line))
        })
        .collect::<Result<_, String>>()?;

    Ok(parsed.into_iter().flatten().collect())
}
