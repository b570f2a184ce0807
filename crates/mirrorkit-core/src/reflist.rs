//! Immutable, sorted sets of package keys.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::Utc;
use diesel::SqliteConnection;
use mirrorkit_db::{
    error::DbError,
    models::reflist::NewRefList,
    repository::reflist::RefListRepository,
};
use mirrorkit_utils::hash::blake3_hex;

use crate::{error::Result, package::PackageRecord, store::PackageStore};

/// Keys resolved per round trip when enumerating packages.
const RESOLVE_PAGE: usize = 256;

/// The packages a mirror or snapshot contains, as sorted store keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefList {
    refs: Vec<String>,
}

/// One entry of [`RefList::diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageDiff {
    Added(String),
    Removed(String),
    Changed { left: String, right: String },
}

impl RefList {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut refs: Vec<String> = keys.into_iter().map(Into::into).collect();
        refs.sort();
        refs.dedup();
        Self { refs }
    }

    /// Content address: identical key sets give identical keys.
    pub fn key(&self) -> String {
        blake3_hex(self.refs.join("\n").as_bytes())
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.refs.binary_search_by(|r| r.as_str().cmp(key)).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().map(String::as_str)
    }

    /// Lazily resolves every key against `store`, in key order.
    ///
    /// Keys are loaded a page at a time. A key the store does not hold yields an
    /// integrity error, after which iteration continues.
    pub fn packages<'a>(&'a self, store: &'a PackageStore) -> Packages<'a> {
        Packages {
            refs: &self.refs,
            store,
            pos: 0,
            page: Vec::new().into_iter(),
        }
    }

    /// Compares two lists by `(architecture, name)`.
    ///
    /// Keys present on one side only are added or removed; a pair with the same
    /// architecture and name but a different key is changed.
    pub fn diff(&self, other: &RefList) -> Vec<PackageDiff> {
        let mut left: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        let mut right: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        for key in &self.refs {
            left.entry(arch_name(key)).or_default().push(key);
        }
        for key in &other.refs {
            right.entry(arch_name(key)).or_default().push(key);
        }

        let mut diff = Vec::new();
        let mut l = left.into_iter().peekable();
        let mut r = right.into_iter().peekable();

        loop {
            let order = match (l.peek(), r.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((a, _)), Some((b, _))) => a.cmp(b),
            };
            match order {
                Ordering::Less => {
                    if let Some((_, keys)) = l.next() {
                        diff.extend(keys.into_iter().map(|k| PackageDiff::Removed(k.into())));
                    }
                }
                Ordering::Greater => {
                    if let Some((_, keys)) = r.next() {
                        diff.extend(keys.into_iter().map(|k| PackageDiff::Added(k.into())));
                    }
                }
                Ordering::Equal => {
                    if let (Some((_, lk)), Some((_, rk))) = (l.next(), r.next()) {
                        diff_group(&lk, &rk, &mut diff);
                    }
                }
            }
        }

        diff
    }

    pub(crate) fn from_stored(refs: Vec<String>) -> Self {
        Self::from_keys(refs)
    }

    pub(crate) fn save(&self, conn: &mut SqliteConnection) -> diesel::QueryResult<usize> {
        RefListRepository::insert_or_ignore(
            conn,
            &NewRefList {
                key: &self.key(),
                refs: serde_json::Value::from(self.refs.clone()),
                created_at: Utc::now().to_rfc3339(),
            },
        )
    }

    pub(crate) fn load(conn: &mut SqliteConnection, key: &str) -> Result<Self> {
        let row = RefListRepository::find_by_key(conn, key)?.ok_or_else(|| {
            DbError::IntegrityError(format!("reflist {key} is missing"))
        })?;
        let refs: Vec<String> = serde_json::from_value(row.refs)?;
        Ok(Self::from_stored(refs))
    }
}

/// Within one `(arch, name)` group: versions present on both sides are
/// unchanged, the rest pair up as changes with leftovers added or removed.
fn diff_group(left: &[&str], right: &[&str], diff: &mut Vec<PackageDiff>) {
    let only_left: Vec<&str> = left.iter().copied().filter(|k| !right.contains(k)).collect();
    let only_right: Vec<&str> = right.iter().copied().filter(|k| !left.contains(k)).collect();

    let paired = only_left.len().min(only_right.len());
    for (l, r) in only_left.iter().zip(&only_right) {
        diff.push(PackageDiff::Changed {
            left: l.to_string(),
            right: r.to_string(),
        });
    }
    diff.extend(only_left[paired..].iter().map(|k| PackageDiff::Removed(k.to_string())));
    diff.extend(only_right[paired..].iter().map(|k| PackageDiff::Added(k.to_string())));
}

fn arch_name(key: &str) -> (&str, &str) {
    let mut parts = key.splitn(3, ' ');
    let arch = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    (arch.strip_prefix('P').unwrap_or(arch), name)
}

/// Iterator returned by [`RefList::packages`].
pub struct Packages<'a> {
    refs: &'a [String],
    store: &'a PackageStore,
    pos: usize,
    page: std::vec::IntoIter<Result<PackageRecord>>,
}

impl Packages<'_> {
    fn load_page(&mut self) {
        let end = (self.pos + RESOLVE_PAGE).min(self.refs.len());
        let wanted = &self.refs[self.pos..end];
        self.pos = end;

        let keys: Vec<&str> = wanted.iter().map(String::as_str).collect();
        let items: Vec<Result<PackageRecord>> = match self.store.get_many(&keys) {
            Ok(records) => {
                // get_many returns key order, which is also RefList order.
                let mut found = records.into_iter().peekable();
                wanted
                    .iter()
                    .map(|key| {
                        match found.peek() {
                            Some(record) if record.key() == *key => {
                                found.next().ok_or_else(|| missing(key))
                            }
                            _ => Err(missing(key)),
                        }
                    })
                    .collect()
            }
            Err(err) => vec![Err(err)],
        };
        self.page = items.into_iter();
    }
}

fn missing(key: &str) -> crate::error::MirrorError {
    DbError::IntegrityError(format!("package {key} is missing from the store")).into()
}

impl Iterator for Packages<'_> {
    type Item = Result<PackageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.page.next() {
                return Some(item);
            }
            if self.pos >= self.refs.len() {
                return None;
            }
            self.load_page();
        }
    }
}
