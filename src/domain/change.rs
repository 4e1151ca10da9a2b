use std::collections::BTreeMap;

use blake3::Hasher;

/// Changed paths plus one textual diff per path.
///
/// Paths are kept in lexicographic order so prompts built from the same
/// working tree are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<String>,
    diffs: BTreeMap<String, String>,
}

impl ChangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a change set from a file list and a diff map. Files without an
    /// entry in `diffs` get an empty diff; diff entries for files that are not
    /// listed are dropped.
    pub fn new(files: Vec<String>, mut diffs: BTreeMap<String, String>) -> Self {
        let mut files = files;
        files.sort();
        files.dedup();

        let diffs = files
            .iter()
            .map(|path| (path.clone(), diffs.remove(path).unwrap_or_default()))
            .collect();

        Self { files, diffs }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn diffs(&self) -> &BTreeMap<String, String> {
        &self.diffs
    }

    pub fn diff(&self, path: &str) -> Option<&str> {
        self.diffs.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Content hash over every path and diff.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        for (path, diff) in &self.diffs {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(diff.len().to_string().as_bytes());
            hasher.update(&[0]);
            hasher.update(diff.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}
