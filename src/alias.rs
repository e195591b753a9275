//! In-memory alias table: registered phrase → absolute script path.
//!
//! Phrases are stored exactly as entered. Uniqueness is by the raw phrase, so
//! `"Backup"` and `"backup"` are two distinct entries even though they
//! normalize identically. Insertion order is kept because the substring tier
//! of the matcher walks entries in that order.

use crate::errors::ValidationError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One registered phrase and the script it launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub phrase: String,
    pub path: String,
}

/// Ordered phrase → path mapping with unique raw phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AliasEntry> {
        self.entries.iter()
    }

    pub fn get(&self, phrase: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.phrase == phrase)
            .map(|e| e.path.as_str())
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.get(phrase).is_some()
    }

    /// Register or update a phrase.
    ///
    /// Updating an existing phrase keeps its original position. Returns the
    /// previous path, if any.
    pub fn insert(
        &mut self,
        phrase: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Option<String>, ValidationError> {
        let phrase = phrase.into();
        let path = path.into();
        if phrase.is_empty() {
            return Err(ValidationError::EmptyPhrase);
        }
        if path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        match self.entries.iter_mut().find(|e| e.phrase == phrase) {
            Some(entry) => Ok(Some(std::mem::replace(&mut entry.path, path))),
            None => {
                self.entries.push(AliasEntry { phrase, path });
                Ok(None)
            }
        }
    }

    /// Remove a phrase by exact raw key.
    pub fn remove(&mut self, phrase: &str) -> Option<AliasEntry> {
        self.remove_indexed(phrase).map(|(_, entry)| entry)
    }

    /// Remove a phrase by exact raw key, also returning where it sat.
    pub fn remove_indexed(&mut self, phrase: &str) -> Option<(usize, AliasEntry)> {
        let idx = self.entries.iter().position(|e| e.phrase == phrase)?;
        Some((idx, self.entries.remove(idx)))
    }

    /// Put a removed entry back at `index` (clamped to the end).
    pub fn restore(&mut self, index: usize, entry: AliasEntry) {
        if self.contains(&entry.phrase) {
            return;
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Entries sorted case-insensitively by phrase, for display.
    pub fn sorted_for_display(&self) -> Vec<&AliasEntry> {
        let mut sorted: Vec<&AliasEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.phrase.to_lowercase());
        sorted
    }

    /// Width (in chars) of the widest phrase.
    pub fn widest_phrase(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.phrase.chars().count())
            .max()
            .unwrap_or(0)
    }
}

// The table is persisted as a flat JSON object. A custom map impl keeps the
// file's key order on load, which a HashMap/BTreeMap round trip would lose.
impl Serialize for AliasTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.phrase, &entry.path)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AliasTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = AliasTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping phrases to script paths")
            }

            // Bad entries are skipped so one of them cannot cost the rest.
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AliasTable, A::Error> {
                let mut table = AliasTable::new();
                while let Some((phrase, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    let path = match value {
                        serde_json::Value::String(path) => path,
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        other => {
                            warn!(phrase = %phrase, value = %other, "skipping alias without a path");
                            continue;
                        }
                    };
                    if let Err(err) = table.insert(phrase.as_str(), path) {
                        warn!(phrase = %phrase, error = %err, "skipping invalid alias");
                    }
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// A script path that passed registration-time validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedScript {
    pub path: PathBuf,
    /// False when the file does not carry the expected script extension.
    pub extension_matches: bool,
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Check that `raw` names an existing regular file and resolve it to an
/// absolute path.
pub fn validate_script_path(
    raw: &str,
    expected_extension: &str,
) -> Result<ValidatedScript, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyPath);
    }
    let expanded = expand_home(raw.trim());
    let path = expanded
        .canonicalize()
        .map_err(|_| ValidationError::NotFound(absolute_lexical(&expanded)))?;
    if path.is_dir() {
        return Err(ValidationError::IsDirectory(path));
    }
    if !path.is_file() {
        return Err(ValidationError::NotRegularFile(path));
    }
    let extension_matches = has_extension(&path, expected_extension);
    Ok(ValidatedScript {
        path,
        extension_matches,
    })
}

/// Case-insensitive extension check; the expected extension may carry a dot.
pub fn has_extension(path: &Path, expected: &str) -> bool {
    let expected = expected.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected))
}

fn absolute_lexical(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_insert_keeps_raw_phrase_and_order() {
        let mut table = AliasTable::new();
        table.insert("Scrape Program", "/s/scrape.py").unwrap();
        table.insert("backup", "/s/backup.py").unwrap();
        table.insert("Backup", "/s/backup2.py").unwrap();

        let phrases: Vec<&str> = table.iter().map(|e| e.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["Scrape Program", "backup", "Backup"]);
    }

    #[test]
    fn test_insert_existing_phrase_updates_in_place() {
        let mut table = AliasTable::new();
        table.insert("a", "/one.py").unwrap();
        table.insert("b", "/two.py").unwrap();
        let previous = table.insert("a", "/three.py").unwrap();

        assert_eq!(previous.as_deref(), Some("/one.py"));
        assert_eq!(table.iter().next().unwrap().path, "/three.py");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_insert_rejects_empty_path_and_phrase() {
        let mut table = AliasTable::new();
        assert!(matches!(table.insert("x", ""), Err(ValidationError::EmptyPath)));
        assert!(matches!(table.insert("", "/x.py"), Err(ValidationError::EmptyPhrase)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_by_exact_phrase() {
        let mut table = AliasTable::new();
        table.insert("Backup", "/b.py").unwrap();
        assert!(table.remove("backup").is_none());
        let removed = table.remove("Backup").unwrap();
        assert_eq!(removed.path, "/b.py");
        assert!(table.is_empty());
    }

    #[test]
    fn test_sorted_for_display_is_case_insensitive() {
        let mut table = AliasTable::new();
        table.insert("zeta", "/z.py").unwrap();
        table.insert("Alpha", "/a.py").unwrap();
        table.insert("beta", "/b.py").unwrap();
        let sorted: Vec<&str> = table
            .sorted_for_display()
            .iter()
            .map(|e| e.phrase.as_str())
            .collect();
        assert_eq!(sorted, vec!["Alpha", "beta", "zeta"]);
        assert_eq!(table.widest_phrase(), 5);
    }

    #[test]
    fn test_json_round_trip_preserves_order_and_bytes() {
        let mut table = AliasTable::new();
        table.insert("zz top", "/scripts/ü.py").unwrap();
        table.insert("Ärger app", "/scripts/a b.py").unwrap();
        let json = serde_json::to_string_pretty(&table).unwrap();
        let back: AliasTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert!(json.contains("ü"), "non-ASCII should be written verbatim");
    }

    #[test]
    fn test_deserialize_rejects_non_object() {
        assert!(serde_json::from_str::<AliasTable>("[1, 2]").is_err());
        assert!(serde_json::from_str::<AliasTable>(r#""/a.py""#).is_err());
    }

    #[test]
    fn test_deserialize_skips_bad_entries_and_keeps_the_rest() {
        let table: AliasTable = serde_json::from_str(
            r#"{"keep me": "/k.py", "bad": "", "": "/x.py", "nested": {"a": 1}, "none": null, "count": 7, "last": "/l.py"}"#,
        )
        .unwrap();
        let entries: Vec<(&str, &str)> = table
            .iter()
            .map(|e| (e.phrase.as_str(), e.path.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![("keep me", "/k.py"), ("count", "7"), ("last", "/l.py")]
        );
    }

    #[test]
    fn test_restore_puts_entry_back_in_place() {
        let mut table = AliasTable::new();
        table.insert("first", "/1.py").unwrap();
        table.insert("second", "/2.py").unwrap();
        table.insert("third", "/3.py").unwrap();

        let (idx, entry) = table.remove_indexed("second").unwrap();
        assert_eq!(idx, 1);
        table.restore(idx, entry);
        let phrases: Vec<&str> = table.iter().map(|e| e.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["first", "second", "third"]);

        let entry = AliasEntry {
            phrase: "late".into(),
            path: "/late.py".into(),
        };
        table.restore(99, entry);
        assert_eq!(table.iter().last().unwrap().phrase, "late");
    }

    #[test]
    fn test_validate_script_path_accepts_file() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.py");
        std::fs::write(&script, "print('hi')\n").unwrap();

        let validated = validate_script_path(script.to_str().unwrap(), "py").unwrap();
        assert!(validated.path.is_absolute());
        assert!(validated.extension_matches);
    }

    #[test]
    fn test_validate_script_path_flags_extension() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "echo hi\n").unwrap();

        let validated = validate_script_path(script.to_str().unwrap(), ".py").unwrap();
        assert!(!validated.extension_matches);
    }

    #[test]
    fn test_validate_script_path_rejects_missing_and_directories() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.py");
        assert!(matches!(
            validate_script_path(missing.to_str().unwrap(), "py"),
            Err(ValidationError::NotFound(_))
        ));
        assert!(matches!(
            validate_script_path(dir.path().to_str().unwrap(), "py"),
            Err(ValidationError::IsDirectory(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_script_path_rejects_device_files() {
        assert!(matches!(
            validate_script_path("/dev/null", "py"),
            Err(ValidationError::NotRegularFile(_))
        ));
    }
}
