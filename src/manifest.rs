//! Manifest Document Store: load/save TOML documents (crate manifests, the
//! workspace root manifest, and the TOML fences embedded in Markdown docs)
//! with full round-trip fidelity — comments, key order, and inline trivia
//! all survive edits untouched, because every edit goes through
//! `toml_edit::DocumentMut` rather than a lossy `serde` map.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use toml_edit::{DocumentMut, Item, Table};

use crate::error::LadingError;

/// A loaded, editable TOML document backed by a file on disk.
pub struct ManifestDocument {
    path: PathBuf,
    doc: DocumentMut,
}

impl ManifestDocument {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LadingError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(LadingError::Io)?;
        let doc: DocumentMut = text
            .parse()
            .map_err(|e| LadingError::manifest_parse(path.clone(), e))?;
        Ok(Self { path, doc })
    }

    pub fn from_str(path: impl Into<PathBuf>, text: &str) -> Result<Self, LadingError> {
        let path = path.into();
        let doc: DocumentMut = text
            .parse()
            .map_err(|e| LadingError::manifest_parse(path.clone(), e))?;
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_table(&self) -> &Table {
        self.doc.as_table()
    }

    pub fn as_table_mut(&mut self) -> &mut Table {
        self.doc.as_table_mut()
    }

    pub fn to_string(&self) -> String {
        self.doc.to_string()
    }

    /// Atomically write the current document contents back to `path`:
    /// write to a sibling temp file, then rename over the target. Either
    /// the old contents or the new contents are observable at any point,
    /// never a partial write.
    pub fn save(&self) -> Result<(), LadingError> {
        atomic_write(&self.path, &self.doc.to_string())
    }

    /// Get the value at a dotted path, e.g. `"package.version"`.
    pub fn get(&self, dotted_path: &str) -> Option<&Item> {
        let mut cursor: &Item = self.doc.as_item();
        for segment in dotted_path.split('.') {
            cursor = cursor.get(segment)?;
        }
        Some(cursor)
    }

    /// Set the value at a dotted path, creating intermediate tables as
    /// needed. Intermediate tables are created as ordinary (non-inline)
    /// tables, matching how Cargo manifests are conventionally laid out.
    pub fn set(&mut self, dotted_path: &str, value: Item) {
        let segments: Vec<&str> = dotted_path.split('.').collect();
        let (last, init) = segments.split_last().expect("dotted path is non-empty");
        let mut table = self.doc.as_table_mut();
        for segment in init {
            table = table
                .entry(segment)
                .or_insert_with(|| Item::Table(Table::new()))
                .as_table_mut()
                .expect("intermediate path segment is a table");
        }
        table.insert(last, value);
    }

    /// Remove the value at a dotted path, if present. Returns the removed
    /// item.
    pub fn remove(&mut self, dotted_path: &str) -> Option<Item> {
        let segments: Vec<&str> = dotted_path.split('.').collect();
        let (last, init) = segments.split_last().expect("dotted path is non-empty");
        let mut table: &mut Table = self.doc.as_table_mut();
        for segment in init {
            table = table.get_mut(segment)?.as_table_mut()?;
        }
        table.remove(last)
    }

    /// Rewrite the `version` requirement of a dependency entry under
    /// `section_table[key]`, preserving any surrounding operator prefix and
    /// inline options (`path`, `features`, `package`, `default-features`,
    /// `optional`). A bare-string entry (`dep = "^0.1.0"`) has its string
    /// rewritten directly; an inline-table entry has its `version` field
    /// rewritten; an entry with `path` and no `version` field is left
    /// untouched.
    pub fn update_requirement(section_table: &mut Table, key: &str, new_version: &str) -> bool {
        let Some(item) = section_table.get_mut(key) else {
            return false;
        };
        update_requirement_item(item, new_version)
    }
}

fn update_requirement_item(item: &mut Item, new_version: &str) -> bool {
    if let Some(existing) = item.as_str() {
        let rewritten = rewrite_requirement_string(existing, new_version);
        if rewritten != existing {
            *item = toml_edit::value(rewritten);
            return true;
        }
        return false;
    }

    if let Some(inline) = item.as_inline_table_mut() {
        if !inline.contains_key("version") {
            // `path`-only dependency, nothing to rewrite.
            return false;
        }
        if let Some(existing) = inline.get("version").and_then(|v| v.as_str()) {
            let rewritten = rewrite_requirement_string(existing, new_version);
            if rewritten != existing {
                inline.insert("version", rewritten.into());
                return true;
            }
        }
        return false;
    }

    if let Some(table) = item.as_table_like_mut() {
        if !table.contains_key("version") {
            return false;
        }
        if let Some(version_item) = table.get_mut("version") {
            if let Some(existing) = version_item.as_str() {
                let rewritten = rewrite_requirement_string(existing, new_version);
                if rewritten != existing {
                    *version_item = toml_edit::value(rewritten);
                    return true;
                }
            }
        }
        return false;
    }

    false
}

static OPERATOR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\^|~|=|>=|<=|>|<)?\s*").unwrap());

/// Extract the leading operator (one of `^ ~ = >= <= > <` or empty),
/// discard the remainder, and re-emit `<operator><new_version>`. This is a
/// literal text transform: it does not reason about whether the existing
/// requirement already matches `new_version`, it always rewrites the
/// numeric portion to the given string.
pub fn rewrite_requirement_string(existing: &str, new_version: &str) -> String {
    let trimmed = existing.trim();
    let caps = OPERATOR_PREFIX
        .captures(trimmed)
        .expect("regex always matches, even with an empty operator group");
    let operator = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    format!("{operator}{new_version}")
}

fn atomic_write(path: &Path, data: &str) -> Result<(), LadingError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = dir.join(format!(
        ".{}.lading-tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
    ));
    std::fs::write(&temp_path, data).map_err(LadingError::Io)?;
    std::fs::rename(&temp_path, path).map_err(LadingError::Io)?;
    Ok(())
}
