//! Match criteria and exclusion sets.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::TableSchema;
use crate::error::{CompareError, Result};

/// Default location of the exclude-column file.
pub const DEFAULT_EXCLUDE_FILE: &str = "exclude_columns.txt";

/// Which columns participate in matching and diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// Explicit include list. Empty means every column.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Columns never used for matching or diffing.
    #[serde(default)]
    pub exclude_columns: Vec<String>,

    /// Keep primary key columns (or, without key metadata, columns named
    /// `id`) in the matching key.
    #[serde(default)]
    pub include_primary_key: bool,

    /// Also exclude the columns listed in `exclude_columns_file`.
    #[serde(default = "default_true")]
    pub exclude_columns_from_file: bool,

    /// Path of the exclude-column file.
    #[serde(default = "default_exclude_file")]
    pub exclude_columns_file: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_exclude_file() -> PathBuf {
    PathBuf::from(DEFAULT_EXCLUDE_FILE)
}

impl Default for MatchCriteria {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            exclude_columns: Vec::new(),
            include_primary_key: false,
            exclude_columns_from_file: true,
            exclude_columns_file: default_exclude_file(),
        }
    }
}

impl MatchCriteria {
    /// Load the exclude file (if enabled) and freeze the effective criteria.
    ///
    /// A file that cannot be read is reported as a warning and contributes
    /// no columns.
    pub fn resolve(&self) -> ResolvedCriteria {
        let file_columns = if self.exclude_columns_from_file {
            match load_exclude_columns(&self.exclude_columns_file) {
                Ok(cols) => {
                    debug!(
                        "Loaded {} exclude columns from {}",
                        cols.len(),
                        self.exclude_columns_file.display()
                    );
                    cols
                }
                Err(e) => {
                    warn!("Could not load exclude columns from file: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        ResolvedCriteria::new(
            self.columns.clone(),
            &self.exclude_columns,
            file_columns,
            self.include_primary_key,
        )
    }
}

/// Read an exclude-column file: one name per line, `#` comments and blank lines skipped.
pub fn load_exclude_columns(path: &Path) -> Result<Vec<String>> {
    if path.as_os_str().is_empty() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|e| {
        CompareError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open exclude columns file {}: {}", path.display(), e),
        ))
    })?;
    Ok(parse_exclude_columns(&content))
}

pub(crate) fn parse_exclude_columns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Columns excluded from matching and diffing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(HashSet<String>);

impl ExclusionSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, columns: I) {
        self.0.extend(columns);
    }

    /// Excluded names in sorted order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.0.iter().map(String::as_str).collect();
        cols.sort_unstable();
        cols
    }
}

/// Criteria with the exclude file already loaded.
///
/// Key derivation and diffing only ever see this type, so neither touches
/// the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCriteria {
    /// Explicit include list. Empty means every column.
    pub columns: Vec<String>,

    /// Explicit exclusions plus file exclusions.
    pub exclusions: ExclusionSet,

    /// Drop columns named `id` from generated keys. Cleared once declared
    /// primary key columns are excluded instead.
    pub skip_id_columns: bool,

    file_columns: Vec<String>,
}

impl Default for ResolvedCriteria {
    fn default() -> Self {
        Self::new(Vec::new(), &[], Vec::new(), false)
    }
}

impl ResolvedCriteria {
    pub fn new(
        columns: Vec<String>,
        exclude_columns: &[String],
        file_columns: Vec<String>,
        include_primary_key: bool,
    ) -> Self {
        let exclusions = ExclusionSet::new(
            exclude_columns
                .iter()
                .chain(file_columns.iter())
                .cloned(),
        );
        Self {
            columns,
            exclusions,
            skip_id_columns: !include_primary_key,
            file_columns,
        }
    }

    /// Criteria excluding only the given columns, no file.
    pub fn excluding<S: AsRef<str>>(columns: &[S]) -> Self {
        let cols: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Self::new(Vec::new(), &cols, Vec::new(), false)
    }

    /// Fresh criteria for a table reached through a foreign key.
    ///
    /// Excludes the referenced table's primary key columns and keeps the
    /// caller's file exclusions. Explicit include/exclude lists are not inherited.
    pub fn for_referenced_table(&self, schema: &TableSchema) -> Self {
        Self::new(Vec::new(), &[], self.file_columns.clone(), false).with_primary_key(schema)
    }

    /// Exclude the primary key columns `schema` declares.
    ///
    /// Skipped when an include list pins the key or primary keys are kept.
    /// A declared key replaces the `id` name heuristic; tables without key
    /// metadata keep it.
    #[must_use]
    pub fn with_primary_key(mut self, schema: &TableSchema) -> Self {
        if !self.columns.is_empty() || !self.skip_id_columns {
            return self;
        }
        let pk = schema.primary_key_columns();
        if !pk.is_empty() {
            self.exclusions.extend(pk);
            self.skip_id_columns = false;
        }
        self
    }

    pub fn is_excluded(&self, column: &str) -> bool {
        self.exclusions.contains(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnMetadata;
    use std::io::Write;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let cols = parse_exclude_columns("# audit\ncreated_at\n\n  updated_at  \n#x\n");
        assert_eq!(cols, vec!["created_at", "updated_at"]);
    }

    #[test]
    fn test_resolve_merges_file_and_explicit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "updated_at").unwrap();

        let criteria = MatchCriteria {
            exclude_columns: vec!["id".into()],
            exclude_columns_file: file.path().to_path_buf(),
            ..Default::default()
        };
        let resolved = criteria.resolve();
        assert!(resolved.is_excluded("id"));
        assert!(resolved.is_excluded("updated_at"));
        assert_eq!(resolved.exclusions.len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty_addition() {
        let criteria = MatchCriteria {
            exclude_columns: vec!["id".into()],
            exclude_columns_file: PathBuf::from("/nonexistent/exclude_columns.txt"),
            ..Default::default()
        };
        let resolved = criteria.resolve();
        assert_eq!(resolved.exclusions.sorted(), vec!["id"]);
    }

    #[test]
    fn test_file_disabled_is_not_read() {
        let criteria = MatchCriteria {
            exclude_columns_from_file: false,
            exclude_columns_file: PathBuf::from("/nonexistent/file"),
            ..Default::default()
        };
        assert!(criteria.resolve().exclusions.is_empty());
    }

    #[test]
    fn test_referenced_table_criteria() {
        let parent = ResolvedCriteria::new(
            vec!["name".into()],
            &["amount".to_string()],
            vec!["updated_at".into()],
            true,
        );
        let mut users = TableSchema::new("public", "users");
        users.columns = vec![
            ColumnMetadata::new("user_pk", "integer").primary_key(),
            ColumnMetadata::new("email", "text"),
        ];

        let child = parent.for_referenced_table(&users);
        assert!(child.columns.is_empty());
        assert!(!child.skip_id_columns);
        assert!(child.is_excluded("user_pk"));
        assert!(child.is_excluded("updated_at"));
        assert!(!child.is_excluded("amount"));
    }

    #[test]
    fn test_declared_primary_key_replaces_id_heuristic() {
        let mut schema = TableSchema::new("public", "orders");
        schema.columns = vec![
            ColumnMetadata::new("order_no", "integer").primary_key(),
            ColumnMetadata::new("id", "text"),
            ColumnMetadata::new("amount", "numeric"),
        ];
        let resolved = ResolvedCriteria::excluding(&["amount"]).with_primary_key(&schema);
        assert!(resolved.is_excluded("order_no"));
        assert!(resolved.is_excluded("amount"));
        assert!(!resolved.skip_id_columns);
    }

    #[test]
    fn test_primary_key_kept_when_pinned_or_included() {
        let mut schema = TableSchema::new("public", "orders");
        schema.columns = vec![ColumnMetadata::new("order_no", "integer").primary_key()];

        let pinned = ResolvedCriteria::new(vec!["amount".into()], &[], Vec::new(), false)
            .with_primary_key(&schema);
        assert!(!pinned.is_excluded("order_no"));

        let kept =
            ResolvedCriteria::new(Vec::new(), &[], Vec::new(), true).with_primary_key(&schema);
        assert!(!kept.is_excluded("order_no"));
    }

    #[test]
    fn test_no_key_metadata_keeps_id_heuristic() {
        let schema = TableSchema::new("public", "events");
        let resolved = ResolvedCriteria::default().with_primary_key(&schema);
        assert!(resolved.exclusions.is_empty());
        assert!(resolved.skip_id_columns);
    }
}
