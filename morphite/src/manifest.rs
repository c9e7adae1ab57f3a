use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Reference to one change-unit file, produced by manifest loading.
///
/// `change_unit_id` is unique within a database's manifest section; a
/// duplicate id is a load-time error, never silently deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUnitRef {
    pub change_unit_id: String,
    pub source_path: PathBuf,
}

/// The deterministic execution plan read from a manifest file.
///
/// # Purpose
/// A manifest is a JSON object whose top-level keys are database names and
/// whose values are arrays of `{changeUnitId, fileName}` objects. Loading
/// produces, per database, the change-unit references sorted ascending by
/// `changeUnitId` using plain string comparison, regardless of their order
/// in the file.
///
/// Relative `fileName` entries are resolved against the manifest file's
/// parent directory, so a manifest can be loaded from any working directory.
///
/// # Examples
///
/// ```rust,ignore
/// let manifest = Manifest::load(Path::new("migrations/manifest.json"))?;
/// for (database, change_units) in manifest.databases() {
///     for change_unit in change_units {
///         println!("{}: {}", database, change_unit.change_unit_id);
///     }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    databases: BTreeMap<String, Vec<ChangeUnitRef>>,
}

impl Manifest {
    /// Loads and validates a manifest file.
    ///
    /// # Errors
    /// `ManifestError` if the file cannot be read, is not a JSON object of
    /// arrays, an entry lacks `changeUnitId` or `fileName`, or a
    /// `changeUnitId` repeats within one database section.
    pub fn load(path: &Path) -> MorphiteResult<Manifest> {
        let text = fs::read_to_string(path).map_err(|err| {
            MorphiteError::new_with_cause(
                &format!("cannot read manifest file '{}'", path.display()),
                ErrorKind::ManifestError,
                err.into(),
            )
        })?;
        let root: Value = serde_json::from_str(&text).map_err(|err| {
            MorphiteError::new_with_cause(
                &format!("manifest file '{}' is not valid JSON", path.display()),
                ErrorKind::ManifestError,
                err.into(),
            )
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_value(&root, base_dir)
    }

    fn from_value(root: &Value, base_dir: &Path) -> MorphiteResult<Manifest> {
        let sections = root.as_object().ok_or_else(|| {
            MorphiteError::new(
                "manifest root must be a JSON object keyed by database name",
                ErrorKind::ManifestError,
            )
        })?;

        let mut databases = BTreeMap::new();
        for (database, section) in sections {
            let entries = section.as_array().ok_or_else(|| {
                MorphiteError::new(
                    &format!("manifest section for '{}' must be an array", database),
                    ErrorKind::ManifestError,
                )
            })?;

            let mut change_units = Vec::with_capacity(entries.len());
            for entry in entries {
                change_units.push(Self::parse_entry(database, entry, base_dir)?);
            }

            change_units.sort_by(|a, b| a.change_unit_id.cmp(&b.change_unit_id));
            for window in change_units.windows(2) {
                if window[0].change_unit_id == window[1].change_unit_id {
                    return Err(MorphiteError::new(
                        &format!(
                            "duplicate change unit id '{}' in manifest section for '{}'",
                            window[0].change_unit_id, database
                        ),
                        ErrorKind::ManifestError,
                    ));
                }
            }

            debug!(
                "manifest section '{}' holds {} change units",
                database,
                change_units.len()
            );
            databases.insert(database.clone(), change_units);
        }

        Ok(Manifest { databases })
    }

    fn parse_entry(database: &str, entry: &Value, base_dir: &Path) -> MorphiteResult<ChangeUnitRef> {
        let change_unit_id = entry
            .get("changeUnitId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MorphiteError::new(
                    &format!(
                        "manifest entry for '{}' requires a 'changeUnitId' string",
                        database
                    ),
                    ErrorKind::ManifestError,
                )
            })?;
        let file_name = entry
            .get("fileName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MorphiteError::new(
                    &format!(
                        "manifest entry for '{}' requires a 'fileName' string",
                        database
                    ),
                    ErrorKind::ManifestError,
                )
            })?;

        let file_path = Path::new(file_name);
        let source_path = if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            base_dir.join(file_path)
        };

        Ok(ChangeUnitRef {
            change_unit_id: change_unit_id.to_string(),
            source_path,
        })
    }

    /// Iterates database sections in name order.
    pub fn databases(&self) -> impl Iterator<Item = (&String, &Vec<ChangeUnitRef>)> {
        self.databases.iter()
    }

    /// Returns the change units planned for one database, if any.
    pub fn change_units(&self, database: &str) -> Option<&[ChangeUnitRef]> {
        self.databases.get(database).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, content: &Value) -> PathBuf {
        let path = dir.path().join("manifest.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn load_sorts_change_units_by_id() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            &json!({
                "db1": [
                    {"changeUnitId": "002", "fileName": "b.json"},
                    {"changeUnitId": "001", "fileName": "a.json"},
                    {"changeUnitId": "010", "fileName": "c.json"},
                ]
            }),
        );
        let manifest = Manifest::load(&path).unwrap();
        let ids: Vec<&str> = manifest
            .change_units("db1")
            .unwrap()
            .iter()
            .map(|r| r.change_unit_id.as_str())
            .collect();
        assert_eq!(ids, vec!["001", "002", "010"]);
    }

    #[test]
    fn load_resolves_relative_paths_against_manifest_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            &json!({"db1": [{"changeUnitId": "001", "fileName": "units/a.json"}]}),
        );
        let manifest = Manifest::load(&path).unwrap();
        let change_unit = &manifest.change_units("db1").unwrap()[0];
        assert_eq!(change_unit.source_path, dir.path().join("units/a.json"));
    }

    #[test]
    fn duplicate_change_unit_id_is_manifest_error() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            &json!({
                "db1": [
                    {"changeUnitId": "001", "fileName": "a.json"},
                    {"changeUnitId": "001", "fileName": "b.json"},
                ]
            }),
        );
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ManifestError);
        assert!(err.message().contains("duplicate"));
    }

    #[test]
    fn non_object_root_is_manifest_error() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, &json!([1, 2, 3]));
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ManifestError);
    }

    #[test]
    fn non_array_section_is_manifest_error() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, &json!({"db1": {"changeUnitId": "001"}}));
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ManifestError);
    }

    #[test]
    fn entry_missing_file_name_is_manifest_error() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, &json!({"db1": [{"changeUnitId": "001"}]}));
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ManifestError);
        assert!(err.message().contains("fileName"));
    }

    #[test]
    fn missing_manifest_file_is_manifest_error() {
        let err = Manifest::load(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ManifestError);
        assert!(err.cause().is_some());
    }

    #[test]
    fn databases_iterate_in_name_order() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            &json!({
                "zeta": [{"changeUnitId": "001", "fileName": "a.json"}],
                "alpha": [{"changeUnitId": "001", "fileName": "a.json"}],
            }),
        );
        let manifest = Manifest::load(&path).unwrap();
        let names: Vec<&String> = manifest.databases().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
