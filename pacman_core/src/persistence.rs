//! On-disk storage for learned Q-tables, one namespace per map.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::PathBuf,
};

use tracing::{info, warn};

use crate::{PacmanError, Result, q_learning::QTable};

const MODEL_FILE: &str = "q_model.msgpack";

/// Saves and loads Q-tables under a root directory.
///
/// The table for map `level1` lives at `<root>/q_learning_level1/q_model.msgpack`.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, map_id: &str) -> PathBuf {
        self.root
            .join(format!("q_learning_{map_id}"))
            .join(MODEL_FILE)
    }

    /// Writes `table` for `map_id`, replacing any previous model.
    pub fn save(&self, map_id: &str, table: &QTable) -> Result<PathBuf> {
        let path = self.path_for(map_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| PacmanError::Io {
                operation: format!("create model directory {dir:?}"),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| PacmanError::Io {
            operation: format!("create file {path:?}"),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        rmp_serde::encode::write(&mut writer, table).map_err(|e| {
            PacmanError::Serialization {
                operation: "serialize Q-table to MessagePack".to_string(),
                message: e.to_string(),
            }
        })?;
        writer.flush().map_err(|source| PacmanError::Io {
            operation: format!("write file {path:?}"),
            source,
        })?;

        info!(map_id, entries = table.len(), path = %path.display(), "saved Q-table");
        Ok(path)
    }

    /// Reads the table saved for `map_id`.
    ///
    /// Fails with [`PacmanError::ModelNotFound`] when nothing was saved yet.
    pub fn load(&self, map_id: &str) -> Result<QTable> {
        let path = self.path_for(map_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PacmanError::ModelNotFound {
                    map_id: map_id.to_string(),
                    path,
                });
            }
            Err(source) => {
                return Err(PacmanError::Io {
                    operation: format!("open file {path:?}"),
                    source,
                });
            }
        };

        let table: QTable = rmp_serde::decode::from_read(BufReader::new(file)).map_err(|e| {
            PacmanError::Serialization {
                operation: "deserialize Q-table from MessagePack".to_string(),
                message: e.to_string(),
            }
        })?;

        info!(map_id, entries = table.len(), path = %path.display(), "loaded Q-table");
        Ok(table)
    }

    /// Like [`load`](Self::load), but starts from an empty table when no
    /// model exists for `map_id`.
    pub fn load_or_default(&self, map_id: &str) -> Result<QTable> {
        match self.load(map_id) {
            Err(PacmanError::ModelNotFound { path, .. }) => {
                warn!(
                    map_id,
                    path = %path.display(),
                    "no saved model, starting from an empty table"
                );
                Ok(QTable::new())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{Direction, state_repr::StateKey};

    fn sample_table() -> QTable {
        let mut table = QTable::new();
        for (i, action) in Direction::ALL.into_iter().enumerate() {
            let key = StateKey {
                occupancy: vec![1, 2, i as u8, 8],
                pacman_invulnerable: i % 2 == 0,
            };
            table.set(&key, action, i as f64 * 1.5 - 3.0);
        }
        table
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ModelStore::new(temp_dir.path());
        let table = sample_table();

        let path = store.save("level1", &table).expect("Failed to save");
        assert_eq!(path, temp_dir.path().join("q_learning_level1").join(MODEL_FILE));
        assert!(path.is_file());

        let loaded = store.load("level1").expect("Failed to load");
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_maps_are_separate_namespaces() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ModelStore::new(temp_dir.path());
        store.save("level1", &sample_table()).unwrap();

        assert!(!store.path_for("level2").exists());
        let err = store.load("level2").unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, PacmanError::ModelNotFound { ref map_id, .. } if map_id == "level2"));
    }

    #[test]
    fn test_load_or_default_starts_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ModelStore::new(temp_dir.path());
        let table = store.load_or_default("missing").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_corrupt_model_is_not_recoverable() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ModelStore::new(temp_dir.path());
        let path = store.path_for("broken");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xc1u8, 0xff, 0x00]).unwrap();

        let err = store.load_or_default("broken").unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, PacmanError::Serialization { .. }));
    }
}
