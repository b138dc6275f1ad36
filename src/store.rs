use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::SPAWN_RADIUS;
use crate::error::StoreError;
use crate::types::{Bit, BitId, Bounds};

const SNAPSHOT_VERSION: u8 = 1;

/// Row store for bits. Every call is a complete operation; callers never hold
/// transactions and failures are returned as-is.
pub trait EntityStore: Send + Sync {
    /// Creates a bit. Missing coordinates are picked at random near the origin.
    fn create(&self, x: Option<i64>, y: Option<i64>) -> Result<Bit, StoreError>;
    fn get(&self, id: &str) -> Result<Bit, StoreError>;
    /// Replaces the position of an existing bit and stamps `updated_at`.
    fn update(&self, id: &str, x: i64, y: i64) -> Result<Bit, StoreError>;
    fn delete(&self, id: &str) -> Result<Bit, StoreError>;
    /// All bits with `left <= x < right` and `top <= y < bottom`.
    fn query_range(&self, bounds: &Bounds) -> Result<BTreeMap<BitId, Bit>, StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreSnapshotFile {
    version: u8,
    bits: HashMap<BitId, Bit>,
}

#[derive(Clone, Debug, Deserialize)]
struct StoreSnapshotFileRaw {
    version: u8,
    bits: HashMap<String, serde_json::Value>,
}

/// In-memory bit store, optionally mirrored to a JSON snapshot file after
/// every write.
pub struct MemoryBitStore {
    file_path: Option<PathBuf>,
    bits: RwLock<HashMap<BitId, Bit>>,
}

impl MemoryBitStore {
    pub fn new() -> Self {
        Self {
            file_path: None,
            bits: RwLock::new(HashMap::new()),
        }
    }

    /// Loads `file_path` if it exists and writes back to it on every change.
    pub fn with_snapshot_file(file_path: PathBuf) -> Self {
        let bits = load_bits(&file_path);
        info!(
            "[store] loaded {} bits from {}",
            bits.len(),
            file_path.display()
        );
        Self {
            file_path: Some(file_path),
            bits: RwLock::new(bits),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.read().map(|bits| bits.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_with<T>(
        &self,
        apply: impl FnOnce(&mut HashMap<BitId, Bit>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut bits = self
            .bits
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        let result = apply(&mut bits)?;
        if let Some(path) = &self.file_path {
            save_bits(path, &bits)?;
        }
        Ok(result)
    }
}

impl Default for MemoryBitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryBitStore {
    fn create(&self, x: Option<i64>, y: Option<i64>) -> Result<Bit, StoreError> {
        let mut rng = rand::rng();
        let x = x.unwrap_or_else(|| rng.random_range(-SPAWN_RADIUS..=SPAWN_RADIUS));
        let y = y.unwrap_or_else(|| rng.random_range(-SPAWN_RADIUS..=SPAWN_RADIUS));
        let now = now_iso();
        let bit = Bit {
            id: Uuid::new_v4().to_string(),
            x,
            y,
            created_at: now.clone(),
            updated_at: now,
        };
        self.write_with(|bits| {
            bits.insert(bit.id.clone(), bit.clone());
            Ok(bit)
        })
    }

    fn get(&self, id: &str) -> Result<Bit, StoreError> {
        let bits = self
            .bits
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        bits.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update(&self, id: &str, x: i64, y: i64) -> Result<Bit, StoreError> {
        self.write_with(|bits| {
            let bit = bits
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            bit.x = x;
            bit.y = y;
            bit.updated_at = now_iso();
            Ok(bit.clone())
        })
    }

    fn delete(&self, id: &str) -> Result<Bit, StoreError> {
        self.write_with(|bits| {
            bits.remove(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn query_range(&self, bounds: &Bounds) -> Result<BTreeMap<BitId, Bit>, StoreError> {
        let bits = self
            .bits
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(bits
            .values()
            .filter(|bit| bounds.contains(bit.x, bit.y))
            .map(|bit| (bit.id.clone(), bit.clone()))
            .collect())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn save_bits(path: &Path, bits: &HashMap<BitId, Bit>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|error| {
                error!(
                    "[store] failed to create parent dir {}: {error}",
                    parent.display()
                );
                StoreError::Unavailable(error.to_string())
            })?;
        }
    }

    let payload = StoreSnapshotFile {
        version: SNAPSHOT_VERSION,
        bits: bits.clone(),
    };
    let text = serde_json::to_string_pretty(&payload)
        .map_err(|error| StoreError::Unavailable(error.to_string()))?;
    fs::write(path, text).map_err(|error| {
        error!("[store] failed to write {}: {error}", path.display());
        StoreError::Unavailable(error.to_string())
    })
}

fn load_bits(path: &Path) -> HashMap<BitId, Bit> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                error!("[store] failed to read {}: {error}", path.display());
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<StoreSnapshotFileRaw>(&text) {
        Ok(value) if value.version == SNAPSHOT_VERSION => value,
        Ok(value) => {
            warn!(
                "[store] unsupported snapshot version {} at {}",
                value.version,
                path.display()
            );
            return HashMap::new();
        }
        Err(error) => {
            error!("[store] failed to parse {}: {error}", path.display());
            return HashMap::new();
        }
    };

    let mut loaded = HashMap::new();
    for (id, raw_value) in parsed.bits {
        match serde_json::from_value::<Bit>(raw_value) {
            Ok(bit) if bit.id == id => {
                loaded.insert(id, bit);
            }
            Ok(bit) => {
                warn!("[store] skipping bit keyed {id} with mismatched id {}", bit.id);
            }
            Err(error) => {
                warn!("[store] skipping malformed bit {id}: {error}");
            }
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_snapshot_path(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("bitgrid-{label}-{nanos}/bits.json"))
    }

    #[test]
    fn create_then_get_returns_same_bit() {
        let store = MemoryBitStore::new();
        let created = store.create(None, None).expect("create should succeed");
        assert!(created.x.abs() <= SPAWN_RADIUS);
        assert!(created.y.abs() <= SPAWN_RADIUS);
        assert_eq!(created.created_at, created.updated_at);

        let loaded = store.get(&created.id).expect("bit should exist");
        assert_eq!(loaded.id, created.id);
        assert_eq!((loaded.x, loaded.y), (created.x, created.y));
    }

    #[test]
    fn create_honours_explicit_coordinates() {
        let store = MemoryBitStore::new();
        let bit = store.create(Some(-400), Some(9_000)).expect("create");
        assert_eq!((bit.x, bit.y), (-400, 9_000));
    }

    #[test]
    fn update_replaces_position() {
        let store = MemoryBitStore::new();
        let bit = store.create(Some(0), Some(0)).expect("create");
        let updated = store.update(&bit.id, 5, -6).expect("update");
        assert_eq!((updated.x, updated.y), (5, -6));
        assert_eq!(updated.created_at, bit.created_at);
        assert_eq!(store.get(&bit.id).expect("get").x, 5);
    }

    #[test]
    fn missing_ids_are_not_found() {
        let store = MemoryBitStore::new();
        assert_eq!(
            store.get("ghost"),
            Err(StoreError::NotFound("ghost".to_string()))
        );
        assert!(matches!(
            store.update("ghost", 1, 1),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete("ghost"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_removes_bit() {
        let store = MemoryBitStore::new();
        let bit = store.create(Some(1), Some(1)).expect("create");
        assert_eq!(store.delete(&bit.id).expect("delete").id, bit.id);
        assert!(store.is_empty());
    }

    #[test]
    fn query_range_is_half_open() {
        let store = MemoryBitStore::new();
        let inside = store.create(Some(0), Some(0)).expect("create");
        let edge = store.create(Some(31), Some(31)).expect("create");
        store.create(Some(32), Some(0)).expect("create");
        store.create(Some(0), Some(32)).expect("create");
        store.create(Some(-1), Some(0)).expect("create");

        let found = store
            .query_range(&Bounds {
                top: 0,
                right: 32,
                bottom: 32,
                left: 0,
            })
            .expect("query");
        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&inside.id));
        assert!(found.contains_key(&edge.id));
    }

    #[test]
    fn snapshot_file_survives_reload() {
        let path = temp_snapshot_path("reload");
        let id = {
            let store = MemoryBitStore::with_snapshot_file(path.clone());
            let bit = store.create(Some(3), Some(4)).expect("create");
            store.update(&bit.id, 7, 8).expect("update");
            bit.id
        };

        let reloaded = MemoryBitStore::with_snapshot_file(path.clone());
        let bit = reloaded.get(&id).expect("bit should reload");
        assert_eq!((bit.x, bit.y), (7, 8));

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let path = temp_snapshot_path("corrupt");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("temp dir");
        }
        fs::write(&path, "{not json").expect("write");

        let store = MemoryBitStore::with_snapshot_file(path.clone());
        assert!(store.is_empty());

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
