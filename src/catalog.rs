use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{DbError, DbResult};
use crate::file::HeapFile;
use crate::tuple::TupleDesc;

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
}

/// Table registry: maps a table name and on-disk file to a stable integer
/// table id. Ids are derived from the file's canonicalized path so that
/// reopening the same file (across catalog instances, or after a restart)
/// yields the same id.
pub struct Catalog {
    next_id: AtomicI32,
    path_to_id: RwLock<HashMap<PathBuf, i32>>,
    tables: RwLock<HashMap<i32, TableEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            next_id: AtomicI32::new(1),
            path_to_id: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Derive (and memoize) the table id for `path`, without requiring the
    /// file to already be registered.
    fn id_for_path(&self, path: &Path) -> DbResult<i32> {
        let canonical = path
            .canonicalize()
            .map_err(|e| DbError::IoFailure(format!("{}: {}", path.display(), e)))?;

        if let Some(&id) = self.path_to_id.read().unwrap().get(&canonical) {
            return Ok(id);
        }
        let mut map = self.path_to_id.write().unwrap();
        if let Some(&id) = map.get(&canonical) {
            return Ok(id);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        map.insert(canonical, id);
        Ok(id)
    }

    /// Open (or create) a heap file at `path` and register it under `name`.
    pub fn add_table(
        &self,
        path: impl AsRef<Path>,
        name: impl Into<String>,
        desc: Arc<TupleDesc>,
    ) -> DbResult<Arc<HeapFile>> {
        let path = path.as_ref();
        // HeapFile::new creates the file if absent, so canonicalize after.
        let _ = std::fs::OpenOptions::new().create(true).write(true).open(path)?;
        let table_id = self.id_for_path(path)?;
        let file = Arc::new(HeapFile::new(path, table_id, desc)?);
        self.tables.write().unwrap().insert(
            table_id,
            TableEntry {
                file: file.clone(),
                name: name.into(),
            },
        );
        Ok(file)
    }

    pub fn table(&self, table_id: i32) -> Option<Arc<HeapFile>> {
        self.tables.read().unwrap().get(&table_id).map(|e| e.file.clone())
    }

    pub fn table_name(&self, table_id: i32) -> Option<String> {
        self.tables.read().unwrap().get(&table_id).map(|e| e.name.clone())
    }

    /// The tuple descriptor registered for `table_id`, without going through
    /// `table(id)` and its `HeapFile`.
    pub fn tuple_desc(&self, table_id: i32) -> Option<Arc<TupleDesc>> {
        self.tables.read().unwrap().get(&table_id).map(|e| e.file.desc().clone())
    }

    pub fn table_id_by_name(&self, name: &str) -> Option<i32> {
        self.tables
            .read()
            .unwrap()
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(&id, _)| id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}
