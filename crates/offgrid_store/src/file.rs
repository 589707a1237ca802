//! File-backed store for persistent graphs.
//!
//! Directory layout, one directory per logical database name:
//!
//! ```text
//! <root>/<name>/
//! ├─ LOCK          # Advisory lock for single-process access
//! ├─ Task.tbl      # One CBOR file per table (schema + rows)
//! └─ __transactions.tbl
//! ```

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::schema::TableSchema;
use crate::table::Table;
use crate::value::{Row, Value};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TABLE_EXT: &str = "tbl";

/// On-disk form of one table file.
#[derive(Serialize, Deserialize)]
struct TableFile {
    schema: TableSchema,
    rows: Vec<Row>,
}

/// A persistent table store.
///
/// Every mutating call rewrites the affected table file atomically
/// (temp file, fsync, rename), so a crash between calls never leaves a
/// half-applied operation. Reopening the same directory recovers all
/// tables with their rows in the original insertion order.
///
/// An exclusive advisory lock on the directory prevents two processes
/// from opening the same database.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    tables: RwLock<HashMap<String, Table>>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates the database directory `<root>/<name>` and
    /// loads every existing table file.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process holds the directory lock,
    /// `Corrupted` if a table file cannot be decoded, or an I/O error.
    pub fn open(root: &Path, name: &str) -> StoreResult<Self> {
        let dir = root.join(name);
        fs::create_dir_all(&dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let mut tables = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXT) {
                continue;
            }
            let bytes = fs::read(&path)?;
            let file: TableFile = ciborium::from_reader(bytes.as_slice()).map_err(|e| {
                StoreError::corrupted(format!("table file {}: {e}", path.display()))
            })?;
            let name = file.schema.name.clone();
            tables.insert(name, Table::from_rows(file.schema, file.rows)?);
        }
        tracing::debug!(dir = %dir.display(), tables = tables.len(), "opened file store");

        Ok(Self {
            dir,
            tables: RwLock::new(tables),
            _lock_file: lock_file,
        })
    }

    /// Returns the database directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.{TABLE_EXT}"))
    }

    /// Atomically rewrites one table file: write to a temp file, fsync
    /// it, rename over the old file.
    fn persist(&self, table: &Table) -> StoreResult<()> {
        let file = TableFile {
            schema: table.schema().clone(),
            rows: table.rows().to_vec(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&file, &mut bytes).map_err(StoreError::codec)?;

        let path = self.table_path(&file.schema.name);
        let tmp = path.with_extension("tmp");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Table) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        f(t)
    }

    /// Applies a mutation with per-call atomicity: the change is staged
    /// on a copy, persisted, and only then committed to memory. A
    /// failed write leaves both memory and disk unchanged.
    fn mutate(&self, table: &str, f: impl FnOnce(&mut Table) -> StoreResult<()>) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        let mut staged = t.clone();
        f(&mut staged)?;
        self.persist(&staged)?;
        *t = staged;
        Ok(())
    }
}

impl StoreBackend for FileStore {
    fn setup(&self, schemas: &[TableSchema]) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for schema in schemas {
            if tables.contains_key(&schema.name) {
                continue;
            }
            tracing::debug!(table = %schema.name, "creating table file");
            let table = Table::new(schema.clone());
            self.persist(&table)?;
            tables.insert(schema.name.clone(), table);
        }
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> StoreResult<Option<Row>> {
        self.with_table(table, |t| Ok(t.get(key)))
    }

    fn get_by_index(&self, table: &str, field: &str, value: &Value) -> StoreResult<Vec<Row>> {
        self.with_table(table, |t| t.get_by_index(field, value))
    }

    fn get_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.with_table(table, |t| Ok(t.get_all()))
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.mutate(table, |t| t.insert(row))
    }

    fn upsert(&self, table: &str, row: Row) -> StoreResult<()> {
        self.mutate(table, |t| t.upsert(row))
    }

    fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.mutate(table, |t| {
            t.delete(key);
            Ok(())
        })
    }

    fn clear(&self, table: &str) -> StoreResult<()> {
        self.mutate(table, |t| {
            t.clear();
            Ok(())
        })
    }
}
