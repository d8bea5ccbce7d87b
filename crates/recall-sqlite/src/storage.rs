use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use recall_core::{
    make_key, unique_name, Array, CacheKey, Entry, InternalData, KeyFn, Kwargs, ObjectRegistry,
    RecallError, Storage, StoredEntry,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::Value;

const TABLE: &str = "recall_datasets";
const COLUMNS: &str = "name, key, data, shape, args, kwargs, internal_data";

/// Page size of newly created files. Rows keep their local part on a shared
/// leaf and spill the rest into overflow pages of their own, so dropping a
/// row on repack always frees at least one page.
const PAGE_SIZE: u32 = 512;

/// `seq` keeps insertion order, which the clustered `WITHOUT ROWID` layout
/// does not.
fn create_table_sql(schema: &str) -> String {
    format!(
        "PRAGMA {schema}.page_size = {PAGE_SIZE};
        CREATE TABLE IF NOT EXISTS {schema}.{TABLE} (
            name          TEXT    PRIMARY KEY,
            seq           INTEGER NOT NULL,
            key           TEXT    NOT NULL,
            data          BLOB    NOT NULL,
            shape         TEXT    NOT NULL,
            args          TEXT    NOT NULL,
            kwargs        TEXT    NOT NULL,
            internal_data TEXT    NOT NULL,
            deleted       INTEGER NOT NULL DEFAULT 0
        ) WITHOUT ROWID"
    )
}

/// Configuration for [`SqliteStorage`].
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Reject every mutating operation.
    pub readonly: bool,
    /// Start from an empty file, discarding existing content.
    pub truncate: bool,
    /// Delete the file when the storage is dropped.
    pub temporary: bool,
}

impl SqliteStorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            readonly: false,
            truncate: false,
            temporary: false,
        }
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
}

/// A raw row before JSON decoding.
struct RawRow {
    name: String,
    key: String,
    data: Vec<u8>,
    shape: String,
    args: String,
    kwargs: String,
    internal_data: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            key: row.get(1)?,
            data: row.get(2)?,
            shape: row.get(3)?,
            args: row.get(4)?,
            kwargs: row.get(5)?,
            internal_data: row.get(6)?,
        })
    }

    fn decode(self) -> Result<StoredEntry, RecallError> {
        let name = self.name;
        let bad = |what: &str, e: serde_json::Error| {
            RecallError::Deserialization(format!("record `{name}`: malformed {what}: {e}"))
        };
        let shape: Vec<usize> = serde_json::from_str(&self.shape).map_err(|e| bad("shape", e))?;
        let args: Vec<Value> = serde_json::from_str(&self.args).map_err(|e| bad("args", e))?;
        let kwargs: Kwargs = serde_json::from_str(&self.kwargs).map_err(|e| bad("kwargs", e))?;
        let internal_data: InternalData =
            serde_json::from_str(&self.internal_data).map_err(|e| bad("internal data", e))?;
        let data = Array::from_le_bytes(shape, &self.data)?;
        Ok(StoredEntry {
            entry: Entry {
                key: CacheKey::new(self.key),
                data,
                args,
                kwargs,
                internal_data,
            },
            name,
        })
    }
}

/// Storage backed by a SQLite database file.
///
/// A connection is opened per operation, so the file can be removed or
/// swapped between calls. The key index lives in memory and is rebuilt from
/// the live rows by [`SqliteStorage::update_index`].
///
/// # Example
///
/// ```rust,no_run
/// use recall_sqlite::{SqliteStorage, SqliteStorageConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = SqliteStorage::open("/var/lib/myapp/results.db")?;
///
/// let archive = SqliteStorage::new(
///     SqliteStorageConfig::new("/var/lib/myapp/archive.db").readonly(true),
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteStorage {
    config: SqliteStorageConfig,
    index: RwLock<HashMap<CacheKey, Vec<String>>>,
    registry: Arc<ObjectRegistry>,
    key_fn: KeyFn,
}

impl SqliteStorage {
    /// Open (or create) the database file described by `config` and build
    /// the key index from its live rows.
    pub fn new(config: SqliteStorageConfig) -> Result<Self, RecallError> {
        if config.readonly && config.truncate {
            return Err(RecallError::ReadOnly(format!(
                "cannot truncate read-only storage {}",
                config.path.display()
            )));
        }
        if config.readonly && !config.path.exists() {
            return Err(RecallError::Storage(format!(
                "read-only storage {} does not exist",
                config.path.display()
            )));
        }
        if config.truncate && config.path.exists() {
            fs::remove_file(&config.path)
                .map_err(|e| RecallError::Storage(format!("truncate {}: {e}", config.path.display())))?;
        }

        let storage = Self {
            config,
            index: RwLock::new(HashMap::new()),
            registry: Arc::new(ObjectRegistry::new()),
            key_fn: make_key,
        };
        if !storage.config.readonly {
            storage.connect()?;
        }
        storage.update_index()?;
        Ok(storage)
    }

    /// Open a read-write storage at `path`, keeping existing content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RecallError> {
        Self::new(SqliteStorageConfig::new(path))
    }

    /// Share an existing object registry.
    pub fn with_registry(mut self, registry: Arc<ObjectRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the key derivation function.
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn registry_handle(&self) -> Arc<ObjectRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &SqliteStorageConfig {
        &self.config
    }

    /// Open a connection; read-write connections create the file and table
    /// if needed.
    fn connect(&self) -> Result<Connection, RecallError> {
        let path = &self.config.path;
        if self.config.readonly {
            return Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(|e| RecallError::Storage(format!("SQLite open {}: {e}", path.display())));
        }
        let conn = Connection::open(path)
            .map_err(|e| RecallError::Storage(format!("SQLite open {}: {e}", path.display())))?;
        conn.execute_batch(&create_table_sql("main"))
            .map_err(|e| RecallError::Storage(format!("SQLite create table: {e}")))?;
        Ok(conn)
    }

    /// A connection for reading, or `None` if the file is gone.
    fn connect_existing(&self) -> Result<Option<Connection>, RecallError> {
        if !self.config.path.exists() {
            return Ok(None);
        }
        self.connect().map(Some)
    }

    fn load(&self, conn: &Connection, name: &str) -> Result<Option<StoredEntry>, RecallError> {
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {TABLE} WHERE name = ?1 AND deleted = 0"),
                params![name],
                RawRow::from_row,
            )
            .optional()
            .map_err(|e| RecallError::Storage(format!("SQLite SELECT: {e}")))?;
        raw.map(RawRow::decode).transpose()
    }

    /// Rebuild the key index by scanning all live rows of the file.
    pub fn update_index(&self) -> Result<(), RecallError> {
        tracing::debug!(path = %self.config.path.display(), "reading index from storage file");
        let mut index: HashMap<CacheKey, Vec<String>> = HashMap::new();
        if let Some(conn) = self.connect_existing()? {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT name, key FROM {TABLE} WHERE deleted = 0 ORDER BY seq"
                ))
                .map_err(|e| RecallError::Storage(format!("SQLite prepare: {e}")))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|e| RecallError::Storage(format!("SQLite query: {e}")))?;
            for row in rows {
                let (name, key) = row.map_err(|e| RecallError::Storage(format!("SQLite row: {e}")))?;
                index.entry(CacheKey::new(key)).or_default().push(name);
            }
        }
        let count: usize = index.values().map(Vec::len).sum();
        *self.index.write() = index;
        tracing::debug!(count, "rebuilt storage index");
        Ok(())
    }

    /// Rewrite the file without its tombstoned rows.
    ///
    /// Live rows are copied into a sibling file which then replaces the
    /// original.
    pub fn repack(&self) -> Result<(), RecallError> {
        self.check_writable("repack")?;
        let path = &self.config.path;
        if !path.exists() {
            return Ok(());
        }
        let mut packed = path.as_os_str().to_owned();
        packed.push(".repack");
        let packed = PathBuf::from(packed);
        if packed.exists() {
            fs::remove_file(&packed)
                .map_err(|e| RecallError::Storage(format!("remove {}: {e}", packed.display())))?;
        }

        let before = file_size(path);
        {
            let conn = self.connect()?;
            conn.execute(
                "ATTACH DATABASE ?1 AS packed",
                params![packed.to_string_lossy().into_owned()],
            )
            .map_err(|e| RecallError::Storage(format!("SQLite ATTACH: {e}")))?;
            conn.execute_batch(&create_table_sql("packed"))
                .map_err(|e| RecallError::Storage(format!("SQLite create table: {e}")))?;
            let copied = conn
                .execute(
                    &format!(
                        "INSERT INTO packed.{TABLE} ({COLUMNS}, seq, deleted) \
                         SELECT {COLUMNS}, seq, 0 FROM main.{TABLE} WHERE deleted = 0 ORDER BY seq"
                    ),
                    [],
                )
                .map_err(|e| RecallError::Storage(format!("SQLite copy rows: {e}")))?;
            conn.execute("DETACH DATABASE packed", [])
                .map_err(|e| RecallError::Storage(format!("SQLite DETACH: {e}")))?;
            tracing::debug!(copied, "copied live rows for repack");
        }
        fs::rename(&packed, path)
            .map_err(|e| RecallError::Storage(format!("replace {}: {e}", path.display())))?;
        tracing::debug!(before, after = file_size(path), "repacked storage file");
        self.update_index()
    }

    /// Remove the database file and empty the index. A later write creates a
    /// fresh file.
    pub fn delete_file(&self) -> Result<(), RecallError> {
        self.check_writable("delete the file of")?;
        let path = &self.config.path;
        if path.exists() {
            fs::remove_file(path)
                .map_err(|e| RecallError::Storage(format!("remove {}: {e}", path.display())))?;
        }
        self.index.write().clear();
        tracing::debug!(path = %path.display(), "deleted storage file");
        Ok(())
    }

    /// Close the storage and remove its file.
    pub fn close_and_delete(self) -> Result<(), RecallError> {
        self.delete_file()
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

impl Storage for SqliteStorage {
    fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    fn len(&self) -> usize {
        self.index.read().values().map(Vec::len).sum()
    }

    fn is_readonly(&self) -> bool {
        self.config.readonly
    }

    fn key_for(&self, args: &[Value], kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
        (self.key_fn)(args, kwargs)
    }

    fn records(&self, key: &CacheKey) -> Result<Vec<StoredEntry>, RecallError> {
        let names = match self.index.read().get(key) {
            Some(names) => names.clone(),
            None => return Ok(Vec::new()),
        };
        let Some(conn) = self.connect_existing()? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(stored) = self.load(&conn, name)? {
                records.push(stored);
            }
        }
        Ok(records)
    }

    fn entries(&self) -> Result<Vec<StoredEntry>, RecallError> {
        let Some(conn) = self.connect_existing()? else {
            return Ok(Vec::new());
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM {TABLE} WHERE deleted = 0 ORDER BY seq"
            ))
            .map_err(|e| RecallError::Storage(format!("SQLite prepare: {e}")))?;
        let rows = stmt
            .query_map([], RawRow::from_row)
            .map_err(|e| RecallError::Storage(format!("SQLite query: {e}")))?;
        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| RecallError::Storage(format!("SQLite row: {e}")))?;
            entries.push(raw.decode()?);
        }
        Ok(entries)
    }

    fn insert(&self, entry: Entry) -> Result<String, RecallError> {
        self.check_writable("store")?;
        let conn = self.connect()?;
        let name = unique_name(&entry.key, |candidate| {
            conn.query_row(
                &format!("SELECT 1 FROM {TABLE} WHERE name = ?1 AND deleted = 0"),
                params![candidate],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(|e| RecallError::Storage(format!("SQLite SELECT: {e}")))
        })?;

        let encode_err =
            |e: serde_json::Error| RecallError::Storage(format!("encode record `{name}`: {e}"));
        let shape = serde_json::to_string(entry.data.shape()).map_err(encode_err)?;
        let args = serde_json::to_string(&entry.args).map_err(encode_err)?;
        let kwargs = serde_json::to_string(&entry.kwargs).map_err(encode_err)?;
        let internal_data = serde_json::to_string(&entry.internal_data).map_err(encode_err)?;

        // A tombstoned row with the same name is overwritten.
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {TABLE} ({COLUMNS}, seq, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
                         (SELECT COALESCE(MAX(seq), 0) + 1 FROM {TABLE}), 0)"
            ),
            params![
                name,
                entry.key.as_str(),
                entry.data.to_le_bytes(),
                shape,
                args,
                kwargs,
                internal_data
            ],
        )
        .map_err(|e| RecallError::Storage(format!("SQLite INSERT: {e}")))?;

        self.index
            .write()
            .entry(entry.key)
            .or_default()
            .push(name.clone());
        tracing::debug!(name = %name, "stored record to storage file");
        Ok(name)
    }

    fn remove(&self, name: &str) -> Result<(), RecallError> {
        self.check_writable("delete")?;
        let changed = match self.connect_existing()? {
            Some(conn) => conn
                .execute(
                    &format!("UPDATE {TABLE} SET deleted = 1 WHERE name = ?1 AND deleted = 0"),
                    params![name],
                )
                .map_err(|e| RecallError::Storage(format!("SQLite UPDATE: {e}")))?,
            None => 0,
        };
        if changed == 0 {
            return Err(RecallError::NotFound(format!("no record named `{name}`")));
        }
        self.index.write().retain(|_, names| {
            names.retain(|n| n != name);
            !names.is_empty()
        });
        tracing::debug!(name = %name, "tombstoned record in storage file");
        Ok(())
    }
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        if self.config.temporary && !self.config.readonly && self.config.path.exists() {
            if let Err(e) = fs::remove_file(&self.config.path) {
                tracing::warn!(path = %self.config.path.display(), error = %e, "failed to remove temporary storage file");
            }
        }
    }
}
