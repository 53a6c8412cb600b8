use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::core::config::StorageBackendKind;
use crate::core::error::Result;


pub const SQLITE_FILE_NAME: &str = "postboard.db";


/// Whole-document storage keyed by name. Writes replace the previous document.
pub trait StateBackend: Send + Sync {

    fn read(&self, key: &str) -> Result<Option<String>>;


    fn write(&self, key: &str, document: &str) -> Result<()>;


    fn backend_name(&self) -> &str;
}


pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(raw))
    }

    fn write(&self, key: &str, document: &str) -> Result<()> {
        let path = self.path_for(key);
        // rename keeps readers from ever seeing a half-written document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, document)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} ({} bytes)", path.display(), document.len());
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "json"
    }
}


pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }


    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT NOT NULL)")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StateBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT v FROM kv WHERE k = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, document: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (k, v) VALUES (?1, ?2)",
            params![key, document],
        )?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}


pub fn open_backend(kind: StorageBackendKind, data_dir: &Path) -> Result<Box<dyn StateBackend>> {
    match kind {
        StorageBackendKind::Json => Ok(Box::new(JsonFileBackend::open(data_dir)?)),
        StorageBackendKind::Sqlite => Ok(Box::new(SqliteBackend::open(
            &data_dir.join(SQLITE_FILE_NAME),
        )?)),
    }
}
