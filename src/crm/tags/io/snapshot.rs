use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::crm::tags::error::Result;

pub const LEADS_SNAPSHOT: &str = "leads.json";
pub const SUBSCRIBERS_SNAPSHOT: &str = "subscribers.json";

/// Durable copy of a fetched table, reused by the next run until cleared.
pub trait SnapshotStore<T> {
    fn load(&self) -> Result<Option<T>>;
    fn save(&self, table: &T) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores a table as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonSnapshot<T> {
    path: PathBuf,
    _table: PhantomData<fn() -> T>,
}

impl<T> JsonSnapshot<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _table: PhantomData,
        }
    }

    /// A snapshot named `file_name` inside `dir`.
    pub fn in_dir(dir: &Path, file_name: &str) -> Self {
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> SnapshotStore<T> for JsonSnapshot<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn save(&self, table: &T) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(table)?)?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Returns the stored table if there is one, otherwise fetches and stores it.
pub fn load_or_fetch<T, S, F>(store: &S, fetch: F) -> Result<T>
where
    S: SnapshotStore<T>,
    F: FnOnce() -> Result<T>,
{
    if let Some(table) = store.load()? {
        info!("reusing snapshot from a previous run");
        return Ok(table);
    }
    let table = fetch()?;
    store.save(&table)?;
    Ok(table)
}
