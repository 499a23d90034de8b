//! String key-value stores backing the decryption-signature cache.
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// A minimal string key-value store.
pub trait StringStorage: Send + Sync {
    fn get_item(&self, key: &str) -> io::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove_item(&self, key: &str) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "storage lock poisoned")
    }
}

impl StringStorage for InMemoryStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        let items = self.items.lock().map_err(|_| Self::poisoned())?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        let mut items = self.items.lock().map_err(|_| Self::poisoned())?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> io::Result<()> {
        let mut items = self.items.lock().map_err(|_| Self::poisoned())?;
        items.remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        let name = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{name}.json"))
    }
}

impl StringStorage for FileStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        fs::write(self.path(key), value)
    }

    fn remove_item(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
