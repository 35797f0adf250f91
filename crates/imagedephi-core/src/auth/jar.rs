//! Persistent cookie storage for the session token and cached identity.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use super::codec::{read_cookie_token, write_cookie};

/// Cookie file name in the data directory
const COOKIE_FILE: &str = "cookies.txt";

/// A store of `name=value` cookies that survives process restarts.
///
/// Values passed to `set` are raw; implementations URL-encode them on write.
pub trait CookieJar: Send + Sync {
    /// The full cookie string, in `a=1; b=2` form.
    fn cookie_header(&self) -> Result<String>;

    fn set(&self, name: &str, value: &str) -> Result<()>;

    fn remove(&self, name: &str) -> Result<()>;

    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(read_cookie_token(&self.cookie_header()?, name))
    }
}

fn upsert(pairs: &mut Vec<String>, name: &str, value: &str) {
    let prefix = format!("{}=", name);
    pairs.retain(|p| !p.starts_with(&prefix));
    pairs.push(write_cookie(name, value));
}

fn split_pairs(header: &str) -> Vec<String> {
    header
        .split(';')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cookie jar backed by a single-line file, one header string.
pub struct FileCookieJar {
    data_dir: PathBuf,
}

impl FileCookieJar {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn cookie_path(&self) -> PathBuf {
        self.data_dir.join(COOKIE_FILE)
    }

    fn save(&self, pairs: &[String]) -> Result<()> {
        let path = self.cookie_path();
        if pairs.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove cookie file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, pairs.join("; ")).context("Failed to write cookie file")?;
        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn cookie_header(&self) -> Result<String> {
        let path = self.cookie_path();
        if !path.exists() {
            return Ok(String::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read cookie file")?;
        Ok(contents.trim().to_string())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut pairs = split_pairs(&self.cookie_header()?);
        upsert(&mut pairs, name, value);
        self.save(&pairs)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let prefix = format!("{}=", name);
        let mut pairs = split_pairs(&self.cookie_header()?);
        pairs.retain(|p| !p.starts_with(&prefix));
        self.save(&pairs)
    }
}

/// In-memory cookie jar. Counts writes so callers can tell whether anything
/// was persisted.
#[derive(Default)]
pub struct MemoryCookieJar {
    pairs: Mutex<Vec<String>>,
    writes: Mutex<usize>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the jar from a raw cookie string, e.g. `girderToken=abc123`.
    pub fn from_header(header: &str) -> Self {
        Self {
            pairs: Mutex::new(split_pairs(header)),
            writes: Mutex::new(0),
        }
    }

    /// Number of `set`/`remove` calls made so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_header(&self) -> Result<String> {
        let pairs = self.pairs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(pairs.join("; "))
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut pairs = self.pairs.lock().unwrap_or_else(|e| e.into_inner());
        upsert(&mut pairs, name, value);
        drop(pairs);
        self.bump();
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let prefix = format!("{}=", name);
        let mut pairs = self.pairs.lock().unwrap_or_else(|e| e.into_inner());
        pairs.retain(|p| !p.starts_with(&prefix));
        drop(pairs);
        self.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_jar_set_get_remove() {
        let jar = MemoryCookieJar::new();
        assert_eq!(jar.get("girderToken").unwrap(), None);

        jar.set("girderToken", "abc 123").unwrap();
        jar.set("other", "x").unwrap();
        assert_eq!(jar.get("girderToken").unwrap().as_deref(), Some("abc 123"));
        assert_eq!(jar.cookie_header().unwrap(), "girderToken=abc%20123; other=x");

        jar.set("girderToken", "replaced").unwrap();
        assert_eq!(jar.get("girderToken").unwrap().as_deref(), Some("replaced"));

        jar.remove("girderToken").unwrap();
        assert_eq!(jar.get("girderToken").unwrap(), None);
        assert_eq!(jar.get("other").unwrap().as_deref(), Some("x"));
        assert_eq!(jar.write_count(), 4);
    }

    #[test]
    fn test_memory_jar_from_header() {
        let jar = MemoryCookieJar::from_header("girderToken=abc123; theme=dark");
        assert_eq!(jar.get("girderToken").unwrap().as_deref(), Some("abc123"));
        assert_eq!(jar.write_count(), 0);
    }

    #[test]
    fn test_file_jar_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let jar = FileCookieJar::new(dir.path().to_path_buf());
        assert_eq!(jar.cookie_header().unwrap(), "");
        jar.set("girderToken", "tok;en").unwrap();

        let reopened = FileCookieJar::new(dir.path().to_path_buf());
        assert_eq!(reopened.get("girderToken").unwrap().as_deref(), Some("tok;en"));

        reopened.remove("girderToken").unwrap();
        assert!(!dir.path().join(COOKIE_FILE).exists());
        assert_eq!(jar.get("girderToken").unwrap(), None);
    }

    #[test]
    fn test_file_jar_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let jar = FileCookieJar::new(nested.clone());
        jar.set("girderToken", "abc").unwrap();
        assert!(nested.join(COOKIE_FILE).exists());
    }
}
