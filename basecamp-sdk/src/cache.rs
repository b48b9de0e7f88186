// ABOUTME: Filesystem cache for ETag conditional requests
// ABOUTME: Stores etags.json plus response bodies keyed by hashed request identity

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

const ETAGS_FILE: &str = "etags.json";
const RESPONSES_DIR: &str = "responses";

/// Cache of ETags and response bodies for GET requests.
///
/// Layout under the cache directory: `etags.json` maps cache keys to ETag
/// values, and `responses/<key>.body` holds the matching body. Writes are
/// atomic (temp file plus rename) so a crash never leaves a torn entry, and
/// on Unix everything is private to the owning user.
pub struct ResponseCache {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ResponseCache {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    /// Platform cache directory for this SDK.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("basecamp-sdk"))
    }

    /// Derives the cache key for a request.
    ///
    /// The key binds the URL, account, and a prefix of the token hash, so a
    /// cached body is never served to a different user. The token itself is
    /// hashed before use and never written to disk.
    pub fn key(url: &str, account_id: &str, token: &str) -> String {
        let token_hash = if token.is_empty() {
            String::new()
        } else {
            let digest = format!("{:x}", Sha256::digest(token.as_bytes()));
            digest[..16].to_string()
        };
        let identity = format!("{url}:{account_id}:{token_hash}");
        format!("{:x}", Sha256::digest(identity.as_bytes()))
    }

    /// Looks up the stored ETag for a key.
    pub fn etag(&self, key: &str) -> Option<String> {
        let _guard = self.lock.read();
        self.load_etags().remove(key)
    }

    /// Looks up the stored response body for a key.
    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        let _guard = self.lock.read();
        fs::read(self.body_path(key)).ok()
    }

    /// Stores an ETag and body for a key, replacing any previous entry.
    pub fn store(&self, key: &str, etag: &str, body: &[u8]) -> io::Result<()> {
        let _guard = self.lock.write();
        self.ensure_dirs()?;

        write_atomic(&self.body_path(key), body)?;

        let mut etags = self.load_etags();
        etags.insert(key.to_string(), etag.to_string());
        self.save_etags(&etags)
    }

    /// Removes a single entry.
    pub fn invalidate(&self, key: &str) -> io::Result<()> {
        let _guard = self.lock.write();
        let mut etags = self.load_etags();
        if etags.remove(key).is_some() {
            self.save_etags(&etags)?;
        }
        match fs::remove_file(self.body_path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Removes every cached entry.
    pub fn clear(&self) -> io::Result<()> {
        let _guard = self.lock.write();
        for path in [self.dir.join(ETAGS_FILE), self.dir.join(RESPONSES_DIR)] {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(RESPONSES_DIR).join(format!("{key}.body"))
    }

    fn load_etags(&self) -> HashMap<String, String> {
        fs::read(self.dir.join(ETAGS_FILE))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn save_etags(&self, etags: &HashMap<String, String>) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(etags)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_atomic(&self.dir.join(ETAGS_FILE), &bytes)
    }

    fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [self.dir.clone(), self.dir.join(RESPONSES_DIR)] {
            fs::create_dir_all(&dir)?;
            restrict_dir(&dir)?;
        }
        Ok(())
    }
}

/// Writes via a temp file in the same directory, then renames into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    restrict_file(&tmp)?;
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (TempDir, ResponseCache) {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        (dir, cache)
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let (_dir, cache) = cache();
        let key = ResponseCache::key("https://example.com/todos.json", "123", "token");
        cache.store(&key, "\"abc123\"", b"[{\"id\": 1}]").unwrap();

        assert_eq!(cache.etag(&key).as_deref(), Some("\"abc123\""));
        assert_eq!(cache.body(&key).as_deref(), Some(&b"[{\"id\": 1}]"[..]));
    }

    #[test]
    fn missing_entries_return_none() {
        let (_dir, cache) = cache();
        assert!(cache.etag("nope").is_none());
        assert!(cache.body("nope").is_none());
    }

    #[test]
    fn key_varies_by_url_account_and_token() {
        let base = ResponseCache::key("https://example.com/a", "1", "tok");
        assert_ne!(base, ResponseCache::key("https://example.com/b", "1", "tok"));
        assert_ne!(base, ResponseCache::key("https://example.com/a", "2", "tok"));
        assert_ne!(base, ResponseCache::key("https://example.com/a", "1", "other"));
        assert_eq!(base, ResponseCache::key("https://example.com/a", "1", "tok"));
    }

    #[test]
    fn key_is_hex_and_never_contains_the_token() {
        let key = ResponseCache::key("https://example.com/a", "1", "super-secret");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!key.contains("super-secret"));
    }

    #[test]
    fn store_overwrites_previous_entry() {
        let (_dir, cache) = cache();
        let key = ResponseCache::key("https://example.com/a", "1", "tok");
        cache.store(&key, "\"v1\"", b"first").unwrap();
        cache.store(&key, "\"v2\"", b"second").unwrap();

        assert_eq!(cache.etag(&key).as_deref(), Some("\"v2\""));
        assert_eq!(cache.body(&key).as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn invalidate_removes_single_entry() {
        let (_dir, cache) = cache();
        let keep = ResponseCache::key("https://example.com/keep", "1", "tok");
        let drop = ResponseCache::key("https://example.com/drop", "1", "tok");
        cache.store(&keep, "\"k\"", b"keep").unwrap();
        cache.store(&drop, "\"d\"", b"drop").unwrap();

        cache.invalidate(&drop).unwrap();
        assert!(cache.etag(&drop).is_none());
        assert!(cache.body(&drop).is_none());
        assert!(cache.etag(&keep).is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let (_dir, cache) = cache();
        let key = ResponseCache::key("https://example.com/a", "1", "tok");
        cache.store(&key, "\"v\"", b"body").unwrap();

        cache.clear().unwrap();
        assert!(cache.etag(&key).is_none());
        assert!(cache.body(&key).is_none());
        // Clearing an already-empty cache is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn corrupt_etags_file_is_treated_as_empty() {
        let (dir, cache) = cache();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join(ETAGS_FILE), b"not json").unwrap();

        assert!(cache.etag("any").is_none());
        let key = ResponseCache::key("https://example.com/a", "1", "tok");
        cache.store(&key, "\"v\"", b"body").unwrap();
        assert!(cache.etag(&key).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn cache_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, cache) = cache();
        let key = ResponseCache::key("https://example.com/a", "1", "tok");
        cache.store(&key, "\"v\"", b"body").unwrap();

        let dir_mode = fs::metadata(dir.path().join(RESPONSES_DIR))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = fs::metadata(dir.path().join(ETAGS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
