use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The normalized request path identifying one cacheable object.
///
/// A key is always a relative path made of plain components, so every
/// location derived from it stays strictly inside the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    relative: String,
}

impl CacheKey {
    /// Normalizes a raw request path into a key.
    ///
    /// Leading slashes and `.` segments are dropped. Returns `None` for
    /// paths that are empty after normalization or contain
    /// parent-directory segments.
    pub fn from_request_path(path: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::RootDir | Component::CurDir => (),
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }

        if parts.is_empty() {
            return None;
        }

        Some(Self {
            relative: parts.join("/"),
        })
    }

    /// The key as a relative path below the storage root.
    pub fn relative_path(&self) -> &Path {
        Path::new(&self.relative)
    }

    /// The key as the relative URL path on the upstream mirror.
    pub fn as_str(&self) -> &str {
        &self.relative
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative)
    }
}

/// Maps cache keys to their on-disk locations.
///
/// Purely computational; directories are created lazily by the committer.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of the published object.
    pub fn object_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Location of the digest sidecar next to the object.
    pub fn sidecar_path(&self, key: &CacheKey) -> PathBuf {
        append_suffix(self.object_path(key), ".sha256")
    }

    /// Prefix shared by all temp artifacts for this key.
    ///
    /// The committer appends a per-attempt unique suffix; the validator
    /// treats any file matching this prefix as an in-flight or dead fill.
    pub fn temp_prefix(&self, key: &CacheKey) -> PathBuf {
        append_suffix(self.object_path(key), ".tmp.")
    }
}

fn append_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut path = path.into_os_string();
    path.push(suffix);
    path.into()
}
