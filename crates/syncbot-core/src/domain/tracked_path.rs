//! Tracked path entries
//!
//! A [`TrackedPath`] is a user-designated file or directory. Directory
//! entries imply recursive inclusion; descendants are resolved at sync time
//! and never stored expanded.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Kind of a tracked filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
}

impl PathKind {
    /// Inspects the filesystem to determine the kind of an existing entry
    pub fn detect(path: &Path) -> Result<Self, DomainError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            DomainError::InvalidPath(format!("{}: {}", path.display(), e))
        })?;
        if metadata.is_dir() {
            Ok(PathKind::Directory)
        } else if metadata.is_file() {
            Ok(PathKind::File)
        } else {
            Err(DomainError::InvalidPath(format!(
                "{}: not a regular file or directory",
                path.display()
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::File => "file",
            PathKind::Directory => "directory",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(PathKind::File),
            "directory" | "dir" | "folder" => Ok(PathKind::Directory),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown path kind '{other}'"
            ))),
        }
    }
}

/// A file or directory the user wants mirrored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedPath {
    path: PathBuf,
    kind: PathKind,
}

impl TrackedPath {
    /// Creates an entry from an absolute path, normalizing it lexically
    pub fn new(path: impl AsRef<Path>, kind: PathKind) -> Result<Self, DomainError> {
        Ok(Self {
            path: normalize_path(path.as_ref())?,
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// Final path component, used as the entry's name under the staging tree
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
    }
}

/// Lexically normalizes an absolute path
///
/// Removes `.` components, resolves `..` against preceding components and
/// drops trailing separators, so `/tmp/x/`, `/tmp/./x` and `/tmp/y/../x`
/// all compare equal. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> Result<PathBuf, DomainError> {
    if path.as_os_str().is_empty() {
        return Err(DomainError::InvalidPath("path is empty".to_string()));
    }
    if !path.is_absolute() {
        return Err(DomainError::InvalidPath(format!(
            "{}: path must be absolute",
            path.display()
        )));
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_variants_compare_equal() {
        let expected = PathBuf::from("/tmp/x");
        assert_eq!(normalize_path(Path::new("/tmp/x")).unwrap(), expected);
        assert_eq!(normalize_path(Path::new("/tmp/x/")).unwrap(), expected);
        assert_eq!(normalize_path(Path::new("/tmp/./x")).unwrap(), expected);
        assert_eq!(normalize_path(Path::new("/tmp/y/../x")).unwrap(), expected);
        assert_eq!(normalize_path(Path::new("//tmp//x")).unwrap(), expected);
    }

    #[test]
    fn test_normalize_path_rejects_relative_and_empty() {
        assert!(matches!(
            normalize_path(Path::new("relative/x")),
            Err(DomainError::InvalidPath(_))
        ));
        assert!(normalize_path(Path::new("")).is_err());
    }

    #[test]
    fn test_parent_dir_does_not_escape_root() {
        assert_eq!(
            normalize_path(Path::new("/../../etc")).unwrap(),
            PathBuf::from("/etc")
        );
    }

    #[test]
    fn test_detect_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        assert_eq!(PathKind::detect(dir.path()).unwrap(), PathKind::Directory);
        assert_eq!(PathKind::detect(&file).unwrap(), PathKind::File);
        assert!(PathKind::detect(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_path_kind_parse() {
        assert_eq!("file".parse::<PathKind>().unwrap(), PathKind::File);
        assert_eq!("Dir".parse::<PathKind>().unwrap(), PathKind::Directory);
        assert!("socket".parse::<PathKind>().is_err());
    }

    #[test]
    fn test_tracked_path_name() {
        let entry = TrackedPath::new("/home/me/Documents/", PathKind::Directory).unwrap();
        assert_eq!(entry.name(), "Documents");
        assert_eq!(entry.path(), Path::new("/home/me/Documents"));
    }

    #[test]
    fn test_tracked_path_serializes_kind_snake_case() {
        let entry = TrackedPath::new("/tmp/x", PathKind::Directory).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "directory");
        assert_eq!(json["path"], "/tmp/x");
    }
}
