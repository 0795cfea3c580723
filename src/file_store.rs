use crate::errors::{AppError, AppResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Flat key/value file access relative to one sandbox directory.
///
/// Every entity is persisted as a single file whose name is its ID, so
/// the trait deals in bare file names rather than paths.
pub trait Storage: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// Writes `content` to `name`. Fails when the file already exists and
    /// `overwrite` is false.
    fn create(&self, name: &str, content: &str, overwrite: bool) -> AppResult<()>;

    fn read(&self, name: &str) -> AppResult<String>;

    /// Best-effort removal. Returns false when the file is missing or could
    /// not be removed.
    fn delete(&self, name: &str) -> bool;

    /// Names of every `.json` file in the root, sorted.
    fn list(&self) -> AppResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|error| AppError::WriteFailed(format!("cannot create {}: {}", root.display(), error)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> AppResult<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }
}

impl Storage for FileStore {
    fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => path.is_file(),
            Err(_) => false,
        }
    }

    /// The content goes to a temp file first. With `overwrite` it is renamed
    /// over the target; without, it is hard-linked, which fails atomically
    /// when another writer claimed the name in the meantime.
    fn create(&self, name: &str, content: &str, overwrite: bool) -> AppResult<()> {
        let path = self.path_for(name)?;
        if !overwrite && path.exists() {
            return Err(already_exists(name));
        }

        let temp_path = self.root.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            if overwrite {
                fs::rename(&temp_path, &path)
            } else {
                fs::hard_link(&temp_path, &path)
            }
        })();
        if !overwrite || written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }

        match written {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => Err(already_exists(name)),
            Err(error) => {
                tracing::warn!(file = %name, error = %error, "failed writing file");
                Err(AppError::WriteFailed(format!("cannot write '{}': {}", name, error)))
            }
        }
    }

    fn read(&self, name: &str) -> AppResult<String> {
        let path = self.path_for(name)?;
        fs::read_to_string(&path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound(format!("file '{}' does not exist", name)),
            std::io::ErrorKind::InvalidData => {
                AppError::Corrupted(format!("file '{}' is not valid UTF-8", name))
            }
            _ => AppError::NotFound(format!("file '{}' is unreadable: {}", name, error)),
        })
    }

    fn delete(&self, name: &str) -> bool {
        let path = match self.path_for(name) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!(file = %name, error = %error, "refusing to delete invalid file name");
                return false;
            }
        };
        if !path.is_file() {
            tracing::debug!(file = %name, "nothing to delete");
            return false;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(file = %name, "deleted file");
                true
            }
            Err(error) => {
                tracing::warn!(file = %name, error = %error, "failed deleting file");
                false
            }
        }
    }

    fn list(&self) -> AppResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            if entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

fn already_exists(name: &str) -> AppError {
    AppError::WriteFailed(format!("file '{}' already exists", name))
}

fn validate_file_name(name: &str) -> AppResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name {
        return Err(AppError::InputInvalid(format!("bad file name '{}'", name)));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(AppError::InputInvalid(format!("file name '{}' escapes the store", name)));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().expect("temp store root");
        let store = FileStore::new(dir.path()).expect("store");
        (dir, store)
    }

    #[test]
    fn create_read_delete_roundtrip() {
        let (_dir, store) = temp_store();
        assert!(!store.exists("a.json"));
        store.create("a.json", "[]", false).expect("create");
        assert!(store.exists("a.json"));
        assert_eq!(store.read("a.json").expect("read"), "[]");
        assert!(store.delete("a.json"));
        assert!(!store.exists("a.json"));
    }

    #[test]
    fn create_without_overwrite_refuses_existing_file() {
        let (_dir, store) = temp_store();
        store.create("a.json", "1", false).expect("create");
        let error = store.create("a.json", "2", false).expect_err("must refuse");
        assert!(error.to_string().starts_with("WRITE_FAILED"));
        store.create("a.json", "2", true).expect("overwrite");
        assert_eq!(store.read("a.json").expect("read"), "2");
    }

    #[test]
    fn racing_creates_of_one_name_have_one_winner() {
        let (dir, store) = temp_store();
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|writer| {
                    let store = &store;
                    scope.spawn(move || store.create("race.json", &writer.to_string(), false).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("writer thread"))
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);

        let content = store.read("race.json").expect("read");
        assert!(content.parse::<u8>().expect("one writer's content") < 8);
        let leftovers = fs::read_dir(dir.path()).expect("dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_files_are_not_found_and_not_deletable() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.read("nope.json"), Err(AppError::NotFound(_))));
        assert!(!store.delete("nope.json"));
    }

    #[test]
    fn rejects_names_outside_the_root() {
        let (_dir, store) = temp_store();
        for name in ["", "../x.json", "a/b.json", "..", " a.json"] {
            assert!(matches!(store.create(name, "{}", true), Err(AppError::InputInvalid(_))), "{name}");
            assert!(!store.exists(name));
        }
    }

    #[test]
    fn list_skips_temp_and_foreign_files() {
        let (dir, store) = temp_store();
        store.create("b.json", "{}", false).expect("create");
        store.create("a.json", "{}", false).expect("create");
        fs::write(dir.path().join(".a.json.123.tmp"), "x").expect("temp file");
        fs::write(dir.path().join("notes.txt"), "x").expect("foreign file");
        assert_eq!(store.list().expect("list"), vec!["a.json", "b.json"]);
    }
}
