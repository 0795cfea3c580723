use crate::errors::AppResult;
use crate::file_store::Storage;

/// An entity persisted as one whole file named after its ID.
pub trait Persist: Clone {
    fn file_name(&self) -> &str;

    fn encode(&self) -> AppResult<String>;

    fn save(&self, storage: &dyn Storage) -> AppResult<()> {
        let content = self.encode()?;
        storage.create(self.file_name(), &content, true)
    }
}

/// Applies `mutate` in memory, then writes the whole entity.
///
/// The entity is snapshotted first; if either the mutation or the write
/// fails the snapshot is put back, so callers observe either the complete
/// change on disk and in memory or no change at all.
pub fn apply_and_persist<T, R, F>(entity: &mut T, storage: &dyn Storage, mutate: F) -> AppResult<R>
where
    T: Persist,
    F: FnOnce(&mut T) -> AppResult<R>,
{
    let snapshot = entity.clone();
    let outcome = match mutate(entity) {
        Ok(outcome) => outcome,
        Err(error) => {
            *entity = snapshot;
            return Err(error);
        }
    };

    if let Err(error) = entity.save(storage) {
        *entity = snapshot;
        tracing::warn!(file = %entity.file_name(), error = %error, "write failed, mutation rolled back");
        return Err(error);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::file_store::test_support::FlakyStore;

    #[derive(Debug, Clone, PartialEq)]
    struct Tally {
        id: String,
        values: Vec<i32>,
    }

    impl Persist for Tally {
        fn file_name(&self) -> &str {
            &self.id
        }

        fn encode(&self) -> AppResult<String> {
            crate::codec::encode(&self.values)
        }
    }

    fn tally() -> Tally {
        Tally {
            id: "tally.json".to_string(),
            values: vec![1, 2],
        }
    }

    #[test]
    fn successful_mutation_is_written() {
        let dir = tempfile::tempdir().expect("temp root");
        let store = FlakyStore::new(dir.path());
        let mut entity = tally();

        let pushed = apply_and_persist(&mut entity, &store, |tally| {
            tally.values.push(3);
            Ok(tally.values.len())
        })
        .expect("persisted");

        assert_eq!(pushed, 3);
        assert_eq!(store.read("tally.json").expect("file"), "[1,2,3]");
    }

    #[test]
    fn failed_write_restores_snapshot() {
        let dir = tempfile::tempdir().expect("temp root");
        let store = FlakyStore::new(dir.path());
        store.fail_writes(true);
        let mut entity = tally();

        let error = apply_and_persist(&mut entity, &store, |tally| {
            tally.values.remove(0);
            tally.values.push(9);
            Ok(())
        })
        .expect_err("write refused");

        assert!(matches!(error, AppError::WriteFailed(_)));
        assert_eq!(entity, tally());
        assert!(!store.exists("tally.json"));
    }

    #[test]
    fn failed_mutation_restores_snapshot_without_writing() {
        let dir = tempfile::tempdir().expect("temp root");
        let store = FlakyStore::new(dir.path());
        let mut entity = tally();

        let result: AppResult<()> = apply_and_persist(&mut entity, &store, |tally| {
            tally.values.clear();
            Err(AppError::InputInvalid("nope".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(entity, tally());
        assert!(!store.exists("tally.json"));
    }
}
