use crate::errors::{AppError, AppResult};
use crate::file_store::Storage;
use crate::models::Mutation;
use crate::transaction::Persist;

/// An entity whose rows can be dragged into a new order. Swaps are
/// in-memory only; the order is written once when the drag ends.
pub trait Reorderable: Persist {
    fn row_count(&self) -> usize;

    fn exchange_rows(&mut self, a: usize, b: usize) -> AppResult<()>;
}

/// State of one drag gesture, owned by whoever handles the gesture
/// events and dropped when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderSession {
    initial: usize,
    current: usize,
}

impl ReorderSession {
    pub fn begin(index: usize, len: usize) -> AppResult<Self> {
        AppError::check_index(index, len)?;
        Ok(Self {
            initial: index,
            current: index,
        })
    }

    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn moved(&self) -> bool {
        self.initial != self.current
    }

    /// Walks the dragged row to `target`, one neighbour swap at a time, so
    /// the rows in between shift by one.
    pub fn move_to<R: Reorderable>(&mut self, target: usize, entity: &mut R) -> AppResult<()> {
        AppError::check_index(target, entity.row_count())?;
        while self.current != target {
            let next = if target > self.current {
                self.current + 1
            } else {
                self.current - 1
            };
            entity.exchange_rows(self.current, next)?;
            self.current = next;
        }
        Ok(())
    }

    /// Persists the new order once. When the write fails the rows are
    /// walked back to where the drag started.
    pub fn finish<R: Reorderable>(mut self, entity: &mut R, storage: &dyn Storage) -> AppResult<Mutation> {
        if !self.moved() {
            return Ok(Mutation::Unchanged);
        }
        if let Err(error) = entity.save(storage) {
            let initial = self.initial;
            self.move_to(initial, entity)?;
            tracing::warn!(file = %entity.file_name(), error = %error, "reorder not saved, rows restored");
            return Err(error);
        }
        tracing::debug!(file = %entity.file_name(), from = self.initial, to = self.current, "saved new order");
        Ok(Mutation::Applied)
    }
}
