use tracing::debug;

use crate::driver::DriverStatement;
use crate::error::DriverError;
use crate::types::BindValue;

/// Chunk size used when the caller passes zero.
pub const DEFAULT_BATCH_CHUNK: usize = 1000;

/// Parameter tuples to run against one statement, flushed every `chunk_size` tuples.
#[derive(Debug, Clone, Copy)]
pub struct BatchJob<'a> {
    tuples: &'a [Vec<BindValue>],
    chunk_size: usize,
}

impl<'a> BatchJob<'a> {
    /// A `chunk_size` of zero means [`DEFAULT_BATCH_CHUNK`].
    #[must_use]
    pub fn new(tuples: &'a [Vec<BindValue>], chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_BATCH_CHUNK
        } else {
            chunk_size
        };
        Self { tuples, chunk_size }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Bind and queue every tuple, flushing each full chunk and then whatever is left.
    /// Returns the total rows affected.
    ///
    /// Flushing does not commit. When a flush fails, chunks flushed earlier stay
    /// applied in the open transaction.
    ///
    /// # Errors
    /// Returns `DriverError` if binding, queueing, or any flush fails.
    pub fn execute(&self, statement: &mut dyn DriverStatement) -> Result<u64, DriverError> {
        let mut total = 0_u64;
        for (position, tuple) in self.tuples.iter().enumerate() {
            statement.clear_parameters();
            for (offset, value) in tuple.iter().enumerate() {
                statement.bind(offset + 1, value)?;
            }
            statement.add_batch()?;

            if (position + 1) % self.chunk_size == 0 {
                total += flush(statement)?;
                debug!(flushed = position + 1, total, "batch chunk flushed");
            }
        }
        total += flush(statement)?;
        Ok(total)
    }
}

fn flush(statement: &mut dyn DriverStatement) -> Result<u64, DriverError> {
    let counts = statement.execute_batch()?;
    Ok(counts
        .into_iter()
        .filter_map(|count| u64::try_from(count).ok())
        .sum())
}

/// Run `tuples` against `statement` in chunks of `chunk_size` (zero means
/// [`DEFAULT_BATCH_CHUNK`]).
///
/// # Errors
/// Returns `DriverError` if binding or any flush fails.
pub fn execute_batch(
    statement: &mut dyn DriverStatement,
    tuples: &[Vec<BindValue>],
    chunk_size: usize,
) -> Result<u64, DriverError> {
    BatchJob::new(tuples, chunk_size).execute(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_means_default() {
        let tuples = vec![vec![BindValue::Int(1)]];
        assert_eq!(BatchJob::new(&tuples, 0).chunk_size(), DEFAULT_BATCH_CHUNK);
        assert_eq!(BatchJob::new(&tuples, 7).chunk_size(), 7);
    }
}
