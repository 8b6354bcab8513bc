//! Consumed row-source contracts.
//!
//! The index engine never touches data files itself: an external access
//! method (mapped, buffered, compressed, remote) implements [`RowSource`]
//! and hands out [`ColumnAccessor`]s bound to its current row. The same
//! accessors that extract key values during a build also install search
//! values for queries.
//!
//! The engine is single-threaded per build and per query, so neither
//! trait requires `Send`.

use crate::error::{CoreError, CoreResult};
use crate::value::KeyValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of advancing a row source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A usable row is current.
    Row,
    /// No more rows.
    EndOfFile,
    /// The current row is unusable (deleted, damaged) and must be skipped.
    Skip,
}

/// A sequential producer of table rows.
pub trait RowSource {
    /// Advances to the next row.
    fn read_next(&mut self) -> CoreResult<ReadOutcome>;

    /// Returns the opaque logical position of the current row.
    fn current_position(&self) -> u64;

    /// Returns an exact or conservative upper bound on the row count.
    fn row_count_upper_bound(&self) -> usize;

    /// Returns the record stride if every record occupies a fixed number
    /// of bytes, letting the index derive positions as `rank * stride`.
    fn fixed_stride(&self) -> Option<u64> {
        None
    }
}

/// Reads one column of the current row into a typed buffer.
pub trait ColumnAccessor {
    /// Copies the current row's value for this column into `out`.
    fn read_into(&self, out: &mut KeyValue) -> CoreResult<()>;
}

#[derive(Debug)]
struct MemoryInner {
    /// `None` values mark unusable rows the source reports as `Skip`.
    rows: Vec<(u64, Option<Vec<KeyValue>>)>,
    cursor: Option<usize>,
}

/// An in-memory row source over `(position, values)` tuples.
///
/// For tests and ephemeral tables. Accessors share the source's cursor,
/// the same way a real access method binds accessors to its current-row
/// buffer.
///
/// # Example
///
/// ```rust
/// use flatix_core::{KeyValue, MemoryRowSource, ReadOutcome, RowSource};
///
/// let mut source = MemoryRowSource::new(vec![
///     (10, vec![KeyValue::int(1)]),
///     (20, vec![KeyValue::int(3)]),
/// ]);
/// let accessor = source.accessor(0);
/// assert_eq!(source.read_next().unwrap(), ReadOutcome::Row);
/// assert_eq!(source.current_position(), 10);
/// ```
#[derive(Debug)]
pub struct MemoryRowSource {
    inner: Rc<RefCell<MemoryInner>>,
    stride: Option<u64>,
}

impl MemoryRowSource {
    /// Creates a source over usable rows only.
    #[must_use]
    pub fn new(rows: Vec<(u64, Vec<KeyValue>)>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryInner {
                rows: rows.into_iter().map(|(p, v)| (p, Some(v))).collect(),
                cursor: None,
            })),
            stride: None,
        }
    }

    /// Creates a source where `None` rows are reported as `Skip`.
    #[must_use]
    pub fn with_skips(rows: Vec<(u64, Option<Vec<KeyValue>>)>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryInner { rows, cursor: None })),
            stride: None,
        }
    }

    /// Declares a fixed record stride.
    #[must_use]
    pub fn fixed_stride_of(mut self, stride: u64) -> Self {
        self.stride = Some(stride);
        self
    }

    /// Returns an accessor for the given column, bound to this source's
    /// current row.
    #[must_use]
    pub fn accessor(&self, column: usize) -> MemoryColumnAccessor {
        MemoryColumnAccessor {
            inner: Rc::clone(&self.inner),
            column,
        }
    }
}

impl RowSource for MemoryRowSource {
    fn read_next(&mut self) -> CoreResult<ReadOutcome> {
        let mut inner = self.inner.borrow_mut();
        let next = inner.cursor.map_or(0, |c| c + 1);
        if next >= inner.rows.len() {
            return Ok(ReadOutcome::EndOfFile);
        }
        inner.cursor = Some(next);
        if inner.rows[next].1.is_some() {
            Ok(ReadOutcome::Row)
        } else {
            Ok(ReadOutcome::Skip)
        }
    }

    fn current_position(&self) -> u64 {
        let inner = self.inner.borrow();
        inner
            .cursor
            .map(|c| inner.rows[c].0)
            .unwrap_or_default()
    }

    fn row_count_upper_bound(&self) -> usize {
        self.inner.borrow().rows.len()
    }

    fn fixed_stride(&self) -> Option<u64> {
        self.stride
    }
}

/// Column accessor over a [`MemoryRowSource`].
#[derive(Debug)]
pub struct MemoryColumnAccessor {
    inner: Rc<RefCell<MemoryInner>>,
    column: usize,
}

impl ColumnAccessor for MemoryColumnAccessor {
    fn read_into(&self, out: &mut KeyValue) -> CoreResult<()> {
        let inner = self.inner.borrow();
        let cursor = inner
            .cursor
            .ok_or_else(|| CoreError::invalid_argument("no current row"))?;
        let values = inner.rows[cursor]
            .1
            .as_ref()
            .ok_or_else(|| CoreError::invalid_argument("current row is unusable"))?;
        let value = values.get(self.column).ok_or_else(|| {
            CoreError::invalid_argument(format!("row has no column {}", self.column))
        })?;
        *out = value.clone();
        Ok(())
    }
}
