//! # Flatix Core
//!
//! Secondary-index engine for flat-file tables.
//!
//! An index maps fixed-width key tuples to row positions. It is built in
//! one pass over a [`RowSource`] (extract, sort, reduce), stored as a
//! compact multi-level image in a dedicated or shared file, and queried
//! by binary search over the levels.
//!
//! ## Shape
//!
//! Each key column becomes one level holding only its distinct values
//! for each distinct prefix above it. An offset array per level maps a
//! rank to its range in the level below; the leaf level maps to row
//! ranges. Arrays whose mapping is the identity are elided, as is the
//! position array of a source with a fixed record stride.
//!
//! ## Example
//!
//! ```rust
//! use flatix_core::{
//!     BuildContext, ColumnAccessor, ColumnSpec, FetchMode, FetchOutcome,
//!     IndexDefinition, KeyType, KeyValue, MemoryRowSource, SearchOp, TableIndex,
//! };
//!
//! let definition = IndexDefinition::new(1)
//!     .column(ColumnSpec::new("amount", KeyType::Int64));
//! let mut source = MemoryRowSource::new(vec![
//!     (10, vec![KeyValue::int(7)]),
//!     (20, vec![KeyValue::int(3)]),
//! ]);
//! let accessor = source.accessor(0);
//! let mut index = TableIndex::make(
//!     definition,
//!     &mut source,
//!     &[&accessor as &dyn ColumnAccessor],
//!     &BuildContext::default(),
//! )
//! .unwrap();
//!
//! index.install_search_value(0, KeyValue::int(7)).unwrap();
//! index.fast_find(SearchOp::Eq).unwrap();
//! assert_eq!(
//!     index.fetch(FetchMode::Eq).unwrap(),
//!     FetchOutcome::Found { position: 10 }
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod build;
mod column;
mod config;
mod cursor;
mod definition;
mod error;
mod index;
mod layout;
mod sort;
mod source;
mod value;

pub use column::KeyColumn;
pub use config::{BuildConfig, BuildContext};
pub use cursor::{CompareOp, FetchMode, FetchOutcome, SearchOp};
pub use definition::{ColumnSpec, IndexDefinition};
pub use error::{CoreError, CoreResult};
pub use index::TableIndex;
pub use layout::BLOCK_SIZE;
pub use source::{
    ColumnAccessor, MemoryColumnAccessor, MemoryRowSource, ReadOutcome, RowSource,
};
pub use value::{KeyType, KeyValue};
