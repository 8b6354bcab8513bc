//! The index engine: build, persist, search, fetch.

use crate::build::make_image;
use crate::config::BuildContext;
use crate::cursor::{CompareOp, Cursor, FetchMode, FetchOutcome, SearchOp, SearchState};
use crate::definition::IndexDefinition;
use crate::error::{CoreError, CoreResult};
use crate::layout::{load_image, save_image, IndexImage, BLOCK_SIZE};
use crate::source::{ColumnAccessor, RowSource};
use crate::value::KeyValue;
use flatix_storage::{
    BufferedVolume, HugeVolume, IndexVolume, SharedDirectory, DIRECTORY_SIZE,
};
use std::path::{Path, PathBuf};

/// Largest file the buffered backend can address.
const BUFFERED_BOUND: u64 = u32::MAX as u64 + 1;

/// A secondary index over a flat-file table.
///
/// Built once from a [`RowSource`] with [`make`](Self::make), persisted
/// with the `save_*` methods and reopened with the `init_*` methods.
/// Queries install probe values per key column, resolve them with
/// [`fast_find`](Self::fast_find) and walk rows with
/// [`fetch`](Self::fetch).
///
/// An index is single-threaded: one build or one query stream at a time.
#[derive(Debug)]
pub struct TableIndex {
    definition: IndexDefinition,
    image: IndexImage,
    cursor: Cursor,
}

impl TableIndex {
    /// Builds an index by reading every usable row of `source` once.
    ///
    /// `accessors` extract the key columns of the current row, one per
    /// column of the definition, in definition order.
    ///
    /// # Errors
    ///
    /// Fails on allocation pressure, interruption, duplicate keys under a
    /// unique definition, or a source error. No file is touched.
    pub fn make(
        definition: IndexDefinition,
        source: &mut dyn RowSource,
        accessors: &[&dyn ColumnAccessor],
        ctx: &BuildContext,
    ) -> CoreResult<Self> {
        let image = make_image(&definition, source, accessors, ctx)?;
        Ok(Self {
            definition,
            image,
            cursor: Cursor::default(),
        })
    }

    /// Writes the index body at the start of `volume`.
    pub fn save(&self, volume: &mut dyn IndexVolume) -> CoreResult<()> {
        save_image(&self.image, volume, 0)?;
        volume.sync()?;
        Ok(())
    }

    /// Writes the index to a dedicated file, atomically.
    ///
    /// The body is written to a sibling `.tmp` file and renamed over the
    /// target, so a crash mid-write leaves any previous index intact. The
    /// backend is picked by size: bodies past 4 GiB go through the huge
    /// backend.
    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let _ = std::fs::remove_file(&tmp);

        if self.image.encoded_size() >= BUFFERED_BOUND {
            let mut volume = HugeVolume::open(&tmp)?;
            self.save(&mut volume)?;
        } else {
            let mut volume = BufferedVolume::open(&tmp)?;
            self.save(&mut volume)?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Appends the index body to a shared file and patches its directory
    /// slot last, so readers never see a half-written index.
    pub fn save_shared(
        &self,
        volume: &mut dyn IndexVolume,
        directory: &mut SharedDirectory,
    ) -> CoreResult<()> {
        directory.reserve(self.image.id)?;
        let offset = volume.len()?.max(DIRECTORY_SIZE);
        save_image(&self.image, volume, offset)?;
        volume.sync()?;
        directory.commit(volume, self.image.id, offset)?;
        volume.sync()?;
        Ok(())
    }

    /// Loads the index body at the start of `volume` and validates it
    /// against `definition`.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShapeMismatch`] when the file was built from another
    /// definition; callers treat that as a cue to rebuild.
    pub fn init(volume: &mut dyn IndexVolume, definition: IndexDefinition) -> CoreResult<Self> {
        definition.check_usable()?;
        let image = load_image(volume, 0, &definition)?;
        Ok(Self {
            definition,
            image,
            cursor: Cursor::default(),
        })
    }

    /// Loads an index from a dedicated file.
    pub fn init_from_path(path: &Path, definition: IndexDefinition) -> CoreResult<Self> {
        if std::fs::metadata(path)?.len() >= BUFFERED_BOUND {
            let mut volume = HugeVolume::open(path)?;
            Self::init(&mut volume, definition)
        } else {
            let mut volume = BufferedVolume::open(path)?;
            Self::init(&mut volume, definition)
        }
    }

    /// Loads one index of a shared file through its directory.
    pub fn init_shared(
        volume: &mut dyn IndexVolume,
        directory: &SharedDirectory,
        definition: IndexDefinition,
    ) -> CoreResult<Self> {
        definition.check_usable()?;
        let offset = directory.locate(definition.id).ok_or_else(|| {
            CoreError::shape_mismatch(format!(
                "index id {} is not present in the shared file",
                definition.id
            ))
        })?;
        let image = load_image(volume, offset, &definition)?;
        Ok(Self {
            definition,
            image,
            cursor: Cursor::default(),
        })
    }

    /// The definition this index was built or loaded with.
    #[must_use]
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Number of indexed rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.image.row_count
    }

    /// Number of distinct key prefixes at the given level, if it exists.
    #[must_use]
    pub fn distinct_count(&self, level: usize) -> Option<usize> {
        self.image.columns.get(level).map(|c| c.ndf())
    }

    /// Stored value at a level and rank, if both exist.
    #[must_use]
    pub fn key_value(&self, level: usize, rank: usize) -> Option<KeyValue> {
        let column = self.image.columns.get(level)?;
        (rank < column.ndf()).then(|| column.value_at(rank))
    }

    /// Logical position of the last delivered row.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.cursor.row.map(|r| self.image.position_of(r))
    }

    /// Installs a probe value for one key column. Invalidates the result
    /// of any previous search.
    pub fn install_search_value(&mut self, column: usize, value: KeyValue) -> CoreResult<()> {
        let col = self
            .image
            .columns
            .get_mut(column)
            .ok_or_else(|| CoreError::invalid_argument(format!("no key column {column}")))?;
        col.install_search(value)?;
        self.cursor.search = None;
        Ok(())
    }

    /// Removes all installed probe values.
    pub fn clear_search_values(&mut self) {
        for column in &mut self.image.columns {
            column.clear_search();
        }
        self.cursor.search = None;
    }

    /// Resolves the installed probe prefix to a rank at its deepest
    /// level. Returns the rank and whether it matched exactly; `Ge` and
    /// `Gt` may return the level's distinct count as the past-the-end
    /// sentinel.
    ///
    /// The located group becomes the target of [`FetchMode::Eq`] and
    /// [`FetchMode::Same`] fetches.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedProbe`] unless the probes cover a leading,
    /// gap-free prefix of the key columns.
    pub fn fast_find(&mut self, op: SearchOp) -> CoreResult<(usize, bool)> {
        let state = self.descend(op)?;
        let found = (state.rank, state.exact);
        self.cursor.search = Some(state);
        Ok(found)
    }

    /// Delivers one row according to `mode`. See [`FetchMode`].
    pub fn fetch(&mut self, mode: FetchMode) -> CoreResult<FetchOutcome> {
        let total = self.image.row_count;
        match mode {
            FetchMode::Eq => {
                let state = self
                    .cursor
                    .search
                    .clone()
                    .ok_or_else(|| CoreError::invalid_argument("fetch EQ without a search"))?;
                if state.op == SearchOp::Eq && !state.exact {
                    return Ok(FetchOutcome::NotFound);
                }
                if state.rows.0 >= state.rows.1 {
                    return Ok(FetchOutcome::EndOfIndex);
                }
                let row = state.rows.0;
                let duplicate = self.cursor.row == Some(row);
                self.cursor.deliver(row, state.leaf.0, state.rows);
                let position = self.image.position_of(row);
                Ok(if duplicate {
                    FetchOutcome::DuplicateOfLastRow { position }
                } else {
                    FetchOutcome::Found { position }
                })
            }
            FetchMode::Same => {
                let row = self
                    .cursor
                    .row
                    .ok_or_else(|| CoreError::invalid_argument("fetch SAME without a row"))?;
                let next = row + 1;
                if next >= self.cursor.group.1 {
                    return Ok(FetchOutcome::NoMoreSame);
                }
                let mut rank = self.cursor.rank;
                if next >= self.image.leaf_range(rank).1 {
                    rank += 1;
                }
                let group = self.cursor.group;
                self.cursor.deliver(next, rank, group);
                Ok(FetchOutcome::Found {
                    position: self.image.position_of(next),
                })
            }
            FetchMode::First | FetchMode::Next => {
                let stepping = mode == FetchMode::Next && self.cursor.row.is_some();
                let next = if stepping {
                    self.cursor.row.unwrap_or(0) + 1
                } else {
                    0
                };
                if next >= total {
                    return Ok(FetchOutcome::EndOfIndex);
                }
                let rank = if stepping {
                    let rank = self.cursor.rank;
                    if next >= self.image.leaf_range(rank).1 {
                        rank + 1
                    } else {
                        rank
                    }
                } else {
                    0
                };
                let group = self.image.leaf_range(rank);
                self.cursor.deliver(next, rank, group);
                Ok(FetchOutcome::Found {
                    position: self.image.position_of(next),
                })
            }
            FetchMode::FstDif | FetchMode::NxtDif => {
                let rank = if mode == FetchMode::NxtDif && self.cursor.row.is_some() {
                    self.cursor.rank + 1
                } else {
                    0
                };
                if rank >= self.image.leaf_distinct() {
                    return Ok(FetchOutcome::EndOfIndex);
                }
                let group = self.image.leaf_range(rank);
                self.cursor.deliver(group.0, rank, group);
                Ok(FetchOutcome::Found {
                    position: self.image.position_of(group.0),
                })
            }
        }
    }

    /// Steps the last search to the next distinct prefix at its depth and
    /// returns the deepest column's value there, or `None` at the end.
    /// The stepped prefix becomes the new fetch target.
    pub fn next_val(&mut self) -> CoreResult<Option<KeyValue>> {
        let (op, depth, rank) = match &self.cursor.search {
            Some(s) => (s.op, s.depth, s.rank),
            None => {
                return Err(CoreError::invalid_argument(
                    "next distinct value without a search",
                ))
            }
        };
        let level = depth - 1;
        let next = rank + 1;
        if next >= self.image.columns[level].ndf() {
            return Ok(None);
        }
        let value = self.image.columns[level].value_at(next);
        let (leaf, rows) = self.subtree(level, next, next + 1);
        self.cursor.search = Some(SearchState {
            op,
            depth,
            rank: next,
            exact: true,
            leaf,
            rows,
        });
        Ok(Some(value))
    }

    /// Counts rows whose probed key prefix compares to the installed
    /// probe as `op` demands. Value comparisons, so a descending index
    /// counts the same rows as an ascending one over the same data.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedProbe`] when the probed columns mix sort
    /// directions; below-or-above is ambiguous there.
    pub fn range_count(&self, op: CompareOp) -> CoreResult<usize> {
        let depth = self.searched_depth()?;
        let ascending = self.image.columns[0].ascending();
        if self.image.columns[..depth]
            .iter()
            .any(|c| c.ascending() != ascending)
        {
            return Err(CoreError::unsupported_probe(
                "range counting over mixed sort directions",
            ));
        }
        let total = self.image.row_count;
        let before_ge = self.descend(SearchOp::Ge)?.rows.0;
        let before_gt = self.descend(SearchOp::Gt)?.rows.0;
        Ok(match (op, ascending) {
            (CompareOp::Lt, true) => before_ge,
            (CompareOp::Le, true) => before_gt,
            (CompareOp::Ge, true) => total - before_ge,
            (CompareOp::Gt, true) => total - before_gt,
            (CompareOp::Lt, false) => total - before_gt,
            (CompareOp::Le, false) => total - before_ge,
            (CompareOp::Ge, false) => before_gt,
            (CompareOp::Gt, false) => before_ge,
        })
    }

    /// Number of leading columns with a probe installed; probes must be
    /// gap-free from column zero.
    fn searched_depth(&self) -> CoreResult<usize> {
        let columns = &self.image.columns;
        let depth = columns.iter().take_while(|c| c.has_search()).count();
        if depth == 0 {
            return Err(CoreError::unsupported_probe("no probe values installed"));
        }
        if columns[depth..].iter().any(|c| c.has_search()) {
            return Err(CoreError::unsupported_probe(
                "probe values must cover a leading prefix of the key columns",
            ));
        }
        Ok(depth)
    }

    /// Entry range at level `level + 1` covered by ranks `[lo, hi)` of
    /// `level`. Identity when the level's offsets were elided.
    fn child_window(&self, level: usize, lo: usize, hi: usize) -> (usize, usize) {
        match self.image.columns[level].offsets() {
            Some(offsets) => (offsets[lo] as usize, offsets[hi] as usize),
            None => (lo, hi),
        }
    }

    /// Leaf rank range and row range covered by ranks `[lo, hi)` at the
    /// given level.
    fn subtree(&self, level: usize, lo: usize, hi: usize) -> ((usize, usize), (usize, usize)) {
        let (mut lo, mut hi) = (lo, hi);
        for l in level..self.image.columns.len() - 1 {
            let (a, b) = self.child_window(l, lo, hi);
            lo = a;
            hi = b;
        }
        let rows = match &self.image.leaf_offsets {
            Some(offsets) => (offsets[lo] as usize, offsets[hi] as usize),
            None => (lo, hi),
        };
        ((lo, hi), rows)
    }

    /// Multi-level binary search for the installed probe prefix.
    ///
    /// Walks the levels coarsest first. At each level the probe is
    /// resolved within the window its parent rank maps to; a window with
    /// nothing at or after the probe carries up: the parent steps to its
    /// next rank and the walk continues taking the first entry of every
    /// window below, since that prefix already orders after the probe.
    fn descend(&self, op: SearchOp) -> CoreResult<SearchState> {
        let depth = self.searched_depth()?;
        let columns = &self.image.columns;
        let total = self.image.row_count;
        let mut ranks = vec![0usize; depth];
        let mut windows = vec![(0usize, 0usize); depth];
        let mut exact_all = true;
        let mut take_first = false;
        let mut level = 0usize;
        let mut window = (0usize, columns[0].ndf());

        'descent: loop {
            windows[level] = window;
            let rank = if take_first {
                window.0
            } else {
                let (fine_lo, fine_hi) = if level == 0 && columns[0].has_blocks() {
                    columns[0].block_window(BLOCK_SIZE)?
                } else {
                    window
                };
                let (mut lb, mut exact) = columns[level].search_window(fine_lo, fine_hi)?;
                if op == SearchOp::Gt && level == depth - 1 && exact {
                    // entries within one window are distinct
                    lb += 1;
                    exact = false;
                }
                if lb >= window.1 {
                    exact_all = false;
                    let mut l = level;
                    loop {
                        if l == 0 {
                            let leaf_end = self.image.leaf_distinct();
                            return Ok(SearchState {
                                op,
                                depth,
                                rank: columns[depth - 1].ndf(),
                                exact: false,
                                leaf: (leaf_end, leaf_end),
                                rows: (total, total),
                            });
                        }
                        l -= 1;
                        ranks[l] += 1;
                        if ranks[l] < windows[l].1 {
                            break;
                        }
                    }
                    take_first = true;
                    window = self.child_window(l, ranks[l], ranks[l] + 1);
                    level = l + 1;
                    continue 'descent;
                }
                if !exact {
                    exact_all = false;
                    take_first = true;
                }
                lb
            };
            ranks[level] = rank;
            if level == depth - 1 {
                break;
            }
            window = self.child_window(level, rank, rank + 1);
            level += 1;
        }

        let rank = ranks[depth - 1];
        let (leaf, rows) = self.subtree(depth - 1, rank, rank + 1);
        Ok(SearchState {
            op,
            depth,
            rank,
            exact: exact_all && op != SearchOp::Gt,
            leaf,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::definition::ColumnSpec;
    use crate::source::MemoryRowSource;
    use crate::value::KeyType;
    use flatix_storage::MemoryVolume;
    use proptest::prelude::*;

    fn build(def: &IndexDefinition, rows: Vec<(u64, Vec<KeyValue>)>) -> TableIndex {
        build_with(def, rows, &BuildContext::default())
    }

    fn build_with(
        def: &IndexDefinition,
        rows: Vec<(u64, Vec<KeyValue>)>,
        ctx: &BuildContext,
    ) -> TableIndex {
        let mut source = MemoryRowSource::new(rows);
        let accessors: Vec<_> = (0..def.column_count())
            .map(|c| source.accessor(c))
            .collect();
        let refs: Vec<&dyn ColumnAccessor> =
            accessors.iter().map(|a| a as &dyn ColumnAccessor).collect();
        TableIndex::make(def.clone(), &mut source, &refs, ctx).unwrap()
    }

    fn int_def(columns: usize) -> IndexDefinition {
        let mut def = IndexDefinition::new(1);
        for name in ["a", "b", "c"].iter().take(columns) {
            def = def.column(ColumnSpec::new(*name, KeyType::Int64));
        }
        def
    }

    fn all_positions(index: &mut TableIndex) -> Vec<u64> {
        let mut out = Vec::new();
        let mut mode = FetchMode::First;
        while let FetchOutcome::Found { position } = index.fetch(mode).unwrap() {
            out.push(position);
            mode = FetchMode::Next;
        }
        out
    }

    #[test]
    fn first_next_walks_key_order() {
        let mut index = build(
            &int_def(1),
            vec![
                (10, vec![KeyValue::int(1)]),
                (20, vec![KeyValue::int(3)]),
                (30, vec![KeyValue::int(2)]),
            ],
        );
        assert_eq!(all_positions(&mut index), vec![10, 30, 20]);
        assert_eq!(index.fetch(FetchMode::Next).unwrap(), FetchOutcome::EndOfIndex);
    }

    #[test]
    fn fast_find_ranks() {
        let mut index = build(
            &int_def(1),
            vec![
                (10, vec![KeyValue::int(1)]),
                (20, vec![KeyValue::int(3)]),
                (30, vec![KeyValue::int(2)]),
            ],
        );
        index.install_search_value(0, KeyValue::int(2)).unwrap();
        assert_eq!(index.fast_find(SearchOp::Eq).unwrap(), (1, true));
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 30 }
        );
        assert_eq!(index.position(), Some(30));

        // Past everything: the sentinel rank equals the distinct count.
        index.install_search_value(0, KeyValue::int(4)).unwrap();
        assert_eq!(index.fast_find(SearchOp::Ge).unwrap(), (3, false));
        assert_eq!(index.fetch(FetchMode::Eq).unwrap(), FetchOutcome::EndOfIndex);
    }

    #[test]
    fn eq_miss_is_not_found() {
        let mut index = build(
            &int_def(1),
            vec![(10, vec![KeyValue::int(1)]), (20, vec![KeyValue::int(3)])],
        );
        index.install_search_value(0, KeyValue::int(2)).unwrap();
        assert!(!index.fast_find(SearchOp::Eq).unwrap().1);
        assert_eq!(index.fetch(FetchMode::Eq).unwrap(), FetchOutcome::NotFound);

        // The same probe under GE lands on the successor.
        assert_eq!(index.fast_find(SearchOp::Ge).unwrap(), (1, false));
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 20 }
        );
    }

    #[test]
    fn gt_skips_the_match() {
        let mut index = build(
            &int_def(1),
            vec![
                (10, vec![KeyValue::int(1)]),
                (20, vec![KeyValue::int(2)]),
                (30, vec![KeyValue::int(3)]),
            ],
        );
        index.install_search_value(0, KeyValue::int(2)).unwrap();
        assert_eq!(index.fast_find(SearchOp::Gt).unwrap(), (2, false));
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 30 }
        );
    }

    #[test]
    fn same_delivers_group_minus_one() {
        let rows = vec![
            (10, vec![KeyValue::int(5)]),
            (20, vec![KeyValue::int(5)]),
            (30, vec![KeyValue::int(5)]),
            (40, vec![KeyValue::int(9)]),
        ];
        let mut index = build(&int_def(1), rows);
        index.install_search_value(0, KeyValue::int(5)).unwrap();
        index.fast_find(SearchOp::Eq).unwrap();
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 10 }
        );

        let mut same = 0;
        while let FetchOutcome::Found { .. } = index.fetch(FetchMode::Same).unwrap() {
            same += 1;
        }
        assert_eq!(same, 2);
        assert_eq!(index.fetch(FetchMode::Same).unwrap(), FetchOutcome::NoMoreSame);
    }

    #[test]
    fn prefix_search_group_spans_leaf_ranks() {
        // Probe only column a of (a, b): SAME walks the whole a-group.
        let rows = vec![
            (10, vec![KeyValue::int(1), KeyValue::int(7)]),
            (20, vec![KeyValue::int(1), KeyValue::int(5)]),
            (30, vec![KeyValue::int(2), KeyValue::int(5)]),
            (40, vec![KeyValue::int(1), KeyValue::int(5)]),
        ];
        let mut index = build(&int_def(2), rows);
        index.install_search_value(0, KeyValue::int(1)).unwrap();
        index.fast_find(SearchOp::Eq).unwrap();

        // Group is (1,5) (1,5) (1,7): rows 20, 40, 10.
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 20 }
        );
        assert_eq!(
            index.fetch(FetchMode::Same).unwrap(),
            FetchOutcome::Found { position: 40 }
        );
        assert_eq!(
            index.fetch(FetchMode::Same).unwrap(),
            FetchOutcome::Found { position: 10 }
        );
        assert_eq!(index.fetch(FetchMode::Same).unwrap(), FetchOutcome::NoMoreSame);
    }

    #[test]
    fn probe_gaps_rejected() {
        let mut index = build(
            &int_def(3),
            vec![(10, vec![KeyValue::int(1), KeyValue::int(2), KeyValue::int(3)])],
        );
        // Column c probed without b.
        index.install_search_value(0, KeyValue::int(1)).unwrap();
        index.install_search_value(2, KeyValue::int(3)).unwrap();
        assert!(matches!(
            index.fast_find(SearchOp::Eq),
            Err(CoreError::UnsupportedProbe { .. })
        ));

        index.clear_search_values();
        assert!(matches!(
            index.fast_find(SearchOp::Eq),
            Err(CoreError::UnsupportedProbe { .. })
        ));
    }

    #[test]
    fn distinct_stepping_counts_distinct_keys() {
        let rows = vec![
            (10, vec![KeyValue::int(5)]),
            (20, vec![KeyValue::int(5)]),
            (30, vec![KeyValue::int(2)]),
            (40, vec![KeyValue::int(9)]),
        ];
        let mut index = build(&int_def(1), rows);
        let mut distinct = 0;
        let mut mode = FetchMode::FstDif;
        while let FetchOutcome::Found { .. } = index.fetch(mode).unwrap() {
            distinct += 1;
            mode = FetchMode::NxtDif;
        }
        assert_eq!(distinct, 3);
        assert_eq!(distinct, index.distinct_count(0).unwrap());
    }

    #[test]
    fn duplicate_of_last_row_reported() {
        let mut index = build(
            &int_def(1),
            vec![(10, vec![KeyValue::int(1)]), (20, vec![KeyValue::int(2)])],
        );
        index.install_search_value(0, KeyValue::int(2)).unwrap();
        index.fast_find(SearchOp::Eq).unwrap();
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 20 }
        );

        // A new search landing on the delivered row says so.
        index.install_search_value(0, KeyValue::int(2)).unwrap();
        index.fast_find(SearchOp::Eq).unwrap();
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::DuplicateOfLastRow { position: 20 }
        );
    }

    #[test]
    fn next_val_steps_distinct_prefixes() {
        let rows = vec![
            (10, vec![KeyValue::int(1), KeyValue::int(7)]),
            (20, vec![KeyValue::int(1), KeyValue::int(5)]),
            (30, vec![KeyValue::int(2), KeyValue::int(5)]),
            (40, vec![KeyValue::int(4), KeyValue::int(5)]),
        ];
        let mut index = build(&int_def(2), rows);
        index.install_search_value(0, KeyValue::int(1)).unwrap();
        index.fast_find(SearchOp::Eq).unwrap();

        assert_eq!(index.next_val().unwrap(), Some(KeyValue::int(2)));
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 30 }
        );
        assert_eq!(index.next_val().unwrap(), Some(KeyValue::int(4)));
        assert_eq!(index.next_val().unwrap(), None);
    }

    #[test]
    fn range_counts() {
        let rows: Vec<_> = [1i64, 2, 2, 3, 5, 5, 5, 8]
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64, vec![KeyValue::int(*v)]))
            .collect();
        let mut index = build(&int_def(1), rows);
        index.install_search_value(0, KeyValue::int(3)).unwrap();
        assert_eq!(index.range_count(CompareOp::Lt).unwrap(), 3);
        assert_eq!(index.range_count(CompareOp::Le).unwrap(), 4);
        assert_eq!(index.range_count(CompareOp::Ge).unwrap(), 5);
        assert_eq!(index.range_count(CompareOp::Gt).unwrap(), 4);

        // A probe between stored values.
        index.install_search_value(0, KeyValue::int(4)).unwrap();
        assert_eq!(index.range_count(CompareOp::Lt).unwrap(), 4);
        assert_eq!(index.range_count(CompareOp::Le).unwrap(), 4);
        assert_eq!(index.range_count(CompareOp::Ge).unwrap(), 4);
        assert_eq!(index.range_count(CompareOp::Gt).unwrap(), 4);
    }

    #[test]
    fn range_counts_on_descending_column() {
        let def =
            IndexDefinition::new(1).column(ColumnSpec::new("a", KeyType::Int64).descending());
        let rows: Vec<_> = [1i64, 2, 3, 5]
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64, vec![KeyValue::int(*v)]))
            .collect();
        let mut index = build(&def, rows);
        index.install_search_value(0, KeyValue::int(3)).unwrap();
        // Value comparisons, independent of the stored direction.
        assert_eq!(index.range_count(CompareOp::Lt).unwrap(), 2);
        assert_eq!(index.range_count(CompareOp::Le).unwrap(), 3);
        assert_eq!(index.range_count(CompareOp::Ge).unwrap(), 2);
        assert_eq!(index.range_count(CompareOp::Gt).unwrap(), 1);
    }

    #[test]
    fn descending_first_next_order() {
        let def =
            IndexDefinition::new(1).column(ColumnSpec::new("a", KeyType::Int64).descending());
        let mut index = build(
            &def,
            vec![
                (10, vec![KeyValue::int(1)]),
                (20, vec![KeyValue::int(3)]),
                (30, vec![KeyValue::int(2)]),
            ],
        );
        assert_eq!(all_positions(&mut index), vec![20, 30, 10]);
    }

    #[test]
    fn prefix_text_keys_collapse() {
        let text = KeyType::Text {
            width: 16,
            case_insensitive: false,
        };
        let def = IndexDefinition::new(1).column(ColumnSpec::new("name", text).prefix(2));
        let mut index = build(
            &def,
            vec![
                (10, vec![KeyValue::text("apple")]),
                (20, vec![KeyValue::text("apricot")]),
                (30, vec![KeyValue::text("banana")]),
            ],
        );
        // "apple" and "apricot" share the stored prefix "ap".
        assert_eq!(index.distinct_count(0).unwrap(), 2);
        index.install_search_value(0, KeyValue::text("ap")).unwrap();
        assert_eq!(index.fast_find(SearchOp::Eq).unwrap(), (0, true));
        assert_eq!(
            index.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 10 }
        );
        assert_eq!(
            index.fetch(FetchMode::Same).unwrap(),
            FetchOutcome::Found { position: 20 }
        );
    }

    #[test]
    fn case_insensitive_text_probe() {
        let text = KeyType::Text {
            width: 8,
            case_insensitive: true,
        };
        let def = IndexDefinition::new(1).column(ColumnSpec::new("name", text));
        let mut index = build(
            &def,
            vec![(10, vec![KeyValue::text("Alpha")]), (20, vec![KeyValue::text("beta")])],
        );
        index
            .install_search_value(0, KeyValue::text("ALPHA"))
            .unwrap();
        assert!(index.fast_find(SearchOp::Eq).unwrap().1);
    }

    #[test]
    fn save_and_init_roundtrip() {
        let index = build(
            &int_def(2),
            vec![
                (10, vec![KeyValue::int(1), KeyValue::int(7)]),
                (20, vec![KeyValue::int(2), KeyValue::int(5)]),
                (30, vec![KeyValue::int(1), KeyValue::int(5)]),
            ],
        );
        let mut volume = MemoryVolume::new();
        index.save(&mut volume).unwrap();

        let mut reopened = TableIndex::init(&mut volume, int_def(2)).unwrap();
        assert_eq!(reopened.row_count(), 3);
        assert_eq!(all_positions(&mut reopened), vec![30, 10, 20]);

        reopened.install_search_value(0, KeyValue::int(1)).unwrap();
        reopened.install_search_value(1, KeyValue::int(7)).unwrap();
        reopened.fast_find(SearchOp::Eq).unwrap();
        assert_eq!(
            reopened.fetch(FetchMode::Eq).unwrap(),
            FetchOutcome::Found { position: 10 }
        );
    }

    #[test]
    fn init_with_other_definition_is_shape_mismatch() {
        let index = build(&int_def(2), vec![(10, vec![KeyValue::int(1), KeyValue::int(2)])]);
        let mut volume = MemoryVolume::new();
        index.save(&mut volume).unwrap();
        assert!(matches!(
            TableIndex::init(&mut volume, int_def(1)),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn save_to_path_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.fxi");

        let index = build(&int_def(1), vec![(10, vec![KeyValue::int(4)])]);
        index.save_to_path(&path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("orders.fxi.tmp").exists());

        let reopened = TableIndex::init_from_path(&path, int_def(1)).unwrap();
        assert_eq!(reopened.row_count(), 1);
    }

    #[test]
    fn shared_file_isolates_indexes() {
        let orders = build(&int_def(1), vec![(10, vec![KeyValue::int(4)])]);
        let items = {
            let def = IndexDefinition::new(2).column(ColumnSpec::new("a", KeyType::Int64));
            build(&def, vec![(50, vec![KeyValue::int(9)]), (60, vec![KeyValue::int(8)])])
        };

        let mut volume = MemoryVolume::new();
        let mut directory = SharedDirectory::create(&mut volume).unwrap();
        orders.save_shared(&mut volume, &mut directory).unwrap();
        items.save_shared(&mut volume, &mut directory).unwrap();

        let directory = SharedDirectory::load(&mut volume).unwrap();
        let mut a = TableIndex::init_shared(&mut volume, &directory, int_def(1)).unwrap();
        let def_b = IndexDefinition::new(2).column(ColumnSpec::new("a", KeyType::Int64));
        let mut b = TableIndex::init_shared(&mut volume, &directory, def_b).unwrap();

        assert_eq!(all_positions(&mut a), vec![10]);
        assert_eq!(all_positions(&mut b), vec![60, 50]);
    }

    #[test]
    fn init_shared_missing_id() {
        let mut volume = MemoryVolume::new();
        let directory = SharedDirectory::create(&mut volume).unwrap();
        assert!(matches!(
            TableIndex::init_shared(&mut volume, &directory, int_def(1)),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn blocked_search_matches_plain_search() {
        let rows: Vec<_> = (0..2000)
            .map(|i| (i as u64, vec![KeyValue::int(i * 3)]))
            .collect();
        let ctx = BuildContext::new(BuildConfig::new().block_threshold(500));
        let mut index = build_with(&int_def(1), rows, &ctx);

        for probe in [0i64, 1, 2999, 3000, 5997, 9000] {
            index.install_search_value(0, KeyValue::int(probe)).unwrap();
            let (rank, exact) = index.fast_find(SearchOp::Ge).unwrap();
            let expected = ((probe + 2) / 3).min(2000) as usize;
            assert_eq!(rank, expected, "probe {probe}");
            assert_eq!(exact, probe % 3 == 0 && probe < 6000, "probe {probe}");
        }
    }

    #[test]
    fn empty_index_fetches_nothing() {
        let mut index = build(&int_def(1), Vec::new());
        assert_eq!(index.fetch(FetchMode::First).unwrap(), FetchOutcome::EndOfIndex);
        assert_eq!(index.fetch(FetchMode::FstDif).unwrap(), FetchOutcome::EndOfIndex);

        index.install_search_value(0, KeyValue::int(1)).unwrap();
        assert_eq!(index.fast_find(SearchOp::Ge).unwrap(), (0, false));
        assert_eq!(index.fetch(FetchMode::Eq).unwrap(), FetchOutcome::EndOfIndex);
    }

    fn naive_order(rows: &[(u64, i64)]) -> Vec<u64> {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|&i| (rows[i].1, i));
        order.iter().map(|&i| rows[i].0).collect()
    }

    proptest! {
        #[test]
        fn walk_matches_naive_sort(values in proptest::collection::vec(-50i64..50, 0..200)) {
            let rows: Vec<(u64, i64)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64 * 10, *v))
                .collect();
            let source_rows: Vec<_> = rows
                .iter()
                .map(|(p, v)| (*p, vec![KeyValue::int(*v)]))
                .collect();
            let mut index = build(&int_def(1), source_rows);
            prop_assert_eq!(all_positions(&mut index), naive_order(&rows));
        }

        #[test]
        fn range_counts_match_naive(
            values in proptest::collection::vec(-20i64..20, 1..100),
            probe in -25i64..25,
        ) {
            let source_rows: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64, vec![KeyValue::int(*v)]))
                .collect();
            let mut index = build(&int_def(1), source_rows);
            index.install_search_value(0, KeyValue::int(probe)).unwrap();

            let lt = values.iter().filter(|v| **v < probe).count();
            let le = values.iter().filter(|v| **v <= probe).count();
            prop_assert_eq!(index.range_count(CompareOp::Lt).unwrap(), lt);
            prop_assert_eq!(index.range_count(CompareOp::Le).unwrap(), le);
            prop_assert_eq!(index.range_count(CompareOp::Ge).unwrap(), values.len() - lt);
            prop_assert_eq!(index.range_count(CompareOp::Gt).unwrap(), values.len() - le);
        }

        #[test]
        fn saved_index_answers_like_fresh(values in proptest::collection::vec(0i64..30, 0..80)) {
            let source_rows: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64, vec![KeyValue::int(*v)]))
                .collect();
            let mut fresh = build(&int_def(1), source_rows);
            let mut volume = MemoryVolume::new();
            fresh.save(&mut volume).unwrap();
            let mut reopened = TableIndex::init(&mut volume, int_def(1)).unwrap();
            prop_assert_eq!(all_positions(&mut reopened), all_positions(&mut fresh));
        }
    }
}
