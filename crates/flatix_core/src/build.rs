//! Index construction: extract, sort, reduce.
//!
//! A build reads every usable row once, extracting one value per key
//! column into growable arenas, sorts a permutation over the rows by the
//! full key tuple, applies it to the arenas and the position array, then
//! reduces the levels coarsest-last: the leaf pass collapses duplicate
//! full tuples, and each pass above collapses duplicate prefixes and
//! records an offset array pointing into the level below.

use crate::column::KeyColumn;
use crate::config::BuildContext;
use crate::definition::IndexDefinition;
use crate::error::{CoreError, CoreResult};
use crate::layout::{IndexImage, BLOCK_SIZE};
use crate::sort::{apply_permutation, sort_permutation, Reorder};
use crate::source::{ColumnAccessor, ReadOutcome, RowSource};
use crate::value::KeyValue;
use std::cmp::Ordering;

struct ColumnReorder<'a> {
    column: &'a mut KeyColumn,
    temp: KeyValue,
}

impl<'a> ColumnReorder<'a> {
    fn new(column: &'a mut KeyColumn) -> Self {
        let temp = KeyValue::default_for(column.key_type());
        Self { column, temp }
    }
}

impl Reorder for ColumnReorder<'_> {
    fn load_temp(&mut self, i: usize) {
        self.temp = self.column.value_at(i);
    }
    fn store_temp(&mut self, i: usize) {
        self.column.set_value(i, &self.temp);
    }
    fn move_slot(&mut self, dst: usize, src: usize) {
        self.column.move_slot(dst, src);
    }
}

struct PositionReorder<'a> {
    positions: &'a mut [u64],
    temp: u64,
}

impl Reorder for PositionReorder<'_> {
    fn load_temp(&mut self, i: usize) {
        self.temp = self.positions[i];
    }
    fn store_temp(&mut self, i: usize) {
        self.positions[i] = self.temp;
    }
    fn move_slot(&mut self, dst: usize, src: usize) {
        self.positions[dst] = self.positions[src];
    }
}

fn compare_tuple(columns: &[KeyColumn], depth: usize, a: usize, b: usize) -> Ordering {
    for column in &columns[..depth] {
        match column.compare(a, b) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Runs a full build and returns the materialized index.
///
/// # Errors
///
/// [`CoreError::Interrupted`] if the context's flag was raised,
/// [`CoreError::UniquenessViolation`] if a unique index saw duplicate full
/// keys, [`CoreError::Allocation`] if an arena could not be grown.
pub(crate) fn make_image(
    definition: &IndexDefinition,
    source: &mut dyn RowSource,
    accessors: &[&dyn ColumnAccessor],
    ctx: &BuildContext,
) -> CoreResult<IndexImage> {
    definition.check_usable()?;
    if accessors.len() != definition.column_count() {
        return Err(CoreError::invalid_argument(format!(
            "expected {} column accessors, got {}",
            definition.column_count(),
            accessors.len()
        )));
    }

    let capacity = source.row_count_upper_bound();
    let mut columns = definition
        .columns
        .iter()
        .map(|spec| KeyColumn::with_capacity(spec, capacity))
        .collect::<CoreResult<Vec<_>>>()?;
    let mut buffers: Vec<KeyValue> = definition
        .columns
        .iter()
        .map(|spec| KeyValue::default_for(&spec.effective_type()))
        .collect();
    let mut positions: Vec<u64> = Vec::new();
    positions
        .try_reserve_exact(capacity)
        .map_err(|_| CoreError::Allocation {
            requested: capacity,
        })?;

    let mut rows = 0usize;
    loop {
        if ctx.is_interrupted() {
            return Err(CoreError::Interrupted);
        }
        match source.read_next()? {
            ReadOutcome::EndOfFile => break,
            ReadOutcome::Skip => continue,
            ReadOutcome::Row => {}
        }
        for ((accessor, buffer), column) in
            accessors.iter().zip(&mut buffers).zip(&mut columns)
        {
            accessor.read_into(buffer)?;
            column.push_value(buffer)?;
        }
        positions.push(source.current_position());
        rows += 1;
        if ctx.config.progress_interval != 0 && rows % ctx.config.progress_interval == 0 {
            tracing::debug!(index = definition.id, rows, "index build progress");
        }
    }
    if u32::try_from(rows).is_err() {
        return Err(CoreError::invalid_argument(format!(
            "row count {rows} exceeds shape range"
        )));
    }

    let col_count = columns.len();
    let mut perm: Vec<u32> = (0..rows as u32).collect();
    sort_permutation(&mut perm, ctx.config.sort_cutoff, |a, b| {
        compare_tuple(&columns, col_count, a, b)
    });
    for column in &mut columns {
        let mut p = perm.clone();
        apply_permutation(&mut p, &mut ColumnReorder::new(column));
    }
    apply_permutation(
        &mut perm,
        &mut PositionReorder {
            positions: &mut positions,
            temp: 0,
        },
    );

    // Leaf pass: collapse duplicate full tuples; offsets map each
    // distinct tuple to its row range.
    let mut leaf_offsets: Vec<u32> = Vec::with_capacity(rows + 1);
    let mut distinct = 0usize;
    for i in 0..rows {
        let new_group =
            distinct == 0 || compare_tuple(&columns, col_count, i, distinct - 1) != Ordering::Equal;
        if new_group {
            leaf_offsets.push(i as u32);
            for column in &mut columns {
                column.move_slot(distinct, i);
            }
            distinct += 1;
        }
    }
    leaf_offsets.push(rows as u32);

    if definition.unique && distinct < rows {
        return Err(CoreError::UniquenessViolation {
            rows,
            distinct,
        });
    }

    let max_same = leaf_offsets
        .windows(2)
        .map(|w| (w[1] - w[0]) as usize)
        .max()
        .unwrap_or(1);
    for column in &mut columns {
        column.truncate(distinct);
    }
    if let Some(leaf) = columns.last_mut() {
        leaf.set_reduced(distinct, max_same, None);
    }

    // Upper passes, finest prefix first: collapse duplicate prefixes of
    // depth k+1 and point each survivor at its range in the level below.
    for k in (0..col_count.saturating_sub(1)).rev() {
        let m = columns[k + 1].ndf();
        let mut offsets: Vec<u32> = Vec::with_capacity(m + 1);
        let mut d = 0usize;
        for i in 0..m {
            let new_group =
                d == 0 || compare_tuple(&columns, k + 1, i, d - 1) != Ordering::Equal;
            if new_group {
                offsets.push(i as u32);
                for column in columns.iter_mut().take(k + 1) {
                    column.move_slot(d, i);
                }
                d += 1;
            }
        }
        offsets.push(m as u32);
        let level_max = offsets
            .windows(2)
            .map(|w| (w[1] - w[0]) as usize)
            .max()
            .unwrap_or(1);
        for column in columns.iter_mut().take(k + 1) {
            column.truncate(d);
        }
        columns[k].set_reduced(d, level_max, if d < m { Some(offsets) } else { None });
    }

    // Two-tier search pays off only on large single-column indexes.
    if col_count == 1 && columns[0].ndf() > ctx.config.block_threshold {
        columns[0].make_blocks(BLOCK_SIZE);
    }

    let stride = source.fixed_stride().filter(|s| {
        *s > 0
            && *s <= u64::from(u32::MAX)
            && positions
                .iter()
                .enumerate()
                .all(|(i, p)| *p == i as u64 * *s)
    });

    tracing::debug!(
        index = definition.id,
        rows,
        leaf_distinct = distinct,
        "index build complete"
    );

    Ok(IndexImage {
        id: definition.id,
        unique: definition.unique,
        row_count: rows,
        stride,
        columns,
        leaf_offsets: (distinct < rows).then_some(leaf_offsets),
        positions: if stride.is_some() { None } else { Some(positions) },
    })
}
