//! On-disk index layout.
//!
//! An index body is written at some byte offset of an [`IndexVolume`]
//! (offset 0 for a private file, a directory slot offset for a shared
//! file). All shape integers are `u32` little-endian; positions are `u64`
//! little-endian; value arrays are packed at the column's element width
//! with no padding.
//!
//! ```text
//! header:   magic "FXI1", id, column_count, row_count, leaf_distinct,
//!           flags, stride                                  (7 x u32)
//! leaf offsets   (leaf_distinct + 1) x u32    iff leaf_distinct < row_count
//! positions      row_count x u64              iff flags lack FIXED_STRIDE
//! per column, coarsest first:
//!   shape:  type_code, elem_width, col_flags, ndf, max_same   (5 x u32)
//!   blocks  ceil(ndf / BLOCK_SIZE) elements   iff col_flags has HAS_BLOCKS
//!   values  ndf elements
//!   offsets (ndf + 1) x u32                   iff col_flags has HAS_OFFSETS
//! ```

use crate::column::{KeyColumn, ValueArray};
use crate::definition::IndexDefinition;
use crate::error::{CoreError, CoreResult};
use crate::value::KeyType;
use flatix_storage::{IndexVolume, StorageError};

/// Magic bytes "FXI1" as a little-endian shape integer.
pub(crate) const INDEX_MAGIC: u32 = 0x4658_4931;

/// Number of distinct values summarized by one block sample.
///
/// Baked into the format: a loaded block array is only meaningful at the
/// size it was sampled at.
pub const BLOCK_SIZE: usize = 256;

const FLAG_UNIQUE: u32 = 1;
const FLAG_FIXED_STRIDE: u32 = 2;
const FLAG_MASK: u32 = FLAG_UNIQUE | FLAG_FIXED_STRIDE;

const COL_ASCENDING: u32 = 1;
const COL_CASE_INSENSITIVE: u32 = 2;
const COL_HAS_OFFSETS: u32 = 4;
const COL_HAS_BLOCKS: u32 = 8;
const COL_MASK: u32 = COL_ASCENDING | COL_CASE_INSENSITIVE | COL_HAS_OFFSETS | COL_HAS_BLOCKS;

/// A fully materialized index: the in-memory form of one index body.
#[derive(Debug)]
pub(crate) struct IndexImage {
    pub id: u32,
    pub unique: bool,
    pub row_count: usize,
    /// Fixed record stride; when set, positions are derived as
    /// `rank * stride` and the position array is elided.
    pub stride: Option<u64>,
    /// Key columns, coarsest first. The last one is the leaf column.
    pub columns: Vec<KeyColumn>,
    /// Maps leaf rank to its row range; `None` when every leaf value is
    /// distinct and rank equals row number.
    pub leaf_offsets: Option<Vec<u32>>,
    /// Row positions in key order; `None` when `stride` is set.
    pub positions: Option<Vec<u64>>,
}

impl IndexImage {
    /// Leaf distinct count.
    pub(crate) fn leaf_distinct(&self) -> usize {
        self.columns.last().map_or(0, KeyColumn::ndf)
    }

    /// Row range `[start, end)` covered by a leaf rank.
    pub(crate) fn leaf_range(&self, rank: usize) -> (usize, usize) {
        match &self.leaf_offsets {
            Some(offsets) => (offsets[rank] as usize, offsets[rank + 1] as usize),
            None => (rank, rank + 1),
        }
    }

    /// Serialized size in bytes, used to pick a file backend.
    pub(crate) fn encoded_size(&self) -> u64 {
        let mut size = 28u64;
        if let Some(offsets) = &self.leaf_offsets {
            size += offsets.len() as u64 * 4;
        }
        if let Some(positions) = &self.positions {
            size += positions.len() as u64 * 8;
        }
        for column in &self.columns {
            let width = column.key_type().width() as u64;
            size += 20;
            if column.has_blocks() {
                size += column.ndf().div_ceil(BLOCK_SIZE) as u64 * width;
            }
            size += column.ndf() as u64 * width;
            if let Some(offsets) = column.offsets() {
                size += offsets.len() as u64 * 4;
            }
        }
        size
    }

    /// Logical position of the row at the given key-order index.
    pub(crate) fn position_of(&self, row: usize) -> u64 {
        match (&self.positions, self.stride) {
            (Some(positions), _) => positions[row],
            (None, Some(stride)) => row as u64 * stride,
            (None, None) => 0,
        }
    }
}

fn alloc_bytes(len: usize) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CoreError::Allocation { requested: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Reads from the volume, mapping a short read to corruption: a read past
/// the end of an index body means the body is truncated, not that the
/// device failed.
fn read_exact(volume: &mut dyn IndexVolume, buf: &mut [u8]) -> CoreResult<()> {
    volume.read_exact(buf).map_err(|e| match e {
        StorageError::ReadPastEnd { .. } => CoreError::corrupt("index body truncated"),
        other => CoreError::Storage(other),
    })
}

fn read_u32s(volume: &mut dyn IndexVolume, n: usize) -> CoreResult<Vec<u32>> {
    let mut raw = alloc_bytes(n * 4)?;
    read_exact(volume, &mut raw)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn shape_u32(value: usize, what: &str) -> CoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| CoreError::invalid_argument(format!("{what} {value} exceeds shape range")))
}

/// Writes an index body at `offset`. Returns the end offset.
pub(crate) fn save_image(
    image: &IndexImage,
    volume: &mut dyn IndexVolume,
    offset: u64,
) -> CoreResult<u64> {
    let mut flags = 0u32;
    if image.unique {
        flags |= FLAG_UNIQUE;
    }
    let stride = match image.stride {
        Some(s) => {
            flags |= FLAG_FIXED_STRIDE;
            u32::try_from(s).map_err(|_| {
                CoreError::invalid_argument(format!("record stride {s} exceeds shape range"))
            })?
        }
        None => 0,
    };

    let mut header = Vec::with_capacity(28);
    for word in [
        INDEX_MAGIC,
        image.id,
        shape_u32(image.columns.len(), "column count")?,
        shape_u32(image.row_count, "row count")?,
        shape_u32(image.leaf_distinct(), "leaf distinct count")?,
        flags,
        stride,
    ] {
        header.extend_from_slice(&word.to_le_bytes());
    }
    volume.seek(offset)?;
    volume.write_all(&header)?;

    if let Some(offsets) = &image.leaf_offsets {
        write_u32s(volume, offsets)?;
    }
    if let Some(positions) = &image.positions {
        let mut buf = Vec::with_capacity(positions.len() * 8);
        for p in positions {
            buf.extend_from_slice(&p.to_le_bytes());
        }
        volume.write_all(&buf)?;
    }

    for column in &image.columns {
        let mut col_flags = 0u32;
        if column.ascending() {
            col_flags |= COL_ASCENDING;
        }
        if column.key_type().case_insensitive() {
            col_flags |= COL_CASE_INSENSITIVE;
        }
        if column.offsets().is_some() {
            col_flags |= COL_HAS_OFFSETS;
        }
        if column.has_blocks() {
            col_flags |= COL_HAS_BLOCKS;
        }
        let shape = [
            column.key_type().type_code(),
            shape_u32(column.key_type().width(), "element width")?,
            col_flags,
            shape_u32(column.ndf(), "distinct count")?,
            shape_u32(column.max_same(), "duplicate-group bound")?,
        ];
        let mut buf = Vec::with_capacity(20);
        for word in shape {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        volume.write_all(&buf)?;

        let mut body = Vec::new();
        if let Some(blocks) = column.blocks() {
            blocks.encode_into(&mut body);
        }
        column.values().encode_into(&mut body);
        volume.write_all(&body)?;

        if let Some(offsets) = column.offsets() {
            write_u32s(volume, offsets)?;
        }
    }

    volume.flush()?;
    volume.position().map_err(CoreError::Storage)
}

fn write_u32s(volume: &mut dyn IndexVolume, values: &[u32]) -> CoreResult<()> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    volume.write_all(&buf)?;
    Ok(())
}

/// Reads and validates the index body at `offset` against `definition`.
///
/// # Errors
///
/// [`CoreError::IndexCorrupt`] for structural damage,
/// [`CoreError::ShapeMismatch`] when the body was built from a different
/// definition. An id that differs while the shape matches is tolerated:
/// catalogs renumber indexes without rebuilding them.
pub(crate) fn load_image(
    volume: &mut dyn IndexVolume,
    offset: u64,
    definition: &IndexDefinition,
) -> CoreResult<IndexImage> {
    volume.seek(offset)?;
    let header = read_u32s(volume, 7)?;
    if header[0] != INDEX_MAGIC {
        return Err(CoreError::corrupt(format!(
            "bad index magic {:#010x}",
            header[0]
        )));
    }
    let id = header[1];
    let column_count = header[2] as usize;
    let row_count = header[3] as usize;
    let leaf_distinct = header[4] as usize;
    let flags = header[5];
    if flags & !FLAG_MASK != 0 {
        return Err(CoreError::corrupt(format!("unknown index flags {flags:#x}")));
    }

    if id != definition.id {
        tracing::debug!(
            stored = id,
            expected = definition.id,
            "index id differs from definition, shape matches"
        );
    }
    if column_count != definition.column_count() {
        return Err(CoreError::shape_mismatch(format!(
            "expected {} key columns, file has {column_count}",
            definition.column_count()
        )));
    }
    let unique = flags & FLAG_UNIQUE != 0;
    if unique != definition.unique {
        return Err(CoreError::shape_mismatch(
            "uniqueness of file and definition differ",
        ));
    }
    if leaf_distinct > row_count {
        return Err(CoreError::corrupt(format!(
            "leaf distinct count {leaf_distinct} exceeds row count {row_count}"
        )));
    }
    let stride = if flags & FLAG_FIXED_STRIDE != 0 {
        Some(u64::from(header[6]))
    } else {
        None
    };

    let leaf_offsets = if leaf_distinct < row_count {
        let offsets = read_u32s(volume, leaf_distinct + 1)?;
        check_offsets(&offsets, row_count, "leaf")?;
        Some(offsets)
    } else {
        None
    };

    let positions = if stride.is_none() {
        let mut raw = alloc_bytes(row_count * 8)?;
        read_exact(volume, &mut raw)?;
        Some(
            raw.chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap_or_default()))
                .collect(),
        )
    } else {
        None
    };

    let mut columns = Vec::with_capacity(column_count);
    let mut prev_ndf: Option<usize> = None;
    for (k, spec) in definition.columns.iter().enumerate() {
        let shape = read_u32s(volume, 5)?;
        let col_flags = shape[2];
        if col_flags & !COL_MASK != 0 {
            return Err(CoreError::corrupt(format!(
                "unknown column flags {col_flags:#x}"
            )));
        }
        let key_type = KeyType::from_parts(
            shape[0],
            shape[1] as usize,
            col_flags & COL_CASE_INSENSITIVE != 0,
        )?;
        let ascending = col_flags & COL_ASCENDING != 0;
        let expected = spec.effective_type();
        if key_type != expected || ascending != spec.ascending {
            return Err(CoreError::shape_mismatch(format!(
                "key column '{}' does not match the file",
                spec.name
            )));
        }

        let ndf = shape[3] as usize;
        let max_same = shape[4] as usize;
        if let Some(prev) = prev_ndf {
            if ndf > prev {
                return Err(CoreError::corrupt(format!(
                    "column {k} has {ndf} distinct values, coarser than level above ({prev})"
                )));
            }
        }
        if ndf > row_count || (ndf == 0) != (row_count == 0) {
            return Err(CoreError::corrupt(format!(
                "column {k} distinct count {ndf} inconsistent with {row_count} rows"
            )));
        }

        let blocks = if col_flags & COL_HAS_BLOCKS != 0 {
            let count = ndf.div_ceil(BLOCK_SIZE);
            let mut raw = alloc_bytes(count * key_type.width())?;
            read_exact(volume, &mut raw)?;
            Some(ValueArray::decode(&key_type, count, &raw)?)
        } else {
            None
        };

        let mut raw = alloc_bytes(ndf * key_type.width())?;
        read_exact(volume, &mut raw)?;
        let values = ValueArray::decode(&key_type, ndf, &raw)?;

        let offsets = if col_flags & COL_HAS_OFFSETS != 0 {
            let offsets = read_u32s(volume, ndf + 1)?;
            Some(offsets)
        } else {
            None
        };

        let mut column = KeyColumn::from_parts(
            spec.name.clone(),
            key_type,
            ascending,
            values,
            ndf,
            max_same,
            offsets,
            None,
        );
        column.set_blocks(blocks);
        columns.push(column);
        prev_ndf = Some(ndf);
    }

    // Offset arrays must land exactly on the next finer level.
    for k in 0..columns.len() {
        let finer = if k + 1 < columns.len() {
            columns[k + 1].ndf()
        } else {
            leaf_distinct
        };
        match columns[k].offsets() {
            Some(offsets) => check_offsets(offsets, finer, "column")?,
            None if columns[k].ndf() != finer => {
                return Err(CoreError::corrupt(format!(
                    "column {k} has no offsets but {} distinct values over {finer}",
                    columns[k].ndf()
                )));
            }
            None => {}
        }
    }
    if columns.last().map_or(0, KeyColumn::ndf) != leaf_distinct {
        return Err(CoreError::corrupt(
            "leaf column distinct count disagrees with header",
        ));
    }

    Ok(IndexImage {
        id,
        unique,
        row_count,
        stride,
        columns,
        leaf_offsets,
        positions,
    })
}

fn check_offsets(offsets: &[u32], finer: usize, what: &str) -> CoreResult<()> {
    if offsets.first() != Some(&0) {
        return Err(CoreError::corrupt(format!(
            "{what} offset array does not start at zero"
        )));
    }
    if offsets.last().copied().map(|v| v as usize) != Some(finer) {
        return Err(CoreError::corrupt(format!(
            "{what} offset array does not cover the finer level"
        )));
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(CoreError::corrupt(format!(
            "{what} offset array is not monotone"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ColumnSpec;
    use crate::value::KeyValue;
    use flatix_storage::MemoryVolume;

    fn column(name: &str, values: &[i64], ndf: usize, offsets: Option<Vec<u32>>) -> KeyColumn {
        let spec = ColumnSpec::new(name, KeyType::Int64);
        let mut col = KeyColumn::with_capacity(&spec, values.len()).unwrap();
        for v in values {
            col.push_value(&KeyValue::int(*v)).unwrap();
        }
        let max_same = 1;
        col.set_reduced(ndf, max_same, offsets);
        col
    }

    fn two_level_image() -> IndexImage {
        // Keys (a, b): (1,10) (1,20) (2,10), rows 0..3.
        IndexImage {
            id: 4,
            unique: true,
            row_count: 3,
            stride: None,
            columns: vec![
                column("a", &[1, 2], 2, Some(vec![0, 2, 3])),
                column("b", &[10, 20, 10], 3, None),
            ],
            leaf_offsets: None,
            positions: Some(vec![100, 200, 300]),
        }
    }

    fn definition() -> IndexDefinition {
        IndexDefinition::new(4)
            .unique()
            .column(ColumnSpec::new("a", KeyType::Int64))
            .column(ColumnSpec::new("b", KeyType::Int64))
    }

    #[test]
    fn save_load_roundtrip() {
        let mut volume = MemoryVolume::new();
        let end = save_image(&two_level_image(), &mut volume, 0).unwrap();
        assert_eq!(end, volume.len().unwrap());

        let image = load_image(&mut volume, 0, &definition()).unwrap();
        assert_eq!(image.row_count, 3);
        assert!(image.unique);
        assert_eq!(image.leaf_distinct(), 3);
        assert_eq!(image.columns[0].ndf(), 2);
        assert_eq!(image.columns[0].offsets(), Some(&[0, 2, 3][..]));
        assert_eq!(image.columns[1].value_at(2), KeyValue::int(10));
        assert_eq!(image.position_of(1), 200);
        assert_eq!(image.leaf_range(1), (1, 2));
    }

    #[test]
    fn fixed_stride_elides_positions() {
        let mut image = two_level_image();
        image.stride = Some(64);
        image.positions = None;

        let mut volume = MemoryVolume::new();
        save_image(&image, &mut volume, 0).unwrap();
        let loaded = load_image(&mut volume, 0, &definition()).unwrap();
        assert_eq!(loaded.stride, Some(64));
        assert!(loaded.positions.is_none());
        assert_eq!(loaded.position_of(2), 128);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut volume = MemoryVolume::with_data(vec![0xAAu8; 64]);
        assert!(matches!(
            load_image(&mut volume, 0, &definition()),
            Err(CoreError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let mut volume = MemoryVolume::new();
        save_image(&two_level_image(), &mut volume, 0).unwrap();
        let data = volume.data();
        let mut short = MemoryVolume::with_data(data[..data.len() - 8].to_vec());
        assert!(matches!(
            load_image(&mut short, 0, &definition()),
            Err(CoreError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn wrong_column_count_is_shape_mismatch() {
        let mut volume = MemoryVolume::new();
        save_image(&two_level_image(), &mut volume, 0).unwrap();

        let narrow = IndexDefinition::new(4)
            .unique()
            .column(ColumnSpec::new("a", KeyType::Int64));
        assert!(matches!(
            load_image(&mut volume, 0, &narrow),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn wrong_column_type_is_shape_mismatch() {
        let mut volume = MemoryVolume::new();
        save_image(&two_level_image(), &mut volume, 0).unwrap();

        let other = IndexDefinition::new(4)
            .unique()
            .column(ColumnSpec::new("a", KeyType::Float64))
            .column(ColumnSpec::new("b", KeyType::Int64));
        assert!(matches!(
            load_image(&mut volume, 0, &other),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn id_mismatch_is_tolerated() {
        let mut volume = MemoryVolume::new();
        save_image(&two_level_image(), &mut volume, 0).unwrap();

        let renumbered = IndexDefinition::new(9)
            .unique()
            .column(ColumnSpec::new("a", KeyType::Int64))
            .column(ColumnSpec::new("b", KeyType::Int64));
        let image = load_image(&mut volume, 0, &renumbered).unwrap();
        assert_eq!(image.id, 4);
    }

    #[test]
    fn saved_at_nonzero_offset() {
        let mut volume = MemoryVolume::with_data(vec![0u8; 128]);
        volume.seek(128).unwrap();
        save_image(&two_level_image(), &mut volume, 128).unwrap();
        let image = load_image(&mut volume, 128, &definition()).unwrap();
        assert_eq!(image.row_count, 3);
    }
}
