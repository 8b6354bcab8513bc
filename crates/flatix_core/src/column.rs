//! Key columns: one sorted, duplicate-collapsed level of a composite key.

use crate::definition::ColumnSpec;
use crate::error::{CoreError, CoreResult};
use crate::value::{compare_padded, KeyType, KeyValue};
use std::cmp::Ordering;

/// Growable typed arena holding one column's values, indexed by rank.
///
/// All access is bounds-checked through the enum; no raw buffers are
/// shared across components.
#[derive(Debug)]
pub(crate) enum ValueArray {
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bytes { width: usize, data: Vec<u8> },
}

impl ValueArray {
    pub(crate) fn with_capacity(ty: &KeyType, capacity: usize) -> CoreResult<Self> {
        match ty {
            KeyType::Int64 => {
                let mut v = Vec::new();
                v.try_reserve_exact(capacity)
                    .map_err(|_| CoreError::Allocation {
                        requested: capacity,
                    })?;
                Ok(ValueArray::I64(v))
            }
            KeyType::Float64 => {
                let mut v = Vec::new();
                v.try_reserve_exact(capacity)
                    .map_err(|_| CoreError::Allocation {
                        requested: capacity,
                    })?;
                Ok(ValueArray::F64(v))
            }
            KeyType::Bytes { width } | KeyType::Text { width, .. } => {
                let mut data = Vec::new();
                data.try_reserve_exact(capacity * width)
                    .map_err(|_| CoreError::Allocation {
                        requested: capacity,
                    })?;
                Ok(ValueArray::Bytes {
                    width: *width,
                    data,
                })
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ValueArray::I64(v) => v.len(),
            ValueArray::F64(v) => v.len(),
            ValueArray::Bytes { width, data } => data.len() / width,
        }
    }

    /// Appends a value, padding or truncating byte payloads to the
    /// element width (prefix semantics).
    pub(crate) fn push(&mut self, value: &KeyValue) -> CoreResult<()> {
        match (self, value) {
            (ValueArray::I64(v), KeyValue::Int64(x)) => v.push(*x),
            (ValueArray::F64(v), KeyValue::Float64(x)) => v.push(*x),
            (ValueArray::Bytes { width, data }, KeyValue::Bytes(b)) => {
                let take = b.len().min(*width);
                data.extend_from_slice(&b[..take]);
                data.resize(data.len() + (*width - take), 0);
            }
            _ => {
                return Err(CoreError::invalid_argument(
                    "key value type does not match column type",
                ))
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, i: usize) -> KeyValue {
        match self {
            ValueArray::I64(v) => KeyValue::Int64(v[i]),
            ValueArray::F64(v) => KeyValue::Float64(v[i]),
            ValueArray::Bytes { width, data } => {
                KeyValue::Bytes(data[i * width..(i + 1) * width].to_vec())
            }
        }
    }

    pub(crate) fn set(&mut self, i: usize, value: &KeyValue) {
        match (self, value) {
            (ValueArray::I64(v), KeyValue::Int64(x)) => v[i] = *x,
            (ValueArray::F64(v), KeyValue::Float64(x)) => v[i] = *x,
            (ValueArray::Bytes { width, data }, KeyValue::Bytes(b)) => {
                let slot = &mut data[i * *width..(i + 1) * *width];
                for (j, out) in slot.iter_mut().enumerate() {
                    *out = b.get(j).copied().unwrap_or(0);
                }
            }
            _ => {}
        }
    }

    /// Raw (always ascending) slot comparison.
    pub(crate) fn cmp_slots(&self, i: usize, j: usize, case_insensitive: bool) -> Ordering {
        match self {
            ValueArray::I64(v) => v[i].cmp(&v[j]),
            ValueArray::F64(v) => v[i].total_cmp(&v[j]),
            ValueArray::Bytes { width, data } => compare_padded(
                &data[i * width..(i + 1) * width],
                &data[j * width..(j + 1) * width],
                *width,
                case_insensitive,
            ),
        }
    }

    /// Raw comparison of a stored slot against a probe value.
    pub(crate) fn cmp_probe(&self, i: usize, probe: &KeyValue, case_insensitive: bool) -> Ordering {
        match (self, probe) {
            (ValueArray::I64(v), KeyValue::Int64(x)) => v[i].cmp(x),
            (ValueArray::F64(v), KeyValue::Float64(x)) => v[i].total_cmp(x),
            (ValueArray::Bytes { width, data }, KeyValue::Bytes(b)) => compare_padded(
                &data[i * width..(i + 1) * width],
                b,
                *width,
                case_insensitive,
            ),
            // Probe types are validated on installation.
            _ => Ordering::Equal,
        }
    }

    pub(crate) fn move_slot(&mut self, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        match self {
            ValueArray::I64(v) => v[dst] = v[src],
            ValueArray::F64(v) => v[dst] = v[src],
            ValueArray::Bytes { width, data } => {
                let w = *width;
                data.copy_within(src * w..(src + 1) * w, dst * w);
            }
        }
    }

    pub(crate) fn truncate(&mut self, n: usize) {
        match self {
            ValueArray::I64(v) => {
                v.truncate(n);
                v.shrink_to_fit();
            }
            ValueArray::F64(v) => {
                v.truncate(n);
                v.shrink_to_fit();
            }
            ValueArray::Bytes { width, data } => {
                data.truncate(n * *width);
                data.shrink_to_fit();
            }
        }
    }

    /// Serializes all elements at the fixed width, little-endian, with no
    /// inter-element padding.
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ValueArray::I64(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            ValueArray::F64(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_bits().to_le_bytes());
                }
            }
            ValueArray::Bytes { data, .. } => out.extend_from_slice(data),
        }
    }

    /// Rebuilds an array of `n` elements from its serialized form.
    pub(crate) fn decode(ty: &KeyType, n: usize, raw: &[u8]) -> CoreResult<Self> {
        let width = ty.width();
        if raw.len() != n * width {
            return Err(CoreError::corrupt(format!(
                "value array size mismatch: expected {} bytes, got {}",
                n * width,
                raw.len()
            )));
        }
        match ty {
            KeyType::Int64 => Ok(ValueArray::I64(
                raw.chunks_exact(8)
                    .map(|c| i64::from_le_bytes(c.try_into().unwrap_or_default()))
                    .collect(),
            )),
            KeyType::Float64 => Ok(ValueArray::F64(
                raw.chunks_exact(8)
                    .map(|c| f64::from_bits(u64::from_le_bytes(c.try_into().unwrap_or_default())))
                    .collect(),
            )),
            KeyType::Bytes { .. } | KeyType::Text { .. } => Ok(ValueArray::Bytes {
                width,
                data: raw.to_vec(),
            }),
        }
    }
}

/// One key-column level of an index.
///
/// After a build this holds the column's compacted, strictly sorted
/// values, the distinct count `ndf`, the largest duplicate-group size
/// `max_same`, an optional offset array mapping each distinct rank to its
/// row range in the next finer level, and an optional block-summary array
/// for two-tier search.
#[derive(Debug)]
pub struct KeyColumn {
    name: String,
    key_type: KeyType,
    ascending: bool,
    values: ValueArray,
    ndf: usize,
    max_same: usize,
    offsets: Option<Vec<u32>>,
    blocks: Option<ValueArray>,
    search: Option<KeyValue>,
}

impl KeyColumn {
    /// Allocates a column for `capacity` rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Allocation`] if the arena cannot be reserved.
    pub(crate) fn with_capacity(spec: &ColumnSpec, capacity: usize) -> CoreResult<Self> {
        let key_type = spec.effective_type();
        Ok(Self {
            name: spec.name.clone(),
            key_type: key_type.clone(),
            ascending: spec.ascending,
            values: ValueArray::with_capacity(&key_type, capacity)?,
            ndf: 0,
            max_same: 1,
            offsets: None,
            blocks: None,
            search: None,
        })
    }

    pub(crate) fn from_parts(
        name: String,
        key_type: KeyType,
        ascending: bool,
        values: ValueArray,
        ndf: usize,
        max_same: usize,
        offsets: Option<Vec<u32>>,
        blocks: Option<ValueArray>,
    ) -> Self {
        Self {
            name,
            key_type,
            ascending,
            values,
            ndf,
            max_same,
            offsets,
            blocks,
            search: None,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type.
    #[must_use]
    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    /// Sort direction.
    #[must_use]
    pub fn ascending(&self) -> bool {
        self.ascending
    }

    /// Distinct count at this level.
    #[must_use]
    pub fn ndf(&self) -> usize {
        self.ndf
    }

    /// Largest duplicate-group size at this level.
    #[must_use]
    pub fn max_same(&self) -> usize {
        self.max_same
    }

    /// Stored value at the given rank.
    #[must_use]
    pub fn value_at(&self, rank: usize) -> KeyValue {
        self.values.get(rank)
    }

    pub(crate) fn offsets(&self) -> Option<&[u32]> {
        self.offsets.as_deref()
    }

    pub(crate) fn has_blocks(&self) -> bool {
        self.blocks.is_some()
    }

    pub(crate) fn values(&self) -> &ValueArray {
        &self.values
    }

    pub(crate) fn blocks(&self) -> Option<&ValueArray> {
        self.blocks.as_ref()
    }

    pub(crate) fn push_value(&mut self, value: &KeyValue) -> CoreResult<()> {
        self.values.push(value)
    }

    pub(crate) fn set_value(&mut self, i: usize, value: &KeyValue) {
        self.values.set(i, value);
    }

    /// Three-way slot comparison honoring the sort direction.
    pub(crate) fn compare(&self, i: usize, j: usize) -> Ordering {
        let raw = self
            .values
            .cmp_slots(i, j, self.key_type.case_insensitive());
        if self.ascending {
            raw
        } else {
            raw.reverse()
        }
    }

    /// Compares a stored slot against the installed search value, in
    /// comparator order.
    pub(crate) fn compare_search(&self, i: usize) -> CoreResult<Ordering> {
        let probe = self
            .search
            .as_ref()
            .ok_or_else(|| CoreError::invalid_argument("no search value installed"))?;
        let raw = self
            .values
            .cmp_probe(i, probe, self.key_type.case_insensitive());
        Ok(if self.ascending { raw } else { raw.reverse() })
    }

    pub(crate) fn move_slot(&mut self, dst: usize, src: usize) {
        self.values.move_slot(dst, src);
    }

    pub(crate) fn truncate(&mut self, n: usize) {
        self.values.truncate(n);
    }

    pub(crate) fn set_reduced(&mut self, ndf: usize, max_same: usize, offsets: Option<Vec<u32>>) {
        self.ndf = ndf;
        self.max_same = max_same;
        self.offsets = offsets;
    }

    /// Installs a search value for FastFind.
    ///
    /// # Errors
    ///
    /// Returns an error if the value type does not match the column.
    pub(crate) fn install_search(&mut self, value: KeyValue) -> CoreResult<()> {
        if !value.matches_type(&self.key_type) {
            return Err(CoreError::invalid_argument(format!(
                "search value type does not match key column '{}'",
                self.name
            )));
        }
        self.search = Some(value);
        Ok(())
    }

    pub(crate) fn has_search(&self) -> bool {
        self.search.is_some()
    }

    pub(crate) fn clear_search(&mut self) {
        self.search = None;
    }

    /// Populates the block-summary array: one sampled value per
    /// `block_size` consecutive distinct values.
    pub(crate) fn make_blocks(&mut self, block_size: usize) {
        if self.ndf == 0 || block_size == 0 {
            return;
        }
        let count = self.ndf.div_ceil(block_size);
        let mut blocks = match ValueArray::with_capacity(&self.key_type, count) {
            Ok(b) => b,
            Err(_) => return, // blocks are an optimization, skip on pressure
        };
        for b in 0..count {
            let _ = blocks.push(&self.values.get(b * block_size));
        }
        self.blocks = Some(blocks);
    }

    pub(crate) fn set_blocks(&mut self, blocks: Option<ValueArray>) {
        self.blocks = blocks;
    }

    /// Fine binary search for the installed search value within
    /// `[lo, hi)`. Returns the first rank whose value is not below the
    /// probe (which may be `hi`), and whether it matches exactly.
    pub(crate) fn search_window(&self, lo: usize, hi: usize) -> CoreResult<(usize, bool)> {
        let mut lo = lo;
        let mut hi_b = hi;
        while lo < hi_b {
            let mid = lo + (hi_b - lo) / 2;
            if self.compare_search(mid)? == Ordering::Less {
                lo = mid + 1;
            } else {
                hi_b = mid;
            }
        }
        let exact = lo < hi && self.compare_search(lo)? == Ordering::Equal;
        Ok((lo, exact))
    }

    /// Coarse pass over the block-summary array, narrowing the window for
    /// [`search_window`](Self::search_window). Returns `(lo, hi)`.
    pub(crate) fn block_window(&self, block_size: usize) -> CoreResult<(usize, usize)> {
        let blocks = match &self.blocks {
            Some(b) => b,
            None => return Ok((0, self.ndf)),
        };
        let probe = self
            .search
            .as_ref()
            .ok_or_else(|| CoreError::invalid_argument("no search value installed"))?;
        let ci = self.key_type.case_insensitive();

        // First block whose sample is not below the probe.
        let mut lo = 0usize;
        let mut hi = blocks.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let raw = blocks.cmp_probe(mid, probe, ci);
            let ord = if self.ascending { raw } else { raw.reverse() };
            if ord == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        // The target rank lies in the block before the boundary sample,
        // or is the boundary sample itself.
        let start = lo.saturating_sub(1) * block_size;
        let end = if lo < blocks.len() {
            (lo * block_size + 1).min(self.ndf)
        } else {
            self.ndf
        };
        Ok((start, end))
    }
}
