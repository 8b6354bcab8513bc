//! Index definitions.

use crate::error::{CoreError, CoreResult};
use crate::value::KeyType;

/// Specification of one key column within an index.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column name, used for diagnostics only.
    pub name: String,
    /// Element type of the column.
    pub key_type: KeyType,
    /// Sort direction.
    pub ascending: bool,
    /// Optional prefix length truncating textual comparisons.
    pub prefix_len: Option<usize>,
}

impl ColumnSpec {
    /// Creates an ascending column spec.
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            ascending: true,
            prefix_len: None,
        }
    }

    /// Creates a column spec from catalog metadata, rejecting nullable
    /// columns: the engine defines no NULL ordering.
    pub fn from_catalog(
        name: impl Into<String>,
        key_type: KeyType,
        nullable: bool,
    ) -> CoreResult<Self> {
        let name = name.into();
        if nullable {
            return Err(CoreError::NullableKeyColumn { column: name });
        }
        Ok(Self::new(name, key_type))
    }

    /// Makes this column descending.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Truncates textual comparisons to the first `len` bytes.
    #[must_use]
    pub fn prefix(mut self, len: usize) -> Self {
        self.prefix_len = Some(len);
        self
    }

    /// The stored element type after prefix truncation.
    pub(crate) fn effective_type(&self) -> KeyType {
        match (&self.key_type, self.prefix_len) {
            (KeyType::Bytes { width }, Some(p)) => KeyType::Bytes {
                width: (*width).min(p),
            },
            (
                KeyType::Text {
                    width,
                    case_insensitive,
                },
                Some(p),
            ) => KeyType::Text {
                width: (*width).min(p),
                case_insensitive: *case_insensitive,
            },
            (ty, _) => ty.clone(),
        }
    }
}

/// Definition of one index: ordered key columns, uniqueness, numeric id.
///
/// The numeric id selects the slot in a shared index file and is written
/// into the index header; everything else is validated against the file
/// on [`crate::TableIndex::init`].
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Numeric index id.
    pub id: u32,
    /// Whether the index enforces uniqueness of the full key tuple.
    pub unique: bool,
    /// Ordered key columns, coarsest first.
    pub columns: Vec<ColumnSpec>,
}

impl IndexDefinition {
    /// Creates an empty non-unique definition.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            unique: false,
            columns: Vec::new(),
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Appends a key column.
    #[must_use]
    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    /// Number of key columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub(crate) fn check_usable(&self) -> CoreResult<()> {
        if self.columns.is_empty() {
            return Err(CoreError::invalid_argument(
                "index definition has no key columns",
            ));
        }
        for spec in &self.columns {
            if spec.effective_type().width() == 0 {
                return Err(CoreError::invalid_argument(format!(
                    "key column '{}' has zero element width",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let def = IndexDefinition::new(3)
            .unique()
            .column(ColumnSpec::new("a", KeyType::Int64))
            .column(ColumnSpec::new("b", KeyType::Int64).descending());

        assert_eq!(def.id, 3);
        assert!(def.unique);
        assert_eq!(def.column_count(), 2);
        assert!(!def.columns[1].ascending);
    }

    #[test]
    fn nullable_column_rejected() {
        let result = ColumnSpec::from_catalog("maybe", KeyType::Int64, true);
        assert!(matches!(
            result,
            Err(CoreError::NullableKeyColumn { column }) if column == "maybe"
        ));
    }

    #[test]
    fn prefix_truncates_text_width() {
        let spec = ColumnSpec::new(
            "name",
            KeyType::Text {
                width: 64,
                case_insensitive: false,
            },
        )
        .prefix(8);
        assert_eq!(spec.effective_type().width(), 8);
    }

    #[test]
    fn empty_definition_unusable() {
        assert!(IndexDefinition::new(1).check_usable().is_err());
    }
}
