//! Fetch modes, probe operators and cursor state.

/// How a fetch advances the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// The row located by the last search.
    Eq,
    /// The next row sharing the key of the last delivered row.
    Same,
    /// The first row in key order.
    First,
    /// The row after the last delivered row, in key order.
    Next,
    /// The first row of the first distinct key.
    FstDif,
    /// The first row of the next distinct key.
    NxtDif,
}

/// How a search resolves the installed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    /// Exact match only.
    Eq,
    /// Smallest key not ordered before the probe.
    Ge,
    /// Smallest key ordered after the probe.
    Gt,
}

/// Value comparison for range counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Rows with key below the probe.
    Lt,
    /// Rows with key at or below the probe.
    Le,
    /// Rows with key at or above the probe.
    Ge,
    /// Rows with key above the probe.
    Gt,
}

/// Result of a fetch. Exhaustion and misses are ordinary values here;
/// errors are reserved for structural failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A row was delivered at the given logical position.
    Found {
        /// Logical position of the delivered row.
        position: u64,
    },
    /// The search landed on the row delivered last; the caller's row
    /// buffer is already current.
    DuplicateOfLastRow {
        /// Logical position of the row.
        position: u64,
    },
    /// No row matches the probe exactly.
    NotFound,
    /// The current same-key group is exhausted.
    NoMoreSame,
    /// No rows remain in fetch order.
    EndOfIndex,
}

/// Outcome of the last search, kept until the next one.
#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    /// Operator the search ran with.
    pub op: SearchOp,
    /// Number of leading columns the probe covered.
    pub depth: usize,
    /// Rank at the deepest searched level; the level's distinct count
    /// serves as the past-the-end sentinel.
    pub rank: usize,
    /// Whether every searched level matched exactly.
    pub exact: bool,
    /// Leaf rank range of the located prefix group.
    pub leaf: (usize, usize),
    /// Row range of the located prefix group.
    pub rows: (usize, usize),
}

/// Cursor over an index: the last delivered row plus search state.
///
/// The previous delivered row survives a new search so that a search
/// landing on it can report [`FetchOutcome::DuplicateOfLastRow`].
#[derive(Debug, Default, Clone)]
pub(crate) struct Cursor {
    /// Key-order row index of the last delivered row.
    pub row: Option<usize>,
    /// Leaf rank of the last delivered row.
    pub rank: usize,
    /// Row range of the current same-key group.
    pub group: (usize, usize),
    /// State of the last search, if one has run.
    pub search: Option<SearchState>,
}

impl Cursor {
    pub(crate) fn deliver(&mut self, row: usize, rank: usize, group: (usize, usize)) {
        self.row = Some(row);
        self.rank = rank;
        self.group = group;
    }
}
