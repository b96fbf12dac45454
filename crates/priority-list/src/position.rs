//! Position types shared by list operations.

use std::fmt;

/// Stable handle to an item stored in a [`PriorityList`](crate::PriorityList).
///
/// Handles stay valid across priority changes and relocations. Once the item is
/// removed the handle goes stale and every lookup with it returns `None`, even
/// if the underlying slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Where to place an item inside its priority run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// Ahead of every item sharing the same priority.
    First,
    /// Behind every item sharing the same priority.
    #[default]
    Last,
    /// Zero-based offset within the run. Offsets past the end of the run
    /// behave like [`Position::Last`].
    Index(usize),
}

impl From<usize> for Position {
    fn from(offset: usize) -> Self {
        Position::Index(offset)
    }
}

/// Location of an item in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionInfo {
    /// Absolute zero-based position from the head of the list.
    pub position: usize,
    /// Zero-based offset within the item's priority run.
    pub priority_position: usize,
    /// Priority value of the item.
    pub priority: i64,
}

/// Direction for single-step shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Up,
    Down,
}

impl fmt::Display for ShiftDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftDirection::Up => write!(f, "up"),
            ShiftDirection::Down => write!(f, "down"),
        }
    }
}
