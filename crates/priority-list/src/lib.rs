//! # Priority List
//!
//! An ordered container that groups items by integer priority (lower values
//! first) while letting callers control placement inside each priority group.
//! It backs the task scheduler's queue, where items are inserted, reprioritised
//! and dragged around while their handles must stay valid.
//!
//! ## Features
//!
//! - O(log p) insertion point lookup and O(1) head/tail access
//! - Stable [`ItemKey`] handles that survive relocation
//! - Position queries, single-step shifts and absolute repositioning
//! - Filtered window traversals for admission control
//!
//! ## License
//!
//! MIT License

mod list;
mod position;

pub use list::{Entry, Iter, PriorityList, Split};
pub use position::{ItemKey, Position, PositionInfo, ShiftDirection};
