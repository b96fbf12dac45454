//! Arena-backed doubly linked list ordered by priority.
//!
//! Nodes live in a slot vector and link to each other by index. A `BTreeMap`
//! keyed by priority points at the first node of every run, which gives a
//! logarithmic lookup of the insertion point and O(1) access to the head of
//! any priority group.
//!
//! Ordering invariant: walking from the head yields non-decreasing priorities,
//! and all nodes sharing a priority form one contiguous run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::position::{ItemKey, Position, PositionInfo, ShiftDirection};

struct Node<T> {
    value: T,
    priority: i64,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// A single item yielded by list traversals.
#[derive(Debug)]
pub struct Entry<'a, T> {
    pub key: ItemKey,
    pub value: &'a T,
    pub info: PositionInfo,
}

impl<T> Clone for Entry<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Entry<'_, T> {}

/// Result of [`PriorityList::get_split`].
#[derive(Debug)]
pub struct Split<'a, T> {
    /// The first `at` matching items.
    pub head: Vec<Entry<'a, T>>,
    /// Every matching item after the boundary.
    pub tail: Vec<Entry<'a, T>>,
}

/// Priority-grouped doubly linked list.
///
/// Lower priority values sort first. Items sharing a priority keep the order
/// in which they were positioned until they are explicitly relocated.
pub struct PriorityList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    run_heads: BTreeMap<i64, usize>,
    len: usize,
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for PriorityList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|entry| (entry.info.priority, entry.value)))
            .finish()
    }
}

impl<T> PriorityList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            run_heads: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `value` with the given priority.
    ///
    /// `position` is interpreted relative to the run of items that already share
    /// `priority`. When no such run exists a new one is created in front of the
    /// first run with a greater priority, or at the tail.
    pub fn add_item(&mut self, value: T, priority: i64, position: Position) -> ItemKey {
        let idx = self.allocate(Node {
            value,
            priority,
            prev: None,
            next: None,
        });
        let (prev, next) = self.locate(priority, position);
        self.link_between(idx, prev, next);
        self.key_for(idx)
    }

    /// Unlink an item and hand back its value. Stale keys return `None`.
    pub fn remove_item(&mut self, key: ItemKey) -> Option<T> {
        let idx = self.resolve(key)?;
        self.unlink(idx);
        Some(self.release(idx))
    }

    /// Move an item into another priority run.
    ///
    /// This unlinks the node and links it again through the regular insertion
    /// path, so the run placement is recomputed from scratch. The key stays valid.
    pub fn change_priority(&mut self, key: ItemKey, priority: i64, position: Position) -> bool {
        let Some(idx) = self.resolve(key) else {
            return false;
        };
        self.unlink(idx);
        self.node_mut(idx).priority = priority;
        let (prev, next) = self.locate(priority, position);
        self.link_between(idx, prev, next);
        true
    }

    /// Absolute position, run offset and priority of one item.
    ///
    /// This walks the list from the head and is O(n). Use
    /// [`get_item_position_info_map`](Self::get_item_position_info_map) when
    /// positions for many items are needed.
    pub fn get_item_position_info(&self, key: ItemKey) -> Option<PositionInfo> {
        let idx = self.resolve(key)?;
        self.iter()
            .find(|entry| entry.key.index as usize == idx)
            .map(|entry| entry.info)
    }

    /// Positions of every item, computed in a single pass.
    pub fn get_item_position_info_map(&self) -> HashMap<ItemKey, PositionInfo> {
        self.iter().map(|entry| (entry.key, entry.info)).collect()
    }

    /// Swap an item with its predecessor.
    ///
    /// Shifting the head is a no-op. When the predecessor belongs to another
    /// priority run the shift is a no-op unless `allow_priority_change` is set,
    /// in which case the item adopts that priority and becomes the last item of
    /// the preceding run.
    pub fn shift_up(&mut self, key: ItemKey, allow_priority_change: bool) -> bool {
        let Some(idx) = self.resolve(key) else {
            return false;
        };
        let Some(prev) = self.node(idx).prev else {
            return false;
        };
        let priority = self.node(idx).priority;
        let prev_priority = self.node(prev).priority;

        if priority == prev_priority {
            let before = self.node(prev).prev;
            self.unlink(idx);
            self.link_between(idx, before, Some(prev));
            true
        } else if allow_priority_change {
            self.unlink(idx);
            self.node_mut(idx).priority = prev_priority;
            let after = self.node(prev).next;
            self.link_between(idx, Some(prev), after);
            true
        } else {
            false
        }
    }

    /// Swap an item with its successor.
    ///
    /// Mirror image of [`shift_up`](Self::shift_up): shifting the tail is a
    /// no-op, and crossing into the next run requires `allow_priority_change`,
    /// which makes the item the first of that run.
    pub fn shift_down(&mut self, key: ItemKey, allow_priority_change: bool) -> bool {
        let Some(idx) = self.resolve(key) else {
            return false;
        };
        let Some(next) = self.node(idx).next else {
            return false;
        };
        let priority = self.node(idx).priority;
        let next_priority = self.node(next).priority;

        if priority == next_priority {
            let after = self.node(next).next;
            self.unlink(idx);
            self.link_between(idx, Some(next), after);
            true
        } else if allow_priority_change {
            self.unlink(idx);
            self.node_mut(idx).priority = next_priority;
            let before = self.node(next).prev;
            self.link_between(idx, before, Some(next));
            true
        } else {
            false
        }
    }

    /// Shift in the given direction.
    pub fn shift(
        &mut self,
        key: ItemKey,
        direction: ShiftDirection,
        allow_priority_change: bool,
    ) -> bool {
        match direction {
            ShiftDirection::Up => self.shift_up(key, allow_priority_change),
            ShiftDirection::Down => self.shift_down(key, allow_priority_change),
        }
    }

    /// Move an item to an absolute position, picking a priority that keeps the
    /// list ordered.
    ///
    /// The item is spliced in front of the node currently at `desired_position`
    /// (ignoring the item itself). Between two runs the item joins whichever
    /// neighbouring priority is closer to `priority_hint`. Without a hint it uses
    /// the item's current priority. A hint that falls strictly between the two
    /// neighbours is used as is and forms a new run. Positions past the tail
    /// append the item.
    pub fn insert_item_at_position(
        &mut self,
        key: ItemKey,
        desired_position: usize,
        priority_hint: Option<i64>,
    ) -> bool {
        let Some(idx) = self.resolve(key) else {
            return false;
        };
        let current = self.node(idx).priority;
        self.unlink(idx);

        let at = self.nth(desired_position);
        let prev = match at {
            Some(at) => self.node(at).prev,
            None => self.tail,
        };
        let lower = prev.map(|p| self.node(p).priority);
        let upper = at.map(|a| self.node(a).priority);
        let priority = choose_priority(lower, upper, current, priority_hint);

        self.node_mut(idx).priority = priority;
        self.link_between(idx, prev, at);
        true
    }

    /// Split matching items at the `at`-th match.
    ///
    /// Items rejected by `filter` appear in neither half.
    pub fn get_split<F>(&self, at: usize, mut filter: F) -> Split<'_, T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut split = Split {
            head: Vec::with_capacity(at.min(self.len)),
            tail: Vec::new(),
        };
        for entry in self.iter().filter(|entry| filter(entry.value)) {
            if split.head.len() < at {
                split.head.push(entry);
            } else {
                split.tail.push(entry);
            }
        }
        split
    }

    /// The first `count` items accepted by `filter`.
    pub fn get_first_x_items<F>(&self, count: usize, mut filter: F) -> Vec<Entry<'_, T>>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter()
            .filter(|entry| filter(entry.value))
            .take(count)
            .collect()
    }

    /// Items at absolute position `start` or later that are accepted by `filter`.
    pub fn get_items_from<F>(&self, start: usize, mut filter: F) -> Vec<Entry<'_, T>>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter()
            .skip(start)
            .filter(|entry| filter(entry.value))
            .collect()
    }

    pub fn get(&self, key: ItemKey) -> Option<&T> {
        let idx = self.resolve(key)?;
        Some(&self.node(idx).value)
    }

    pub fn get_mut(&mut self, key: ItemKey) -> Option<&mut T> {
        let idx = self.resolve(key)?;
        Some(&mut self.node_mut(idx).value)
    }

    pub fn priority_of(&self, key: ItemKey) -> Option<i64> {
        let idx = self.resolve(key)?;
        Some(self.node(idx).priority)
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.resolve(key).is_some()
    }

    /// First item of the list.
    pub fn head(&self) -> Option<(ItemKey, &T)> {
        self.head.map(|idx| (self.key_for(idx), &self.node(idx).value))
    }

    /// Last item of the list.
    pub fn tail(&self) -> Option<(ItemKey, &T)> {
        self.tail.map(|idx| (self.key_for(idx), &self.node(idx).value))
    }

    /// First item of the given priority run.
    pub fn head_of_priority(&self, priority: i64) -> Option<(ItemKey, &T)> {
        self.run_heads
            .get(&priority)
            .map(|&idx| (self.key_for(idx), &self.node(idx).value))
    }

    /// Distinct priorities currently present, ascending.
    pub fn priorities(&self) -> impl Iterator<Item = i64> + '_ {
        self.run_heads.keys().copied()
    }

    /// In-order traversal.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            position: 0,
            priority_position: 0,
            current_priority: None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = ItemKey> + '_ {
        self.iter().map(|entry| entry.key)
    }

    /// Remove every item rejected by `keep`, returning the removed values in
    /// list order.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let doomed: Vec<ItemKey> = self
            .iter()
            .filter(|entry| !keep(entry.value))
            .map(|entry| entry.key)
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| self.remove_item(key))
            .collect()
    }

    /// Remove every item, returning the values in list order.
    pub fn drain(&mut self) -> Vec<T> {
        let keys: Vec<ItemKey> = self.keys().collect();
        keys.into_iter()
            .filter_map(|key| self.remove_item(key))
            .collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.run_heads.clear();
        self.len = 0;
    }

    // Internal plumbing

    fn node(&self, idx: usize) -> &Node<T> {
        match self.slots[idx].node.as_ref() {
            Some(node) => node,
            None => unreachable!("linked index {idx} points at an empty slot"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<T> {
        match self.slots[idx].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked index {idx} points at an empty slot"),
        }
    }

    fn key_for(&self, idx: usize) -> ItemKey {
        ItemKey {
            index: idx as u32,
            generation: self.slots[idx].generation,
        }
    }

    fn resolve(&self, key: ItemKey) -> Option<usize> {
        let idx = key.index as usize;
        let slot = self.slots.get(idx)?;
        (slot.generation == key.generation && slot.node.is_some()).then_some(idx)
    }

    fn allocate(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx].node = Some(node);
                idx
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> T {
        let slot = &mut self.slots[idx];
        slot.generation = slot.generation.wrapping_add(1);
        let node = match slot.node.take() {
            Some(node) => node,
            None => unreachable!("released index {idx} was already empty"),
        };
        self.free.push(idx);
        node.value
    }

    fn nth(&self, n: usize) -> Option<usize> {
        let mut cursor = self.head;
        for _ in 0..n {
            cursor = self.node(cursor?).next;
        }
        cursor
    }

    /// Neighbours between which a node of `priority` belongs.
    fn locate(&self, priority: i64, position: Position) -> (Option<usize>, Option<usize>) {
        let Some((&run_priority, &run_head)) = self.run_heads.range(priority..).next() else {
            return (self.tail, None);
        };

        if run_priority != priority {
            return (self.node(run_head).prev, Some(run_head));
        }

        let offset = match position {
            Position::First => 0,
            Position::Last => usize::MAX,
            Position::Index(offset) => offset,
        };

        let mut prev = self.node(run_head).prev;
        let mut cursor = Some(run_head);
        let mut walked = 0;
        while walked < offset {
            match cursor {
                Some(idx) if self.node(idx).priority == priority => {
                    prev = Some(idx);
                    cursor = self.node(idx).next;
                    walked += 1;
                }
                _ => break,
            }
        }
        (prev, cursor)
    }

    /// Splice a detached node between `prev` and `next`.
    ///
    /// Callers guarantee that the node's priority keeps the ordering invariant.
    fn link_between(&mut self, idx: usize, prev: Option<usize>, next: Option<usize>) {
        {
            let node = self.node_mut(idx);
            node.prev = prev;
            node.next = next;
        }
        match prev {
            Some(p) => self.node_mut(p).next = Some(idx),
            None => self.head = Some(idx),
        }
        match next {
            Some(n) => self.node_mut(n).prev = Some(idx),
            None => self.tail = Some(idx),
        }

        let priority = self.node(idx).priority;
        let starts_run = prev.is_none_or(|p| self.node(p).priority != priority);
        if starts_run {
            self.run_heads.insert(priority, idx);
        }
        self.len += 1;
    }

    /// Detach a node from its neighbours, keeping its slot.
    fn unlink(&mut self, idx: usize) {
        let (prev, next, priority) = {
            let node = self.node(idx);
            (node.prev, node.next, node.priority)
        };

        if self.run_heads.get(&priority) == Some(&idx) {
            match next {
                Some(n) if self.node(n).priority == priority => {
                    self.run_heads.insert(priority, n);
                }
                _ => {
                    self.run_heads.remove(&priority);
                }
            }
        }

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
        self.len -= 1;
    }
}

/// Pick a priority for a node spliced between neighbours of priority `lower`
/// and `upper` (either may be absent at the list boundaries).
fn choose_priority(lower: Option<i64>, upper: Option<i64>, current: i64, hint: Option<i64>) -> i64 {
    let wanted = hint.unwrap_or(current);
    match (lower, upper) {
        (None, None) => wanted,
        (Some(lo), None) => wanted.max(lo),
        (None, Some(hi)) => wanted.min(hi),
        (Some(lo), Some(hi)) => {
            if hint.is_some() && (lo..=hi).contains(&wanted) {
                wanted
            } else if wanted.abs_diff(lo) < wanted.abs_diff(hi) {
                lo
            } else {
                hi
            }
        }
    }
}

/// In-order iterator over a [`PriorityList`].
pub struct Iter<'a, T> {
    list: &'a PriorityList<T>,
    cursor: Option<usize>,
    position: usize,
    priority_position: usize,
    current_priority: Option<i64>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = Entry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.node(idx);

        if self.current_priority != Some(node.priority) {
            self.current_priority = Some(node.priority);
            self.priority_position = 0;
        }

        let entry = Entry {
            key: self.list.key_for(idx),
            value: &node.value,
            info: PositionInfo {
                position: self.position,
                priority_position: self.priority_position,
                priority: node.priority,
            },
        };

        self.cursor = node.next;
        self.position += 1;
        self.priority_position += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len - self.position;
        (remaining, Some(remaining))
    }
}

impl<'a, T> IntoIterator for &'a PriorityList<T> {
    type Item = Entry<'a, T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order<T: Copy>(list: &PriorityList<T>) -> Vec<T> {
        list.iter().map(|entry| *entry.value).collect()
    }

    fn assert_ordered<T>(list: &PriorityList<T>) {
        let priorities: Vec<i64> = list.iter().map(|e| e.info.priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]), "{priorities:?}");
    }

    #[test]
    fn test_empty_list() {
        let list: PriorityList<u32> = PriorityList::new();
        assert!(list.is_empty());
        assert!(list.head().is_none());
        assert!(list.tail().is_none());
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_add_orders_by_priority_then_position() {
        let mut list = PriorityList::new();
        list.add_item('a', 1, Position::Last);
        list.add_item('b', 2, Position::Last);
        list.add_item('c', 1, Position::First);
        assert_eq!(order(&list), vec!['c', 'a', 'b']);

        list.add_item('d', 0, Position::Last);
        list.add_item('e', 1, Position::Index(1));
        assert_eq!(order(&list), vec!['d', 'c', 'e', 'a', 'b']);
        assert_ordered(&list);
    }

    #[test]
    fn test_index_past_run_end_appends_to_run() {
        let mut list = PriorityList::new();
        list.add_item(1, 1, Position::Last);
        list.add_item(2, 3, Position::Last);
        list.add_item(3, 1, Position::Index(10));
        assert_eq!(order(&list), vec![1, 3, 2]);
    }

    #[test]
    fn test_change_priority_example() {
        let mut list = PriorityList::new();
        let a = list.add_item('A', 1, Position::Last);
        let b = list.add_item('B', 2, Position::Last);
        let c = list.add_item('C', 1, Position::First);
        assert_eq!(order(&list), vec!['C', 'A', 'B']);

        assert!(list.change_priority(b, 1, Position::Last));
        assert_eq!(order(&list), vec!['C', 'A', 'B']);

        let info = list.get_item_position_info(b).unwrap();
        assert_eq!(info.priority, 1);
        assert_eq!(info.priority_position, 2);
        assert_eq!(info.position, 2);
        assert_eq!(list.get_item_position_info(c).unwrap().priority_position, 0);
        assert_eq!(list.get_item_position_info(a).unwrap().priority_position, 1);
    }

    #[test]
    fn test_remove_updates_boundaries() {
        let mut list = PriorityList::new();
        let only = list.add_item(7, 5, Position::Last);
        assert_eq!(list.remove_item(only), Some(7));
        assert!(list.is_empty());
        assert!(list.head().is_none());
        assert!(list.priorities().next().is_none());

        let a = list.add_item(1, 1, Position::Last);
        let b = list.add_item(2, 1, Position::Last);
        let c = list.add_item(3, 2, Position::Last);
        assert_eq!(list.remove_item(a), Some(1));
        assert_eq!(list.head_of_priority(1).map(|(k, _)| k), Some(b));
        assert_eq!(list.remove_item(c), Some(3));
        assert_eq!(list.tail().map(|(k, _)| k), Some(b));
        assert_eq!(list.priorities().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_stale_key_is_rejected() {
        let mut list = PriorityList::new();
        let a = list.add_item("a", 1, Position::Last);
        list.remove_item(a);
        let b = list.add_item("b", 1, Position::Last);
        assert_eq!(a.index, b.index);
        assert!(list.get(a).is_none());
        assert!(!list.change_priority(a, 3, Position::First));
        assert_eq!(list.get(b), Some(&"b"));
    }

    #[test]
    fn test_shift_within_run() {
        let mut list = PriorityList::new();
        let a = list.add_item('a', 1, Position::Last);
        let b = list.add_item('b', 1, Position::Last);
        let c = list.add_item('c', 1, Position::Last);

        assert!(list.shift_up(b, false));
        assert_eq!(order(&list), vec!['b', 'a', 'c']);
        assert_eq!(list.head_of_priority(1).map(|(k, _)| k), Some(b));

        assert!(list.shift_down(a, false));
        assert_eq!(order(&list), vec!['b', 'c', 'a']);
        assert_eq!(list.tail().map(|(k, _)| k), Some(a));
        let _ = c;
    }

    #[test]
    fn test_shift_boundaries_are_noops() {
        let mut list = PriorityList::new();
        let a = list.add_item('a', 1, Position::Last);
        let b = list.add_item('b', 2, Position::Last);

        assert!(!list.shift_up(a, true));
        assert!(!list.shift_down(b, true));
        assert!(!list.shift_down(a, false));
        assert!(!list.shift_up(b, false));
        assert_eq!(order(&list), vec!['a', 'b']);
        assert_eq!(list.priority_of(a), Some(1));
        assert_eq!(list.priority_of(b), Some(2));
    }

    #[test]
    fn test_shift_across_runs_changes_priority() {
        let mut list = PriorityList::new();
        let a = list.add_item('a', 1, Position::Last);
        let b = list.add_item('b', 2, Position::Last);
        let c = list.add_item('c', 2, Position::Last);

        assert!(list.shift_up(b, true));
        assert_eq!(order(&list), vec!['a', 'b', 'c']);
        assert_eq!(list.priority_of(b), Some(1));
        assert_eq!(list.head_of_priority(2).map(|(k, _)| k), Some(c));

        assert!(list.shift_up(b, false));
        assert_eq!(order(&list), vec!['b', 'a', 'c']);

        assert!(list.shift_down(a, true));
        assert_eq!(list.priority_of(a), Some(2));
        assert_eq!(list.head_of_priority(2).map(|(k, _)| k), Some(a));
        assert_ordered(&list);
    }

    #[test]
    fn test_insert_at_position_between_runs() {
        let mut list = PriorityList::new();
        let a = list.add_item('a', 1, Position::Last);
        let b = list.add_item('b', 1, Position::Last);
        let c = list.add_item('c', 5, Position::Last);
        let d = list.add_item('d', 5, Position::Last);

        // A hint strictly between the neighbours forms its own run.
        assert!(list.insert_item_at_position(d, 2, Some(4)));
        assert_eq!(order(&list), vec!['a', 'b', 'd', 'c']);
        assert_eq!(list.priority_of(d), Some(4));

        // Without a hint the item's own priority decides.
        assert!(list.insert_item_at_position(a, 1, None));
        assert_eq!(order(&list), vec!['b', 'a', 'd', 'c']);
        assert_eq!(list.priority_of(a), Some(1));

        // Past the tail the item is appended and keeps an ordered priority.
        assert!(list.insert_item_at_position(b, 99, None));
        assert_eq!(order(&list), vec!['a', 'd', 'c', 'b']);
        assert_eq!(list.priority_of(b), Some(5));

        // At the head a larger priority is clamped down to the head's run.
        assert!(list.insert_item_at_position(c, 0, None));
        assert_eq!(order(&list), vec!['c', 'a', 'd', 'b']);
        assert_eq!(list.priority_of(c), Some(1));
        assert_ordered(&list);
    }

    #[test]
    fn test_insert_at_position_picks_closer_neighbour() {
        let mut list = PriorityList::new();
        list.add_item('a', 0, Position::Last);
        list.add_item('b', 10, Position::Last);
        let c = list.add_item('c', 10, Position::Last);

        assert!(list.insert_item_at_position(c, 1, Some(20)));
        assert_eq!(order(&list), vec!['a', 'c', 'b']);
        assert_eq!(list.priority_of(c), Some(10));
        assert_eq!(list.head_of_priority(10).map(|(k, _)| k), Some(c));

        assert!(list.insert_item_at_position(c, 1, Some(-3)));
        assert_eq!(list.priority_of(c), Some(0));
        assert_eq!(order(&list), vec!['a', 'c', 'b']);
    }

    #[test]
    fn test_position_info_is_idempotent() {
        let mut list = PriorityList::new();
        list.add_item(1, 1, Position::Last);
        let b = list.add_item(2, 2, Position::Last);
        list.add_item(3, 2, Position::First);

        let first = list.get_item_position_info(b);
        let second = list.get_item_position_info(b);
        assert_eq!(first, second);
        assert_eq!(
            first,
            Some(PositionInfo {
                position: 2,
                priority_position: 1,
                priority: 2
            })
        );
        assert_eq!(list.get_item_position_info_map().get(&b).copied(), first);
    }

    #[test]
    fn test_split_and_windows() {
        let mut list = PriorityList::new();
        for (value, priority) in [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3)] {
            list.add_item(value, priority, Position::Last);
        }

        let split = list.get_split(2, |v| v % 2 == 1);
        let head: Vec<i32> = split.head.iter().map(|e| *e.value).collect();
        let tail: Vec<i32> = split.tail.iter().map(|e| *e.value).collect();
        assert_eq!(head, vec![1, 3]);
        assert_eq!(tail, vec![5]);

        let first: Vec<i32> = list
            .get_first_x_items(3, |_| true)
            .iter()
            .map(|e| *e.value)
            .collect();
        assert_eq!(first, vec![1, 2, 3]);

        let from: Vec<i32> = list
            .get_items_from(3, |_| true)
            .iter()
            .map(|e| *e.value)
            .collect();
        assert_eq!(from, vec![4, 5]);
    }

    #[test]
    fn test_retain_and_drain() {
        let mut list = PriorityList::new();
        for value in 0..6 {
            list.add_item(value, value % 3, Position::Last);
        }
        let removed = list.retain(|v| v % 2 == 0);
        assert_eq!(removed, vec![3, 1, 5]);
        assert_eq!(order(&list), vec![0, 4, 2]);
        assert_ordered(&list);

        assert_eq!(list.drain(), vec![0, 4, 2]);
        assert!(list.is_empty());
    }
}
