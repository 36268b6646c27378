//! Call records and the arena that owns them
//!
//! A frame is the saved invocation context of one resumable function. Frames
//! form a single chain: each one owns at most one child, and points back at
//! its parent by index only. The arena hands out [`FrameId`]s and recycles
//! freed entries.

use crate::slots::Slots;
use crate::step::Step;
use std::fmt;

/// Index of a frame in the arena
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Saved invocation context of one resumable function
#[derive(Debug, Clone)]
pub struct Frame {
    /// Function identity; equality decides resume vs replace
    pub name: String,
    /// Step to dispatch on when the function is re-entered
    pub current_step: Step,
    /// Step to advance to once the child completes
    pub next_step: Step,
    /// Pending absolute wake time (clock milliseconds)
    pub wake_at: Option<u64>,
    /// Persisted variables
    pub slots: Slots,
    /// Non-owning back link
    pub parent: Option<FrameId>,
    /// Owned child, at most one
    pub child: Option<FrameId>,
}

impl Frame {
    /// Create a fresh frame at `first_step`
    pub fn new(name: &str, first_step: Step, parent: Option<FrameId>) -> Self {
        Self {
            name: name.to_string(),
            current_step: first_step,
            next_step: Step::IDLE,
            wake_at: None,
            slots: Slots::default(),
            parent,
            child: None,
        }
    }
}

/// Fixed-capacity store of frames
#[derive(Debug)]
pub struct FrameArena {
    entries: Vec<Option<Frame>>,
    free: Vec<usize>,
    live: usize,
    capacity: usize,
}

impl FrameArena {
    /// Create an arena that holds at most `capacity` live frames
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
            capacity,
        }
    }

    /// Maximum number of live frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live frames
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check for no live frames
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Check whether one more frame fits
    pub fn has_room(&self) -> bool {
        self.live < self.capacity
    }

    /// Store a frame, returning `None` when the arena is full
    pub fn insert(&mut self, frame: Frame) -> Option<FrameId> {
        if !self.has_room() {
            return None;
        }
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(frame);
                Some(FrameId(index))
            }
            None => {
                self.entries.push(Some(frame));
                Some(FrameId(self.entries.len() - 1))
            }
        }
    }

    /// Borrow a live frame
    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.entries.get(id.0).and_then(|entry| entry.as_ref())
    }

    /// Mutably borrow a live frame
    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.entries.get_mut(id.0).and_then(|entry| entry.as_mut())
    }

    /// Free a frame and everything below it
    ///
    /// Returns the names of the freed frames, outermost first.
    pub fn remove_subtree(&mut self, id: FrameId) -> Vec<String> {
        let mut removed = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let Some(frame) = self.entries.get_mut(current.0).and_then(Option::take) else {
                break;
            };
            self.live -= 1;
            self.free.push(current.0);
            next = frame.child;
            removed.push(frame.name);
        }
        removed
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free.clear();
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_respects_capacity() {
        let mut arena = FrameArena::new(2);
        assert!(arena.insert(Frame::new("a", Step::new(1), None)).is_some());
        assert!(arena.insert(Frame::new("b", Step::new(1), None)).is_some());
        assert!(arena.insert(Frame::new("c", Step::new(1), None)).is_none());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_remove_subtree_frees_descendants() {
        let mut arena = FrameArena::new(4);
        let root = arena.insert(Frame::new("root", Step::new(1), None)).unwrap();
        let mid = arena.insert(Frame::new("mid", Step::new(1), Some(root))).unwrap();
        let leaf = arena.insert(Frame::new("leaf", Step::new(1), Some(mid))).unwrap();
        arena.get_mut(root).unwrap().child = Some(mid);
        arena.get_mut(mid).unwrap().child = Some(leaf);

        let removed = arena.remove_subtree(mid);
        assert_eq!(removed, vec!["mid".to_string(), "leaf".to_string()]);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(mid).is_none());
        assert!(arena.get(leaf).is_none());
        assert!(arena.get(root).is_some());
    }

    #[test]
    fn test_freed_entries_are_reused() {
        let mut arena = FrameArena::new(2);
        let a = arena.insert(Frame::new("a", Step::new(1), None)).unwrap();
        arena.remove_subtree(a);
        let b = arena.insert(Frame::new("b", Step::new(1), None)).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.get(b).unwrap().name, "b");
    }
}
