//! # Ordered Lists
//!
//! Index-linked, sentinel-terminated doubly linked lists over a fixed arena.
//!
//! The arena owns one link record per item slot (a task or a message) and a
//! head/tail sentinel pair per list. An item is linked into at most one list
//! of its arena at a time; moving it between lists relinks indices and never
//! copies or reallocates the item itself.
//!
//! ```text
//!   HEAD ⇄ item 3 ⇄ item 0 ⇄ item 5 ⇄ TAIL      list is empty ⇔ HEAD.next == TAIL
//! ```
//!
//! Sorted insertion is a linear scan from the head that places the new item
//! before the first item with a strictly greater key, so items with equal
//! keys keep their arrival order.
//!
//! All relinking must happen with interrupts masked: the tick handler
//! mutates the same lists from interrupt context.

/// A position in a list: one of the two sentinels, or an item slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pos {
    Head,
    Tail,
    Item(usize),
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: Pos,
    next: Pos,
}

impl Link {
    const UNLINKED: Link = Link {
        prev: Pos::Head,
        next: Pos::Tail,
    };
}

/// Handle to one list of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListId(pub usize);

/// `ITEMS` linkable slots shared by `LISTS` independent lists.
pub struct LinkArena<const ITEMS: usize, const LISTS: usize> {
    links: [Link; ITEMS],
    /// Successor of each list's head sentinel.
    heads: [Pos; LISTS],
    /// Predecessor of each list's tail sentinel.
    tails: [Pos; LISTS],
}

impl<const ITEMS: usize, const LISTS: usize> LinkArena<ITEMS, LISTS> {
    pub const fn new() -> Self {
        Self {
            links: [Link::UNLINKED; ITEMS],
            heads: [Pos::Tail; LISTS],
            tails: [Pos::Head; LISTS],
        }
    }

    /// Unlink everything. Items are not touched, only forgotten.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn is_empty(&self, list: ListId) -> bool {
        self.heads[list.0] == Pos::Tail
    }

    /// Item right after the head sentinel.
    #[inline]
    pub fn first(&self, list: ListId) -> Option<usize> {
        match self.heads[list.0] {
            Pos::Item(i) => Some(i),
            _ => None,
        }
    }

    /// Item following `item` in `list`.
    pub fn next(&self, item: usize) -> Option<usize> {
        match self.links[item].next {
            Pos::Item(i) => Some(i),
            _ => None,
        }
    }

    /// Number of items in `list`. Walks the list.
    pub fn len(&self, list: ListId) -> usize {
        self.iter(list).count()
    }

    pub fn iter(&self, list: ListId) -> Iter<'_, ITEMS, LISTS> {
        Iter {
            arena: self,
            cursor: self.first(list),
        }
    }

    /// Whether `item` is linked into `list`. Walks the list.
    pub fn contains(&self, list: ListId, item: usize) -> bool {
        self.iter(list).any(|i| i == item)
    }

    /// Link `item` after the last item of `list`.
    pub fn append(&mut self, list: ListId, item: usize) {
        self.link_before(list, Pos::Tail, item);
    }

    /// Link `item` before the first item whose key is strictly greater.
    pub fn insert_sorted<F>(&mut self, list: ListId, item: usize, key: F)
    where
        F: Fn(usize) -> u32,
    {
        let new_key = key(item);
        let mut at = self.heads[list.0];
        while let Pos::Item(i) = at {
            if new_key < key(i) {
                break;
            }
            at = self.links[i].next;
        }
        self.link_before(list, at, item);
    }

    /// Unlink `item` from `list`. The caller guarantees membership.
    pub fn remove(&mut self, list: ListId, item: usize) {
        let Link { prev, next } = self.links[item];
        match prev {
            Pos::Item(p) => self.links[p].next = next,
            _ => self.heads[list.0] = next,
        }
        match next {
            Pos::Item(n) => self.links[n].prev = prev,
            _ => self.tails[list.0] = prev,
        }
        self.links[item] = Link::UNLINKED;
    }

    /// Unlink and return the first item of `list`.
    pub fn remove_first(&mut self, list: ListId) -> Option<usize> {
        let first = self.first(list)?;
        self.remove(list, first);
        Some(first)
    }

    /// Move `item` from `from` to the back of `to`.
    pub fn move_back(&mut self, item: usize, from: ListId, to: ListId) {
        self.remove(from, item);
        self.append(to, item);
    }

    /// Move `item` from `from` into `to`, sorted by `key`.
    pub fn move_sorted<F>(&mut self, item: usize, from: ListId, to: ListId, key: F)
    where
        F: Fn(usize) -> u32,
    {
        self.remove(from, item);
        self.insert_sorted(to, item, key);
    }

    fn link_before(&mut self, list: ListId, at: Pos, item: usize) {
        let prev = match at {
            Pos::Item(i) => self.links[i].prev,
            _ => self.tails[list.0],
        };
        self.links[item] = Link { prev, next: at };
        match prev {
            Pos::Item(p) => self.links[p].next = Pos::Item(item),
            _ => self.heads[list.0] = Pos::Item(item),
        }
        match at {
            Pos::Item(i) => self.links[i].prev = Pos::Item(item),
            _ => self.tails[list.0] = Pos::Item(item),
        }
    }
}

pub struct Iter<'a, const ITEMS: usize, const LISTS: usize> {
    arena: &'a LinkArena<ITEMS, LISTS>,
    cursor: Option<usize>,
}

impl<const ITEMS: usize, const LISTS: usize> Iterator for Iter<'_, ITEMS, LISTS> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.cursor?;
        self.cursor = self.arena.next(current);
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const A: ListId = ListId(0);
    const B: ListId = ListId(1);

    fn collect<const I: usize, const L: usize>(arena: &LinkArena<I, L>, list: ListId) -> Vec<usize> {
        arena.iter(list).collect()
    }

    #[test]
    fn test_empty_list() {
        let arena: LinkArena<4, 2> = LinkArena::new();
        assert!(arena.is_empty(A));
        assert_eq!(arena.first(A), None);
        assert_eq!(arena.len(A), 0);
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let mut arena: LinkArena<4, 2> = LinkArena::new();
        arena.append(A, 2);
        arena.append(A, 0);
        arena.append(A, 3);
        assert_eq!(collect(&arena, A), vec![2, 0, 3]);
        assert_eq!(arena.len(A), 3);
    }

    #[test]
    fn test_insert_sorted_is_stable() {
        let keys = [50u32, 10, 50, 30, 10];
        let mut arena: LinkArena<5, 1> = LinkArena::new();
        for i in 0..keys.len() {
            arena.insert_sorted(A, i, |n| keys[n]);
        }
        // Equal keys stay in insertion order: 1 before 4, 0 before 2.
        assert_eq!(collect(&arena, A), vec![1, 4, 3, 0, 2]);
    }

    #[test]
    fn test_remove_arbitrary_item() {
        let mut arena: LinkArena<4, 2> = LinkArena::new();
        for i in 0..4 {
            arena.append(A, i);
        }
        arena.remove(A, 2);
        assert_eq!(collect(&arena, A), vec![0, 1, 3]);
        arena.remove(A, 0);
        arena.remove(A, 3);
        assert_eq!(collect(&arena, A), vec![1]);
        arena.remove(A, 1);
        assert!(arena.is_empty(A));
    }

    #[test]
    fn test_remove_first() {
        let mut arena: LinkArena<3, 1> = LinkArena::new();
        arena.append(A, 1);
        arena.append(A, 2);
        assert_eq!(arena.remove_first(A), Some(1));
        assert_eq!(arena.remove_first(A), Some(2));
        assert_eq!(arena.remove_first(A), None);
    }

    #[test]
    fn test_move_between_lists() {
        let keys = [5u32, 1, 3];
        let mut arena: LinkArena<3, 2> = LinkArena::new();
        arena.append(A, 0);
        arena.append(A, 1);
        arena.append(B, 2);

        arena.move_sorted(0, A, B, |n| keys[n]);
        assert_eq!(collect(&arena, A), vec![1]);
        assert_eq!(collect(&arena, B), vec![2, 0]);

        arena.move_back(1, A, B);
        assert!(arena.is_empty(A));
        assert_eq!(collect(&arena, B), vec![2, 0, 1]);
        assert!(arena.contains(B, 1));
        assert!(!arena.contains(A, 1));
    }

    #[test]
    fn test_lists_are_independent() {
        let mut arena: LinkArena<4, 2> = LinkArena::new();
        arena.append(A, 0);
        arena.append(B, 1);
        arena.append(A, 2);
        arena.remove(A, 0);
        assert_eq!(collect(&arena, A), vec![2]);
        assert_eq!(collect(&arena, B), vec![1]);
    }
}
