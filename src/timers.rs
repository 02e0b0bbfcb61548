//! Idle-connection timer list.
//!
//! An ascending-expiry doubly-linked list, stored in a slot arena so that
//! links are indices rather than pointers. A connection holds at most one
//! `TimerId`; handles carry a generation stamp, so a handle that outlives
//! its node (for example when the sweep and a close race) is simply
//! ignored instead of touching a recycled slot.
//!
//! Renewal relies on an invariant the callers must uphold: every renewed
//! expiry is `now + fixed offset`, and `now` only advances, so a renewed
//! deadline is never earlier than any deadline already in the list. `renew`
//! therefore detaches the node and re-appends it at the tail in O(1)
//! without comparing expiries.

use std::time::Instant;

/// Stable handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId {
    idx: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node {
    expire: Instant,
    conn: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    node: Option<Node>,
}

/// Ascending-expiry timer list; the head is always the soonest deadline.
#[derive(Debug, Default)]
pub struct TimerList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a timer for `conn` expiring at `expire`, keeping the list
    /// sorted ascending.
    pub fn add(&mut self, conn: u64, expire: Instant) -> TimerId {
        let idx = self.alloc(Node {
            expire,
            conn,
            prev: None,
            next: None,
        });

        match self.head {
            None => {
                self.head = Some(idx);
                self.tail = Some(idx);
            }
            Some(head) => {
                if self.expire_of(head) >= expire {
                    // New soonest deadline becomes the head.
                    self.link_before(idx, head);
                } else {
                    // First node strictly later than the new one, if any.
                    let mut cur = self.next_of(head);
                    while let Some(c) = cur {
                        if self.expire_of(c) > expire {
                            break;
                        }
                        cur = self.next_of(c);
                    }
                    match cur {
                        Some(c) => self.link_before(idx, c),
                        None => self.push_tail(idx),
                    }
                }
            }
        }

        self.len += 1;
        TimerId {
            idx,
            generation: self.slots[idx].generation,
        }
    }

    /// Moves a live timer to the new (monotonically non-decreasing) expiry.
    /// Stale handles are ignored.
    pub fn renew(&mut self, id: TimerId, expire: Instant) {
        if !self.live(id) {
            return;
        }
        if let Some(node) = self.slots[id.idx].node.as_mut() {
            node.expire = expire;
        }
        if self.tail == Some(id.idx) {
            return;
        }
        self.detach(id.idx);
        self.push_tail(id.idx);
    }

    /// Detaches and frees a node wherever it sits. Freed or stale handles
    /// are ignored.
    pub fn remove(&mut self, id: TimerId) {
        if !self.live(id) {
            return;
        }
        self.detach(id.idx);
        self.release(id.idx);
        self.len -= 1;
    }

    /// Pops every node whose expiry is `<= now`, in expiry order, and
    /// returns the connection ids those nodes guarded. Nodes that have not
    /// expired keep their relative order.
    pub fn sweep(&mut self, now: Instant) -> Vec<u64> {
        let mut expired = Vec::new();
        while let Some(head) = self.head {
            if self.expire_of(head) > now {
                break;
            }
            expired.push(self.conn_of(head));
            self.detach(head);
            self.release(head);
            self.len -= 1;
        }
        expired
    }

    /// Connection ids in list order, soonest deadline first.
    pub fn ordered(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(idx) = cur {
            out.push(self.conn_of(idx));
            cur = self.next_of(idx);
        }
        out
    }

    fn live(&self, id: TimerId) -> bool {
        self.slots
            .get(id.idx)
            .map(|s| s.generation == id.generation && s.node.is_some())
            .unwrap_or(false)
    }

    fn expire_of(&self, idx: usize) -> Instant {
        self.slots[idx].node.as_ref().map(|n| n.expire).unwrap()
    }

    fn conn_of(&self, idx: usize) -> u64 {
        self.slots[idx].node.as_ref().map(|n| n.conn).unwrap()
    }

    fn next_of(&self, idx: usize) -> Option<usize> {
        self.slots[idx].node.as_ref().and_then(|n| n.next)
    }

    fn alloc(&mut self, node: Node) -> usize {
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

    fn release(&mut self, idx: usize) {
        self.slots[idx].node = None;
        // Invalidate any handle still pointing at this slot.
        self.slots[idx].generation += 1;
        self.free.push(idx);
    }

    /// Splices `idx` in directly before `next`, patching neighbor links.
    fn link_before(&mut self, idx: usize, next: usize) {
        let prev = self.slots[next].node.as_ref().and_then(|n| n.prev);
        if let Some(node) = self.slots[idx].node.as_mut() {
            node.prev = prev;
            node.next = Some(next);
        }
        if let Some(n) = self.slots[next].node.as_mut() {
            n.prev = Some(idx);
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].node.as_mut() {
                    n.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
    }

    fn push_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.slots[idx].node.as_mut() {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(n) = self.slots[t].node.as_mut() {
                    n.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Unlinks `idx` from wherever it sits without freeing the slot.
    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].node.as_mut() {
            Some(node) => {
                let links = (node.prev, node.next);
                node.prev = None;
                node.next = None;
                links
            }
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].node.as_mut() {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].node.as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}
