//! Intrusive index queues
//!
//! The ready, wait and zombie lists are FIFO queues threaded through the
//! process table itself: each slot carries `next`/`prev` indices and a tag
//! naming the queue it is on. The tag makes "a process is in at most one
//! queue" checkable on every push and remove.

/// Which queue a slot is linked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueId {
    /// Runnable processes
    Ready,
    /// Sleepers, keyed by their event
    Wait,
    /// Exited processes awaiting reap
    Zombie,
}

/// Per-slot linkage embedded in the process table
#[derive(Debug, Clone, Copy, Default)]
pub struct Links {
    next: Option<u16>,
    prev: Option<u16>,
    which: Option<QueueId>,
}

impl Links {
    pub const fn new() -> Self {
        Self {
            next: None,
            prev: None,
            which: None,
        }
    }

    /// Queue this slot is currently linked on, if any
    pub fn which(&self) -> Option<QueueId> {
        self.which
    }
}

/// Anything holding queue linkage (the process table slot)
pub trait Linked {
    fn links(&self) -> &Links;
    fn links_mut(&mut self) -> &mut Links;
}

/// A FIFO over table slots
pub struct Queue {
    id: QueueId,
    head: Option<u16>,
    tail: Option<u16>,
}

impl Queue {
    pub const fn new(id: QueueId) -> Self {
        Self {
            id,
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Slot at the head, without removing it
    pub fn front(&self) -> Option<usize> {
        self.head.map(|i| i as usize)
    }

    /// Successor of `idx` on this queue (for walking)
    pub fn next<P: Linked>(&self, slots: &[P], idx: usize) -> Option<usize> {
        debug_assert_eq!(slots[idx].links().which, Some(self.id));
        slots[idx].links().next.map(|i| i as usize)
    }

    /// Is `idx` linked on this queue?
    pub fn contains<P: Linked>(&self, slots: &[P], idx: usize) -> bool {
        slots[idx].links().which == Some(self.id)
    }

    /// Append `idx` at the tail
    pub fn push_back<P: Linked>(&mut self, slots: &mut [P], idx: usize) {
        debug_assert!(
            slots[idx].links().which.is_none(),
            "slot already on a queue"
        );
        let idx16 = idx as u16;
        {
            let links = slots[idx].links_mut();
            links.next = None;
            links.prev = self.tail;
            links.which = Some(self.id);
        }
        match self.tail {
            Some(tail) => slots[tail as usize].links_mut().next = Some(idx16),
            None => self.head = Some(idx16),
        }
        self.tail = Some(idx16);
    }

    /// Detach and return the head slot
    pub fn pop_front<P: Linked>(&mut self, slots: &mut [P]) -> Option<usize> {
        let head = self.head? as usize;
        self.unlink(slots, head);
        Some(head)
    }

    /// Detach `idx` from anywhere on the queue
    ///
    /// Returns false if the slot is not on this queue.
    pub fn remove<P: Linked>(&mut self, slots: &mut [P], idx: usize) -> bool {
        if !self.contains(slots, idx) {
            return false;
        }
        self.unlink(slots, idx);
        true
    }

    fn unlink<P: Linked>(&mut self, slots: &mut [P], idx: usize) {
        let (next, prev) = {
            let links = slots[idx].links();
            (links.next, links.prev)
        };
        match prev {
            Some(p) => slots[p as usize].links_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => slots[n as usize].links_mut().prev = prev,
            None => self.tail = prev,
        }
        let links = slots[idx].links_mut();
        links.next = None;
        links.prev = None;
        links.which = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slot {
        links: Links,
    }

    impl Linked for Slot {
        fn links(&self) -> &Links {
            &self.links
        }
        fn links_mut(&mut self) -> &mut Links {
            &mut self.links
        }
    }

    fn slots(n: usize) -> Vec<Slot> {
        (0..n).map(|_| Slot { links: Links::new() }).collect()
    }

    #[test]
    fn fifo_order() {
        let mut s = slots(4);
        let mut q = Queue::new(QueueId::Ready);
        q.push_back(&mut s, 1);
        q.push_back(&mut s, 3);
        q.push_back(&mut s, 2);
        assert_eq!(q.front(), Some(1));
        assert_eq!(q.pop_front(&mut s), Some(1));
        assert_eq!(q.pop_front(&mut s), Some(3));
        assert_eq!(q.pop_front(&mut s), Some(2));
        assert_eq!(q.pop_front(&mut s), None);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_from_middle() {
        let mut s = slots(4);
        let mut q = Queue::new(QueueId::Wait);
        q.push_back(&mut s, 0);
        q.push_back(&mut s, 1);
        q.push_back(&mut s, 2);
        assert!(q.remove(&mut s, 1));
        assert!(!q.remove(&mut s, 1));
        assert_eq!(q.pop_front(&mut s), Some(0));
        assert_eq!(q.pop_front(&mut s), Some(2));
        assert!(s[1].links.which().is_none());
    }

    #[test]
    fn membership_tag_tracks_queue() {
        let mut s = slots(2);
        let mut ready = Queue::new(QueueId::Ready);
        let mut wait = Queue::new(QueueId::Wait);
        ready.push_back(&mut s, 0);
        assert!(ready.contains(&s, 0));
        assert!(!wait.contains(&s, 0));
        // Not on the wait queue, so wait.remove refuses
        assert!(!wait.remove(&mut s, 0));
        assert!(ready.remove(&mut s, 0));
        wait.push_back(&mut s, 0);
        assert_eq!(s[0].links.which(), Some(QueueId::Wait));
    }

    #[test]
    fn walk_with_next() {
        let mut s = slots(5);
        let mut q = Queue::new(QueueId::Zombie);
        for i in [4, 2, 0] {
            q.push_back(&mut s, i);
        }
        let mut order = vec![];
        let mut cur = q.front();
        while let Some(i) = cur {
            order.push(i);
            cur = q.next(&s, i);
        }
        assert_eq!(order, vec![4, 2, 0]);
    }
}
