//! Weighted round-robin over runnable entity queues.

use crate::arena::{Arena, Idx};

/// Intrusive links embedding a queue into its fair queue's circular list.
///
/// `prev`/`next` are meaningful only while `linked` is set. A queue is in
/// at most one fair queue at a time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunLink<T> {
    prev: Option<Idx<T>>,
    next: Option<Idx<T>>,
    linked: bool,
}

impl<T> RunLink<T> {
    pub(crate) fn new() -> Self {
        Self {
            prev: None,
            next: None,
            linked: false,
        }
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.linked
    }
}

/// A node that can be threaded into a [`FairQueue`].
pub(crate) trait FairNode: Sized {
    fn run_link(&self) -> &RunLink<Self>;
    fn run_link_mut(&mut self) -> &mut RunLink<Self>;
    /// Priority weight; the queue gets this many consecutive dispatches
    /// per rotation.
    fn priority(&self) -> u32;
}

/// Round-robin scheduler over the entity queues that currently have
/// dispatchable work.
///
/// Members form a circular doubly-linked list threaded through the arena
/// slots themselves. A cursor walks the ring; each queue holds the cursor
/// for `priority × base_quantum` consecutive polls before rotation, so
/// priority buys consecutive dispatches, not preemption. Queues that are
/// present but not available (exclusively locked with an inaccessible
/// head) are skipped, resetting the quantum.
#[derive(Debug)]
pub(crate) struct FairQueue<T> {
    head: Option<Idx<T>>,
    current: Option<Idx<T>>,
    current_quantum: u32,
    quantum: u32,
    size: usize,
}

impl<T: FairNode> FairQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: None,
            current: None,
            current_quantum: 0,
            quantum: 1,
            size: 0,
        }
    }

    pub(crate) fn has_runnables(&self) -> bool {
        self.len() > 0
    }

    pub(crate) fn len(&self) -> usize {
        self.size
    }

    /// Append `id` at the tail of the ring.
    pub(crate) fn add(&mut self, arena: &mut Arena<T>, id: Idx<T>) {
        debug_assert!(!arena[id].run_link().is_linked(), "queue already linked");
        match self.head {
            None => {
                let link = arena[id].run_link_mut();
                link.prev = Some(id);
                link.next = Some(id);
                self.head = Some(id);
            }
            Some(head) => {
                let tail = arena[head].run_link().prev.expect("linked head has prev");
                arena[tail].run_link_mut().next = Some(id);
                arena[head].run_link_mut().prev = Some(id);
                let link = arena[id].run_link_mut();
                link.prev = Some(tail);
                link.next = Some(head);
            }
        }
        arena[id].run_link_mut().linked = true;
        self.size += 1;
        if self.current.is_none() {
            self.set_current(arena, self.head);
        }
    }

    /// Unlink `id` from the ring; if it held the cursor, the cursor moves
    /// to its successor with a fresh quantum.
    pub(crate) fn remove(&mut self, arena: &mut Arena<T>, id: Idx<T>) {
        debug_assert!(arena[id].run_link().is_linked(), "queue not linked");
        let next = arena[id].run_link().next.expect("linked node has next");
        let prev = arena[id].run_link().prev.expect("linked node has prev");
        if next == id {
            self.head = None;
        } else {
            arena[prev].run_link_mut().next = Some(next);
            arena[next].run_link_mut().prev = Some(prev);
            if self.head == Some(id) {
                self.head = Some(next);
            }
        }
        {
            let link = arena[id].run_link_mut();
            link.linked = false;
            link.prev = None;
            link.next = None;
        }
        self.size -= 1;
        if self.current == Some(id) {
            let successor = if self.head.is_none() { None } else { Some(next) };
            self.set_current(arena, successor);
        }
    }

    /// Pick the queue the next dispatch should come from.
    ///
    /// Decrements the current quantum, rotating when it is exhausted. If
    /// the cursor's queue is not `available`, rotates until an available
    /// queue is found; a full loop hands back the starting queue, which the
    /// caller re-checks (and then treats as "nothing dispatchable").
    pub(crate) fn poll(
        &mut self,
        arena: &Arena<T>,
        available: impl Fn(Idx<T>, &T) -> bool,
    ) -> Option<Idx<T>> {
        if self.current_quantum == 0 {
            if !self.advance(arena) {
                return None;
            }
            let cur = self.current.expect("advance left a cursor");
            self.current_quantum = self.calculate_quantum(&arena[cur]) - 1;
        } else {
            self.current_quantum -= 1;
        }

        let mut cur = self.current?;
        if !available(cur, &arena[cur]) {
            let last = cur;
            loop {
                if !self.advance(arena) {
                    return None;
                }
                cur = self.current.expect("advance left a cursor");
                if cur == last || available(cur, &arena[cur]) {
                    break;
                }
            }
            self.current_quantum = self.calculate_quantum(&arena[cur]) - 1;
        }
        self.current
    }

    fn advance(&mut self, arena: &Arena<T>) -> bool {
        let Some(cur) = self.current else {
            return false;
        };
        self.current = arena[cur].run_link().next;
        self.current.is_some()
    }

    fn set_current(&mut self, arena: &Arena<T>, id: Option<Idx<T>>) {
        self.current = id;
        self.current_quantum = match id {
            Some(id) => self.calculate_quantum(&arena[id]),
            None => 0,
        };
    }

    fn calculate_quantum(&self, queue: &T) -> u32 {
        (queue.priority() * self.quantum).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Node {
        weight: u32,
        available: bool,
        link: RunLink<Node>,
    }

    impl Node {
        fn new(weight: u32) -> Self {
            Self {
                weight,
                available: true,
                link: RunLink::new(),
            }
        }
    }

    impl FairNode for Node {
        fn run_link(&self) -> &RunLink<Self> {
            &self.link
        }
        fn run_link_mut(&mut self) -> &mut RunLink<Self> {
            &mut self.link
        }
        fn priority(&self) -> u32 {
            self.weight
        }
    }

    #[test]
    fn empty_poll_returns_none() {
        let arena: Arena<Node> = Arena::new();
        let mut fair = FairQueue::new();
        assert!(fair.poll(&arena, |_, n| n.available).is_none());
        assert!(!fair.has_runnables());
    }

    #[test]
    fn single_queue_keeps_the_cursor() {
        let mut arena = Arena::new();
        let mut fair = FairQueue::new();
        let a = arena.insert(Node::new(1));
        fair.add(&mut arena, a);
        for _ in 0..5 {
            assert_eq!(fair.poll(&arena, |_, n| n.available), Some(a));
        }
    }

    #[test]
    fn quantum_grants_consecutive_dispatches() {
        let mut arena = Arena::new();
        let mut fair = FairQueue::new();
        let meta = arena.insert(Node::new(3));
        let user = arena.insert(Node::new(1));
        fair.add(&mut arena, meta);
        fair.add(&mut arena, user);

        let mut meta_polls = 0;
        let mut user_polls = 0;
        for _ in 0..8 {
            match fair.poll(&arena, |_, n| n.available) {
                Some(id) if id == meta => meta_polls += 1,
                Some(id) if id == user => user_polls += 1,
                other => panic!("unexpected poll result {other:?}"),
            }
        }
        // 3:1 weight over 8 dispatches
        assert_eq!(meta_polls, 6);
        assert_eq!(user_polls, 2);
    }

    #[test]
    fn unavailable_queues_are_skipped() {
        let mut arena = Arena::new();
        let mut fair = FairQueue::new();
        let a = arena.insert(Node::new(1));
        let b = arena.insert(Node::new(1));
        fair.add(&mut arena, a);
        fair.add(&mut arena, b);
        arena[a].available = false;

        for _ in 0..3 {
            assert_eq!(fair.poll(&arena, |_, n| n.available), Some(b));
        }
    }

    #[test]
    fn full_loop_of_unavailable_queues_hands_back_the_start() {
        let mut arena = Arena::new();
        let mut fair = FairQueue::new();
        let a = arena.insert(Node::new(1));
        let b = arena.insert(Node::new(1));
        fair.add(&mut arena, a);
        fair.add(&mut arena, b);
        arena[a].available = false;
        arena[b].available = false;

        // wraps all the way around; caller must re-check availability
        let got = fair.poll(&arena, |_, n| n.available).unwrap();
        assert!(!arena[got].available);
    }

    #[test]
    fn removing_the_cursor_advances_it() {
        let mut arena = Arena::new();
        let mut fair = FairQueue::new();
        let a = arena.insert(Node::new(1));
        let b = arena.insert(Node::new(1));
        fair.add(&mut arena, a);
        fair.add(&mut arena, b);

        assert_eq!(fair.poll(&arena, |_, n| n.available), Some(a));
        fair.remove(&mut arena, a);
        assert!(!arena[a].run_link().is_linked());
        assert_eq!(fair.poll(&arena, |_, n| n.available), Some(b));
        fair.remove(&mut arena, b);
        assert!(fair.poll(&arena, |_, n| n.available).is_none());
        assert_eq!(fair.len(), 0);
    }
}
