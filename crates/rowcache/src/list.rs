//! Recency list and its request queue
//!
//! The list is an arena-backed doubly-linked list (front = most recently
//! used). Only the [`Scheduler`](crate::Scheduler) owns a `RecencyList`;
//! every other task talks to it through a [`RequestQueue`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::record::{Record, SharedRecord};

/// Generation-checked handle to a list node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId {
    index: usize,
    generation: u64,
}

/// Node in the recency list
struct Node<V> {
    record: SharedRecord<V>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena slot; the generation is bumped every time the slot is freed
struct Slot<V> {
    generation: u64,
    node: Option<Node<V>>,
}

/// Doubly-linked recency ordering of live records
pub(crate) struct RecencyList<V> {
    slots: Vec<Slot<V>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    len: usize,
}

impl<V> RecencyList<V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link a new node holding `record` at the front
    pub(crate) fn push_front(&mut self, record: SharedRecord<V>) -> NodeId {
        let idx = self.alloc_slot();
        self.slots[idx].node = Some(Node {
            record,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = self.node_mut(head_idx) {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.len += 1;

        NodeId {
            index: idx,
            generation: self.slots[idx].generation,
        }
    }

    /// Move a node to the front; `false` if the handle is stale
    pub(crate) fn move_to_front(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let idx = id.index;
        if self.head == Some(idx) {
            return true;
        }

        self.unlink(idx);

        let head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = head;
        }
        if let Some(head_idx) = head {
            if let Some(head) = self.node_mut(head_idx) {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        true
    }

    /// Unlink and free a node, returning its record
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<SharedRecord<V>> {
        if !self.contains(id) {
            return None;
        }
        self.unlink(id.index);
        self.free_slot(id.index).map(|node| node.record)
    }

    /// Handle and record of the least recently used node
    pub(crate) fn back(&self) -> Option<(NodeId, &SharedRecord<V>)> {
        let idx = self.tail?;
        let slot = &self.slots[idx];
        slot.node.as_ref().map(|node| {
            (
                NodeId {
                    index: idx,
                    generation: slot.generation,
                },
                &node.record,
            )
        })
    }

    /// Remove the least recently used node
    pub(crate) fn pop_back(&mut self) -> Option<(NodeId, SharedRecord<V>)> {
        let (id, _) = self.back()?;
        self.remove(id).map(|record| (id, record))
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index)
            .map(|slot| slot.generation == id.generation && slot.node.is_some())
            .unwrap_or(false)
    }

    /// Records from front (most recent) to back
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &SharedRecord<V>> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.slots.get(cursor?)?.node.as_ref()?;
            cursor = node.next;
            Some(&node.record)
        })
    }

    /// Drop every node, keeping generations so old handles stay stale
    pub(crate) fn clear(&mut self) {
        self.free_list.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation += 1;
            }
            self.free_list.push(idx);
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<V>> {
        self.slots.get_mut(idx).and_then(|slot| slot.node.as_mut())
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].node.as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = self.node_mut(prev_idx) {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = self.node_mut(next_idx) {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: None,
            });
            self.slots.len() - 1
        }
    }

    fn free_slot(&mut self, idx: usize) -> Option<Node<V>> {
        let slot = &mut self.slots[idx];
        let node = slot.node.take()?;
        slot.generation += 1;
        self.free_list.push(idx);
        self.len -= 1;
        Some(node)
    }
}

/// Structural change requested from the scheduler
pub(crate) enum Request<V> {
    /// Create a node for a new record at the front
    Insert(Record<V>),
    /// Move an existing node to the front
    Promote(NodeId),
    /// Signal once every earlier request has been applied
    Barrier(oneshot::Sender<()>),
}

/// Producer side of the scheduler's bounded request queue
///
/// Sends block the calling thread while the queue is full. They must not be
/// issued from inside an async runtime; wrap them in `spawn_blocking` there.
pub(crate) struct RequestQueue<V> {
    sender: RwLock<Option<mpsc::Sender<Request<V>>>>,
}

impl<V> RequestQueue<V> {
    /// Ask the scheduler to insert `record` at the front of the list
    pub(crate) fn request_insert(&self, record: Record<V>) -> Result<()> {
        self.send(Request::Insert(record))
    }

    /// Ask the scheduler to move `node` to the front of the list
    pub(crate) fn request_promote(&self, node: NodeId) -> Result<()> {
        self.send(Request::Promote(node))
    }

    /// Enqueue a barrier and return the receiver that fires once it is reached
    pub(crate) fn request_barrier(&self) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Barrier(tx))?;
        Ok(rx)
    }

    /// Stop accepting requests
    ///
    /// Requests already queued are still delivered; the scheduler resets its
    /// list once the queue is drained.
    pub(crate) fn close(&self) {
        self.sender.write().take();
    }

    /// Whether [`close`](Self::close) has been called
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn send(&self, request: Request<V>) -> Result<()> {
        // Clone out so a blocked send never holds the lock `close` needs
        let sender = self.sender.read().clone().ok_or(Error::QueueClosed)?;
        sender.blocking_send(request).map_err(|_| Error::QueueClosed)
    }
}

/// Create a bounded request queue and the receiver the scheduler drains
pub(crate) fn request_channel<V>(
    capacity: usize,
) -> (Arc<RequestQueue<V>>, mpsc::Receiver<Request<V>>) {
    let (tx, rx) = mpsc::channel(capacity);
    let queue = RequestQueue {
        sender: RwLock::new(Some(tx)),
    };
    (Arc::new(queue), rx)
}

/// Wrap a record for shared ownership by the index and the list
pub(crate) fn share<V>(record: Record<V>) -> SharedRecord<V> {
    Arc::new(Mutex::new(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList<u32>) -> Vec<String> {
        list.iter().map(|r| r.lock().key.clone()).collect()
    }

    fn push(list: &mut RecencyList<u32>, key: &str) -> NodeId {
        list.push_front(share(Record::new(key, 0)))
    }

    #[test]
    fn test_push_front_order() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        push(&mut list, "b");
        push(&mut list, "c");

        assert_eq!(keys(&list), vec!["c", "b", "a"]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.back().unwrap().1.lock().key, "a");
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        push(&mut list, "b");
        push(&mut list, "c");

        assert!(list.move_to_front(a));
        assert_eq!(keys(&list), vec!["a", "c", "b"]);
        assert_eq!(list.back().unwrap().1.lock().key, "b");
    }

    #[test]
    fn test_move_head_is_noop() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        let b = push(&mut list, "b");

        assert!(list.move_to_front(b));
        assert_eq!(keys(&list), vec!["b", "a"]);
    }

    #[test]
    fn test_remove_middle() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        let b = push(&mut list, "b");
        push(&mut list, "c");

        let record = list.remove(b).unwrap();
        assert_eq!(record.lock().key, "b");
        assert_eq!(keys(&list), vec!["c", "a"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_pop_back() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        push(&mut list, "b");

        let (_, record) = list.pop_back().unwrap();
        assert_eq!(record.lock().key, "a");
        let (_, record) = list.pop_back().unwrap();
        assert_eq!(record.lock().key, "b");
        assert!(list.pop_back().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        list.remove(a);

        // The freed slot is reused with a new generation
        let b = push(&mut list, "b");
        assert!(!list.contains(a));
        assert!(list.contains(b));
        assert!(!list.move_to_front(a));
        assert!(list.remove(a).is_none());
        assert_eq!(keys(&list), vec!["b"]);
    }

    #[test]
    fn test_clear() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        push(&mut list, "b");
        list.clear();

        assert!(list.is_empty());
        assert!(list.back().is_none());
        assert!(!list.contains(a));

        let c = push(&mut list, "c");
        assert!(list.contains(c));
        assert!(!list.contains(a));
    }

    #[test]
    fn test_queue_close() {
        let (queue, mut rx) = request_channel::<u32>(4);
        queue.request_insert(Record::new("a", 1)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(
            queue.request_insert(Record::new("b", 2)),
            Err(Error::QueueClosed)
        );
        // Already queued requests survive the close
        assert!(matches!(rx.try_recv(), Ok(Request::Insert(_))));
        assert!(rx.try_recv().is_err());
    }
}
