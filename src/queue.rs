//! Bounded inbound packet queue.
//!
//! Transport callbacks push decoded packets; the dispatcher tick drains them
//! in arrival order. The queue never blocks: once full, new packets are
//! dropped and counted, so a chattering bus cannot stall the panel.
//!
//! ```rust
//! use rs_ctc::packet::Packet;
//! use rs_ctc::queue::PacketQueue;
//!
//! let mut queue: PacketQueue<2> = PacketQueue::new();
//! assert!(queue.push(Packet::new(0xFF, 0x10, b'S', vec![1])));
//! assert!(queue.push(Packet::new(0xFF, 0x11, b'S', vec![2])));
//!
//! // Full: the third packet is dropped
//! assert!(!queue.push(Packet::new(0xFF, 0x12, b'S', vec![3])));
//! assert_eq!(queue.dropped(), 1);
//!
//! assert_eq!(queue.pop().unwrap().src, 0x10);
//! ```

use heapless::Deque;

use crate::packet::Packet;

/// FIFO of decoded packets with fixed capacity `N`.
pub struct PacketQueue<const N: usize> {
    deque: Deque<Packet, N>,
    dropped: u64,
}

impl<const N: usize> PacketQueue<N> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            deque: Deque::new(),
            dropped: 0,
        }
    }

    /// Appends a packet. Returns false, and drops the packet, when full.
    #[must_use]
    pub fn push(&mut self, pkt: Packet) -> bool {
        match self.deque.push_back(pkt) {
            Ok(()) => true,
            Err(pkt) => {
                self.dropped += 1;
                log::warn!(
                    "inbound queue full ({} packets), dropping {}",
                    N,
                    pkt
                );
                false
            }
        }
    }

    /// Takes the oldest packet.
    pub fn pop(&mut self) -> Option<Packet> {
        self.deque.pop_front()
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Packets dropped because the queue was full, since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<const N: usize> Default for PacketQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for PacketQueue<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.deque.len())
            .field("capacity", &N)
            .field("dropped", &self.dropped)
            .finish()
    }
}
