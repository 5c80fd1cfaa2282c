//! Packet pool: allocates fixed-size packet buffers in pages, reference
//! counted so that a fragment list and any in-flight retransmission copies
//! can share the same buffer without an extra copy.
//!
//! Grounded on spec.md §4.1 (`PacketManager`/`PacketPtr` in the source,
//! filtered out of `original_source/` by the retrieval cap but described
//! there). The session is single-threaded-cooperative (spec.md §5), so
//! `Rc`/`RefCell` is the right tool rather than `Arc`/`Mutex`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ringchain_core::Packet;

/// Number of buffers allocated per page when the free stack runs dry.
pub const PAGE_SIZE: usize = 2048;

struct PoolInner {
    free: Vec<Rc<RefCell<Packet>>>,
    pages_allocated: usize,
}

/// Allocates and recycles `Packet` buffers. Not `Send`/`Sync` — confined to
/// the I/O thread, per spec.md §5.
pub struct PacketPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl PacketPool {
    pub fn new() -> Self {
        PacketPool {
            inner: Rc::new(RefCell::new(PoolInner { free: Vec::new(), pages_allocated: 0 })),
        }
    }

    /// Number of buffers currently sitting on the free stack.
    pub fn free_count(&self) -> usize {
        self.inner.borrow().free.len()
    }

    pub fn pages_allocated(&self) -> usize {
        self.inner.borrow().pages_allocated
    }

    /// Pops a recycled buffer, or allocates a fresh page of `PAGE_SIZE` if
    /// the free stack is empty.
    pub fn get_free(&self, template: Packet) -> PacketHandle {
        let mut inner = self.inner.borrow_mut();
        let slot = match inner.free.pop() {
            Some(slot) => {
                *slot.borrow_mut() = template;
                slot
            }
            None => {
                let page: Vec<Rc<RefCell<Packet>>> = (0..PAGE_SIZE)
                    .map(|_| Rc::new(RefCell::new(template.clone())))
                    .collect();
                inner.pages_allocated += 1;
                let first = page[0].clone();
                inner.free.extend(page.into_iter().skip(1));
                first
            }
        };
        PacketHandle { buffer: slot, pool: Rc::downgrade(&self.inner) }
    }
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A strong reference to a pooled packet buffer. When the last clone drops,
/// the buffer is pushed back onto the pool's free stack.
#[derive(Clone)]
pub struct PacketHandle {
    buffer: Rc<RefCell<Packet>>,
    pool: Weak<RefCell<PoolInner>>,
}

impl PacketHandle {
    pub fn borrow(&self) -> std::cell::Ref<'_, Packet> {
        self.buffer.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, Packet> {
        self.buffer.borrow_mut()
    }
}

impl Drop for PacketHandle {
    fn drop(&mut self) {
        // Only the pool's own bookkeeping clone and this one remain when
        // strong_count reaches 2 (pool keeps no clone, so 1 means we're
        // last). Return the buffer so it can be recycled by `get_free`.
        if Rc::strong_count(&self.buffer) == 1 {
            if let Some(pool) = self.pool.upgrade() {
                pool.borrow_mut().free.push(self.buffer.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringchain_core::{Command, Hash, PublicKey, Subcommand};

    fn sample() -> Packet {
        Packet {
            command: Command::GetHash,
            subcommand: Subcommand::Empty,
            version: 1,
            origin_ip: 0,
            sender_hash: Hash::ZERO,
            sender_public_key: PublicKey::from_bytes([0u8; 32]),
            message_hash: Hash::ZERO,
            fragment_index: 0,
            fragment_count: 0,
            payload: Vec::new(),
        }
    }

    #[test]
    fn allocates_a_page_on_first_use() {
        let pool = PacketPool::new();
        let handle = pool.get_free(sample());
        assert_eq!(pool.pages_allocated(), 1);
        assert_eq!(pool.free_count(), PAGE_SIZE - 1);
        drop(handle);
        assert_eq!(pool.free_count(), PAGE_SIZE);
    }

    #[test]
    fn reuses_freed_buffers_before_allocating_a_new_page() {
        let pool = PacketPool::new();
        let handles: Vec<_> = (0..PAGE_SIZE).map(|_| pool.get_free(sample())).collect();
        assert_eq!(pool.pages_allocated(), 1);
        drop(handles);
        assert_eq!(pool.free_count(), PAGE_SIZE);
        let _next = pool.get_free(sample());
        assert_eq!(pool.pages_allocated(), 1);
    }

    #[test]
    fn cloned_handle_is_not_released_until_last_drop() {
        let pool = PacketPool::new();
        let handle = pool.get_free(sample());
        let clone = handle.clone();
        drop(handle);
        assert_eq!(pool.free_count(), PAGE_SIZE - 1);
        drop(clone);
        assert_eq!(pool.free_count(), PAGE_SIZE);
    }
}
