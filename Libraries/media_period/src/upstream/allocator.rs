use std::fmt::Debug;

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::trace;

/// Supplies reusable fixed-size buffers for buffered samples.
///
/// Shared by every stream of a period through an `Arc`, so implementations
/// must be safe for concurrent use.
pub trait Allocator: Send + Sync + Debug {
    /// Returns a buffer of `individual_allocation_length()` bytes.
    fn allocate(&self) -> BytesMut;

    /// Hands a buffer back for reuse.
    fn release(&self, allocation: BytesMut);

    fn release_all(&self, allocations: Vec<BytesMut>) {
        for allocation in allocations {
            self.release(allocation);
        }
    }

    /// Bytes currently handed out and not yet released.
    fn total_bytes_allocated(&self) -> usize;

    fn individual_allocation_length(&self) -> usize;
}

#[derive(Debug)]
struct PoolState {
    /// Buffers available for reuse.
    available: Vec<BytesMut>,
    /// Buffers handed out and not yet released.
    allocated_count: usize,
}

/// A pool of equally sized buffers.
///
/// Released buffers are kept for reuse up to `max_available`; anything beyond
/// that is dropped.
#[derive(Debug)]
pub struct DefaultAllocator {
    individual_allocation_length: usize,
    max_available: usize,
    state: Mutex<PoolState>,
}

impl DefaultAllocator {
    pub fn new(individual_allocation_length: usize) -> Self {
        Self::with_capacity(individual_allocation_length, 256)
    }

    pub fn with_capacity(individual_allocation_length: usize, max_available: usize) -> Self {
        Self {
            individual_allocation_length,
            max_available,
            state: Mutex::new(PoolState {
                available: Vec::with_capacity(max_available.min(16)),
                allocated_count: 0,
            }),
        }
    }

    /// Drops pooled buffers until at most `target_buffer_count` remain available.
    pub fn trim(&self, target_buffer_count: usize) {
        let mut state = self.state.lock();
        if state.available.len() > target_buffer_count {
            trace!(
                "Trimming allocator from {} to {} pooled buffers",
                state.available.len(),
                target_buffer_count
            );
            state.available.truncate(target_buffer_count);
        }
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().available.len()
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&self) -> BytesMut {
        let mut state = self.state.lock();
        state.allocated_count += 1;
        match state.available.pop() {
            Some(mut buffer) => {
                buffer.resize(self.individual_allocation_length, 0);
                buffer
            }
            None => BytesMut::zeroed(self.individual_allocation_length),
        }
    }

    fn release(&self, mut allocation: BytesMut) {
        let mut state = self.state.lock();
        state.allocated_count = state.allocated_count.saturating_sub(1);
        if state.available.len() >= self.max_available
            || allocation.capacity() < self.individual_allocation_length
        {
            return;
        }
        allocation.clear();
        state.available.push(allocation);
    }

    fn total_bytes_allocated(&self) -> usize {
        self.state.lock().allocated_count * self.individual_allocation_length
    }

    fn individual_allocation_length(&self) -> usize {
        self.individual_allocation_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let allocator = DefaultAllocator::new(1024);
        let first = allocator.allocate();
        assert_eq!(first.len(), 1024);
        assert_eq!(allocator.total_bytes_allocated(), 1024);

        allocator.release(first);
        assert_eq!(allocator.total_bytes_allocated(), 0);
        assert_eq!(allocator.available_count(), 1);

        let second = allocator.allocate();
        assert_eq!(second.len(), 1024);
        assert_eq!(allocator.available_count(), 0);
    }

    #[test]
    fn caps_pooled_buffers_and_trims() {
        let allocator = DefaultAllocator::with_capacity(16, 2);
        let buffers: Vec<_> = (0..4).map(|_| allocator.allocate()).collect();
        assert_eq!(allocator.total_bytes_allocated(), 64);
        allocator.release_all(buffers);
        assert_eq!(allocator.available_count(), 2);
        assert_eq!(allocator.total_bytes_allocated(), 0);

        allocator.trim(1);
        assert_eq!(allocator.available_count(), 1);
    }

    #[test]
    fn ignores_undersized_buffers() {
        let allocator = DefaultAllocator::new(64);
        allocator.release(BytesMut::with_capacity(8));
        assert_eq!(allocator.available_count(), 0);
    }
}
