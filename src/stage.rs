//! Stage Buffer Pool: reusable intermediate byte buffers for transform
//! chains.
//!
//! `fetch` returns the first free buffer whose capacity already covers the
//! request, else grows the pool. Buffers are never shrunk. The pool is the
//! only allocator on the multi-pass color-convert/rotate/flip/scale chain
//! (spec 4.3); every sub-operation must release what it fetched on every
//! exit path, including errors -- callers should prefer [`StageGuard`] to
//! make that automatic.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Free,
    InUse,
}

struct StageBuffer {
    data: Vec<u8>,
    state: StageState,
}

/// Heap of reusable scratch buffers, indexed by slot.
#[derive(Default)]
pub struct StageBufferPool {
    buffers: Vec<StageBuffer>,
}

impl StageBufferPool {
    pub fn new() -> Self {
        Self { buffers: Vec::new() }
    }

    /// Returns the index of a free buffer with `capacity >= size`, growing
    /// the pool with a freshly allocated buffer if none qualifies.
    pub fn fetch(&mut self, size: usize) -> usize {
        if let Some((i, buf)) = self
            .buffers
            .iter_mut()
            .enumerate()
            .find(|(_, b)| b.state == StageState::Free && b.data.len() >= size)
        {
            buf.state = StageState::InUse;
            log::debug!(target: "vconv::stage", "reused stage buffer {i} ({}B) for {size}B request", buf.data.len());
            return i;
        }

        self.buffers.push(StageBuffer {
            data: vec![0u8; size],
            state: StageState::InUse,
        });
        let index = self.buffers.len() - 1;
        log::debug!(target: "vconv::stage", "grew pool: new stage buffer {index} ({size}B)");
        index
    }

    pub fn release(&mut self, index: usize) {
        if let Some(buf) = self.buffers.get_mut(index) {
            buf.state = StageState::Free;
        }
    }

    pub fn buffer_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.buffers[index].data
    }

    pub fn buffer(&self, index: usize) -> &[u8] {
        &self.buffers[index].data
    }

    pub fn in_use_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.state == StageState::InUse).count()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// RAII guard that releases its stage buffer back to the pool on every exit
/// path, including `?`-propagated errors -- the scoped-acquisition pattern
/// called for in spec 9 ("Goto-based cleanup... scoped acquisition of each
/// resource with release on all exit paths").
pub struct StageGuard<'p> {
    pool: &'p mut StageBufferPool,
    index: usize,
    released: bool,
}

impl<'p> StageGuard<'p> {
    pub fn fetch(pool: &'p mut StageBufferPool, size: usize) -> Self {
        let index = pool.fetch(size);
        Self {
            pool,
            index,
            released: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.pool.buffer_mut(self.index)
    }

    pub fn bytes(&self) -> &[u8] {
        self.pool.buffer(self.index)
    }

    /// Explicit early release; `Drop` is a no-op afterwards.
    pub fn release(mut self) {
        self.pool.release(self.index);
        self.released = true;
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.release(self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_grows_pool_when_no_free_buffer_fits() {
        let mut pool = StageBufferPool::new();
        let a = pool.fetch(100);
        assert_eq!(pool.len(), 1);
        pool.release(a);
        let b = pool.fetch(50);
        // Should reuse slot `a` since 100 >= 50.
        assert_eq!(b, a);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn fetch_does_not_shrink_reused_buffer() {
        let mut pool = StageBufferPool::new();
        let a = pool.fetch(200);
        pool.release(a);
        let b = pool.fetch(10);
        assert_eq!(b, a);
        assert_eq!(pool.buffer(b).len(), 200);
    }

    #[test]
    fn in_use_buffer_is_not_reused_until_released() {
        let mut pool = StageBufferPool::new();
        let _a = pool.fetch(100);
        let b = pool.fetch(50);
        assert_ne!(_a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn guard_releases_on_drop() {
        let mut pool = StageBufferPool::new();
        {
            let _guard = StageGuard::fetch(&mut pool, 64);
            assert_eq!(pool.in_use_count(), 1);
        }
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn guard_releases_even_on_early_return_via_question_mark() {
        fn does_work(pool: &mut StageBufferPool, fail: bool) -> Result<(), ()> {
            let _guard = StageGuard::fetch(pool, 32);
            if fail {
                return Err(());
            }
            Ok(())
        }

        let mut pool = StageBufferPool::new();
        let _ = does_work(&mut pool, true);
        assert_eq!(pool.in_use_count(), 0);
    }
}
