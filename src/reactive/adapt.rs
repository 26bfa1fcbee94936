/*!
Adapters that let blocking [Io] streams be children of reactive composites.
*/
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use async_trait::async_trait;
use block_party::Spawn;
use crate::capability::{Capabilities, CloseListener, Element, Io, SeekOrigin};
use crate::error::Result;
use super::AsyncIo;

///Calls the blocking stream directly.  Every future it returns is ready on first poll.
#[derive(Debug)]
pub struct Inline<I>(pub I);

impl<I> Inline<I> {
    pub fn into_inner(self) -> I {
        self.0
    }
}

#[async_trait]
impl<T: Element, I: Io<T>> AsyncIo<T> for Inline<I> {
    fn capabilities(&self) -> Capabilities { self.0.capabilities() }
    fn is_closed(&self) -> bool { self.0.is_closed() }
    async fn close(&mut self) -> Result<()> { self.0.close() }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> { self.0.on_close(listener) }
    async fn read(&mut self, buf: &mut [T]) -> Result<usize> { self.0.read(buf) }
    async fn write(&mut self, buf: &[T]) -> Result<usize> { self.0.write(buf) }
    async fn flush(&mut self) -> Result<()> { self.0.flush() }
    async fn size(&mut self) -> Result<u64> { self.0.size() }
    async fn position(&mut self) -> Result<u64> { self.0.position() }
    async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> { self.0.seek(origin, offset) }
    async fn set_size(&mut self, size: i64) -> Result<()> { self.0.set_size(size) }
    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> { self.0.skip_up_to(count) }
}

/**
Runs each call of a blocking stream as a job on a [Spawn] strategy, suspending until the job finishes.

Buffers are copied to and from the job, since it may outlive the borrow.  A job that panics fails its call with
[crate::Error::Worker].

The non-suspending methods ([AsyncIo::is_closed], [AsyncIo::on_close]) take the stream's lock directly, so they wait
for any job already running.  Capabilities are read once, at construction.
*/
pub struct Offload<I> {
    inner: Arc<Mutex<I>>,
    spawn: Arc<dyn Spawn>,
    capabilities: Capabilities,
}

impl<I> std::fmt::Debug for Offload<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Offload").field("capabilities", &self.capabilities).finish()
    }
}

fn lock<I>(inner: &Mutex<I>) -> MutexGuard<'_, I> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<I: Send + 'static> Offload<I> {
    pub fn new<T: Element>(inner: I, spawn: Arc<dyn Spawn>) -> Self where I: Io<T> {
        let capabilities = inner.capabilities();
        Offload { inner: Arc::new(Mutex::new(inner)), spawn, capabilities }
    }

    fn offload<O, F>(&self, operation: F) -> impl Future<Output=Result<O>> + Send
    where O: Send + 'static, F: FnOnce(&mut I) -> Result<O> + Send + 'static {
        let inner = self.inner.clone();
        let job = block_party::run(&*self.spawn, move || operation(&mut *lock(&inner)));
        async move { job.await? }
    }
}

#[async_trait]
impl<T: Element, I: Io<T> + 'static> AsyncIo<T> for Offload<I> {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
    fn is_closed(&self) -> bool {
        lock(&self.inner).is_closed()
    }
    async fn close(&mut self) -> Result<()> {
        self.offload(|io: &mut I| io.close()).await
    }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> {
        lock(&self.inner).on_close(listener)
    }
    async fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        let len = buf.len();
        let (n, scratch) = self.offload(move |io: &mut I| {
            let mut scratch = vec![T::default(); len];
            let n = io.read(&mut scratch)?;
            Ok((n, scratch))
        }).await?;
        buf[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }
    async fn write(&mut self, buf: &[T]) -> Result<usize> {
        let owned = buf.to_vec();
        self.offload(move |io: &mut I| io.write(&owned)).await
    }
    async fn flush(&mut self) -> Result<()> {
        self.offload(|io: &mut I| io.flush()).await
    }
    async fn size(&mut self) -> Result<u64> {
        self.offload(|io: &mut I| io.size()).await
    }
    async fn position(&mut self) -> Result<u64> {
        self.offload(|io: &mut I| io.position()).await
    }
    async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        self.offload(move |io: &mut I| io.seek(origin, offset)).await
    }
    async fn set_size(&mut self, size: i64) -> Result<()> {
        self.offload(move |io: &mut I| io.set_size(size)).await
    }
    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        self.offload(move |io: &mut I| io.skip_up_to(count)).await
    }
}

#[cfg(test)] mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use block_party::{Inline as InlineSpawn, Pool, Priority, Spawn};
    use crate::capability::{Capabilities, Io, SeekOrigin};
    use crate::error::{Error, Result};
    use crate::reactive::AsyncIo;
    use crate::test::{poll_inline, test_await, Memory};
    use super::{Inline, Offload};

    #[test] fn inline_is_immediate() {
        let mut io = Inline(Memory::from_slice(b"hello"));
        let mut buf = [0u8; 3];
        assert_eq!(poll_inline(io.read(&mut buf)).unwrap().unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(poll_inline(io.seek(SeekOrigin::End, -1)).unwrap().unwrap(), 4);
        assert_eq!(io.into_inner().position().unwrap(), 4);
    }

    #[test] fn offload_on_a_pool() {
        let pool: Arc<dyn Spawn> = Arc::new(Pool::new(Priority::Testing));
        let mut io = Offload::new(Memory::from_slice(b"hello world"), pool);
        assert!(io.capabilities().contains(Capabilities::SEEK));
        let result: Result<Vec<u8>> = test_await(async {
            io.seek(SeekOrigin::Start, 6).await?;
            let mut buf = vec![0u8; 5];
            io.read_fully(&mut buf).await?;
            io.seek(SeekOrigin::Start, 0).await?;
            io.write_all(b"J").await?;
            io.seek(SeekOrigin::Start, 0).await?;
            let mut first = [0u8; 1];
            io.read_fully(&mut first).await?;
            buf.insert(0, first[0]);
            Ok(buf)
        }, Duration::from_secs(5));
        assert_eq!(result.unwrap(), b"Jworld");
    }

    #[test] fn offload_inline_strategy() {
        let mut io = Offload::new(Memory::from_slice(b"ab"), Arc::new(InlineSpawn));
        assert_eq!(poll_inline(io.size()).unwrap().unwrap(), 2);
        poll_inline(io.close()).unwrap().unwrap();
        assert!(io.is_closed());
        assert!(matches!(poll_inline(io.size()).unwrap(), Err(Error::Closed)));
    }

    #[test] fn panicking_job_is_a_worker_error() {
        struct Panics;
        impl Io<u8> for Panics {
            fn capabilities(&self) -> Capabilities { Capabilities::READ }
            fn is_closed(&self) -> bool { false }
            fn close(&mut self) -> Result<()> { Ok(()) }
            fn on_close(&mut self, _listener: crate::capability::CloseListener) -> Result<()> { Ok(()) }
            fn read(&mut self, _buf: &mut [u8]) -> Result<usize> { panic!("leaf exploded") }
        }
        let pool: Arc<dyn Spawn> = Arc::new(Pool::new(Priority::Testing));
        let mut io = Offload::new(Panics, pool);
        let mut buf = [0u8; 1];
        let result = test_await(io.read(&mut buf), Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Worker)));
    }
}
