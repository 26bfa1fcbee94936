/*!
The contracts a stream has to meet to take part in a composite.

Rather than a hierarchy of stream types, every stream implements one object-safe trait, [Io], and advertises what
it can actually do through [Io::capabilities].  Operations a stream doesn't support fail with
[Error::Unsupported].  Composites only ever talk to their children through this trait, so anything implementing it,
including another composite, can be a child.

| Capability                  | Operations                                   |
|-----------------------------|----------------------------------------------|
| [Capabilities::READ]        | [Io::read]                                   |
| [Capabilities::WRITE]       | [Io::write], [Io::flush]                     |
| [Capabilities::SIZE]        | [Io::size]                                   |
| [Capabilities::SEEK]        | [Io::position], [Io::seek]                   |
| [Capabilities::APPEND]      | writes (and seeks) past the end grow the stream |
| [Capabilities::RESIZE]      | [Io::set_size]                               |

Every stream is closable and accepts close listeners.
*/
use std::sync::{Arc, Mutex, PoisonError};
use crate::error::{non_negative, Error, Result};

///Element type of a stream.  Implemented for bytes and chars.
pub trait Element: Copy + Default + Send + Sync + std::fmt::Debug + 'static {}
impl Element for u8 {}
impl Element for char {}

bitflags::bitflags! {
    ///What a stream can do.
    #[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
    pub struct Capabilities: u8 {
        const READ = 1;
        const WRITE = 1 << 1;
        const SEEK = 1 << 2;
        const SIZE = 1 << 3;
        ///Writes at the end grow the stream rather than failing.  Implies nothing without [Self::WRITE].
        const APPEND = 1 << 4;
        const RESIZE = 1 << 5;
    }
}

///Reference point for [Io::seek].
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

///Resolves `base + offset`, rejecting negative targets.
pub(crate) fn seek_target(base: u64, offset: i64) -> Result<u64> {
    let target = i128::from(base) + i128::from(offset);
    if target < 0 {
        return Err(Error::InvalidArgument("seek target is negative"));
    }
    u64::try_from(target).map_err(|_| Error::InvalidArgument("seek target overflows"))
}

///Called once when a stream closes.
pub type CloseListener = Box<dyn FnOnce() -> Result<()> + Send>;

/**
Fire-once close listeners.

Listeners registered after close run immediately.  A failing listener is logged and its error reported to the caller,
but never stops the remaining listeners from running.
*/
#[derive(Default)]
pub struct CloseListeners {
    closed: bool,
    pending: Vec<CloseListener>,
}

impl std::fmt::Debug for CloseListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseListeners").field("closed", &self.closed).field("pending", &self.pending.len()).finish()
    }
}

impl CloseListeners {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_closed(&self) -> bool {
        self.closed
    }
    pub fn add(&mut self, listener: CloseListener) -> Result<()> {
        if self.closed {
            notify(listener)
        }
        else {
            self.pending.push(listener);
            Ok(())
        }
    }
    ///Marks closed and runs every pending listener.  Returns the first listener failure.
    ///
    /// Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        let mut first_error = None;
        for listener in self.pending.drain(..) {
            if let Err(e) = notify(listener) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn notify(listener: CloseListener) -> Result<()> {
    listener().map_err(|e| {
        log::warn!("close listener failed: {e}");
        e
    })
}

/**
A stream of `T`.

Implementations override the operations matching the [Capabilities] they report; the defaults fail with
[Error::Unsupported].  Read and write never transfer zero elements for a non-empty buffer: at the end of data they
fail with [Error::EndOfStream] instead.
*/
pub trait Io<T: Element>: Send {
    fn capabilities(&self) -> Capabilities;
    fn is_closed(&self) -> bool;
    ///Closes the stream.  Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
    ///Registers a listener for close.  Runs it immediately if already closed.
    fn on_close(&mut self, listener: CloseListener) -> Result<()>;

    fn read(&mut self, _buf: &mut [T]) -> Result<usize> {
        Err(Error::Unsupported(Capabilities::READ))
    }
    fn write(&mut self, _buf: &[T]) -> Result<usize> {
        Err(Error::Unsupported(Capabilities::WRITE))
    }
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
    fn size(&mut self) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SIZE))
    }
    fn position(&mut self) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SEEK))
    }
    ///Moves to `origin + offset` and returns the new position.
    fn seek(&mut self, _origin: SeekOrigin, _offset: i64) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SEEK))
    }
    fn set_size(&mut self, _size: i64) -> Result<()> {
        Err(Error::Unsupported(Capabilities::RESIZE))
    }
    ///Skips at most `count` elements.  Returns how many were skipped, or `None` at the end of the stream.
    fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        default_skip_up_to(self, count)
    }

    ///Like [Self::read], but reports the end of the stream as `Ok(None)`.
    fn read_or_eof(&mut self, buf: &mut [T]) -> Result<Option<usize>> {
        match self.read(buf) {
            Ok(0) if !buf.is_empty() => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(Error::EndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }
    ///Fills `buf` completely or fails with [Error::EndOfStream].
    fn read_fully(&mut self, buf: &mut [T]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_or_eof(&mut buf[filled..])? {
                Some(n) => filled += n,
                None => return Err(Error::EndOfStream),
            }
        }
        Ok(())
    }
    fn write_all(&mut self, buf: &[T]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..])? {
                0 => return Err(Error::EndOfStream),
                n => written += n,
            }
        }
        Ok(())
    }
    ///Skips exactly `count` elements or fails with [Error::EndOfStream].
    fn skip_fully(&mut self, count: i64) -> Result<()> {
        let mut remaining = non_negative(count)?;
        while remaining > 0 {
            let request = i64::try_from(remaining).unwrap_or(i64::MAX);
            match self.skip_up_to(request)? {
                Some(0) | None => return Err(Error::EndOfStream),
                Some(n) => remaining -= n,
            }
        }
        Ok(())
    }
}

const SKIP_SCRATCH: usize = 4096;

///Skip by seeking if the stream knows where its end is, otherwise by reading and discarding.
pub(crate) fn default_skip_up_to<T: Element, I: Io<T> + ?Sized>(io: &mut I, count: i64) -> Result<Option<u64>> {
    let count = non_negative(count)?;
    if count == 0 {
        return Ok(Some(0));
    }
    let capabilities = io.capabilities();
    if capabilities.contains(Capabilities::SEEK | Capabilities::SIZE) {
        let position = io.position()?;
        let remaining = io.size()?.saturating_sub(position);
        if remaining == 0 {
            return Ok(None);
        }
        let skip = count.min(remaining);
        io.seek(SeekOrigin::Start, (position + skip) as i64)?;
        return Ok(Some(skip));
    }
    let mut scratch = vec![T::default(); count.min(SKIP_SCRATCH as u64) as usize];
    Ok(io.read_or_eof(&mut scratch)?.map(|n| n as u64))
}

impl<T: Element, I: Io<T> + ?Sized> Io<T> for Box<I> {
    fn capabilities(&self) -> Capabilities { (**self).capabilities() }
    fn is_closed(&self) -> bool { (**self).is_closed() }
    fn close(&mut self) -> Result<()> { (**self).close() }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> { (**self).on_close(listener) }
    fn read(&mut self, buf: &mut [T]) -> Result<usize> { (**self).read(buf) }
    fn write(&mut self, buf: &[T]) -> Result<usize> { (**self).write(buf) }
    fn flush(&mut self) -> Result<()> { (**self).flush() }
    fn size(&mut self) -> Result<u64> { (**self).size() }
    fn position(&mut self) -> Result<u64> { (**self).position() }
    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> { (**self).seek(origin, offset) }
    fn set_size(&mut self, size: i64) -> Result<()> { (**self).set_size(size) }
    fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> { (**self).skip_up_to(count) }
}

/**
A stream shared between several owners, such as a parent windowed by more than one [crate::io::Sub].

Each call locks for its duration only; owners must not assume the position is where they left it.
*/
impl<T: Element, I: Io<T> + ?Sized> Io<T> for Arc<Mutex<I>> {
    fn capabilities(&self) -> Capabilities { lock(self).capabilities() }
    fn is_closed(&self) -> bool { lock(self).is_closed() }
    fn close(&mut self) -> Result<()> { lock(self).close() }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> { lock(self).on_close(listener) }
    fn read(&mut self, buf: &mut [T]) -> Result<usize> { lock(self).read(buf) }
    fn write(&mut self, buf: &[T]) -> Result<usize> { lock(self).write(buf) }
    fn flush(&mut self) -> Result<()> { lock(self).flush() }
    fn size(&mut self) -> Result<u64> { lock(self).size() }
    fn position(&mut self) -> Result<u64> { lock(self).position() }
    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> { lock(self).seek(origin, offset) }
    fn set_size(&mut self, size: i64) -> Result<()> { lock(self).set_size(size) }
    fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> { lock(self).skip_up_to(count) }
}

fn lock<I: ?Sized>(shared: &Mutex<I>) -> std::sync::MutexGuard<'_, I> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

///Resolves a child's size: directly if it knows it, otherwise by seeking to its end and back.
pub(crate) fn resolve_size<T: Element, I: Io<T> + ?Sized>(io: &mut I) -> Result<u64> {
    let capabilities = io.capabilities();
    if capabilities.contains(Capabilities::SIZE) {
        io.size()
    }
    else if capabilities.contains(Capabilities::SEEK) {
        let position = io.position()?;
        let end = io.seek(SeekOrigin::End, 0)?;
        io.seek(SeekOrigin::Start, position as i64)?;
        Ok(end)
    }
    else {
        Err(Error::Unsupported(Capabilities::SIZE))
    }
}

#[cfg(test)] mod tests {
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use super::*;

    #[test] fn listeners_fire_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners = CloseListeners::new();
        let c = count.clone();
        listeners.add(Box::new(move || { c.fetch_add(1, Ordering::SeqCst); Ok(()) })).unwrap();
        listeners.close().unwrap();
        listeners.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        //late listeners run right away
        let c = count.clone();
        listeners.add(Box::new(move || { c.fetch_add(1, Ordering::SeqCst); Ok(()) })).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test] fn failing_listener_does_not_stop_the_rest() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners = CloseListeners::new();
        listeners.add(Box::new(|| Err(Error::InvalidArgument("boom")))).unwrap();
        let c = count.clone();
        listeners.add(Box::new(move || { c.fetch_add(1, Ordering::SeqCst); Ok(()) })).unwrap();
        let r = listeners.close();
        assert!(matches!(r, Err(Error::InvalidArgument("boom"))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test] fn seek_targets() {
        assert_eq!(seek_target(5, -5).unwrap(), 0);
        assert_eq!(seek_target(5, 3).unwrap(), 8);
        assert!(matches!(seek_target(5, -6), Err(Error::InvalidArgument(_))));
    }

    #[test] fn shared_forwards() {
        let memory = crate::test::Memory::from_slice(b"hello");
        let mut shared: Arc<Mutex<dyn Io<u8>>> = Arc::new(Mutex::new(memory));
        assert_eq!(shared.size().unwrap(), 5);
        let mut buf = [0u8; 2];
        shared.seek(SeekOrigin::Start, 3).unwrap();
        shared.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"lo");
    }

    #[test] fn default_skip_reads_when_unsized() {
        let memory = crate::test::Memory::from_slice(b"hello");
        let mut hidden = crate::test::Unsized::new(memory);
        assert_eq!(hidden.skip_up_to(3).unwrap(), Some(3));
        assert_eq!(hidden.skip_up_to(10).unwrap(), Some(2));
        assert_eq!(hidden.skip_up_to(1).unwrap(), None);
        assert!(matches!(hidden.skip_up_to(-1), Err(Error::NegativeValue(-1))));
    }

    #[test] fn resolve_size_by_seeking() {
        let memory = crate::test::Memory::from_slice(b"hello");
        let mut seek_only = crate::test::Unsized::seekable(memory);
        seek_only.seek(SeekOrigin::Start, 2).unwrap();
        assert_eq!(resolve_size::<u8, _>(&mut seek_only).unwrap(), 5);
        assert_eq!(seek_only.position().unwrap(), 2);
    }
}
