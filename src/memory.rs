/*!
In-memory leaves.

[Memory] is a `Vec`-backed stream with every capability, and [Unsized] hides capabilities of another stream, the way
an incrementally produced source would look.  Both are handy as composite children in tests and examples.
*/
use crate::capability::{seek_target, Capabilities, CloseListener, CloseListeners, Element, Io, SeekOrigin};
use crate::error::{non_negative, Error, Result};

/**
A `Vec`-backed leaf supporting every capability.

Fixed-size by default: reading or writing at the end fails with [Error::EndOfStream].  An appendable memory grows
when written or seeked past its end.
*/
#[derive(Debug)]
pub struct Memory<T> {
    data: Vec<T>,
    position: usize,
    appendable: bool,
    flushes: usize,
    listeners: CloseListeners,
}

impl<T: Element> Memory<T> {
    pub fn new(data: Vec<T>) -> Self {
        Memory { data, position: 0, appendable: false, flushes: 0, listeners: CloseListeners::new() }
    }
    pub fn from_slice(data: &[T]) -> Self {
        Self::new(data.to_vec())
    }
    pub fn appendable(data: Vec<T>) -> Self {
        Memory { appendable: true, ..Self::new(data) }
    }
    pub fn contents(&self) -> &[T] {
        &self.data
    }
    ///Number of times [Io::flush] was called.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
    fn check_open(&self) -> Result<()> {
        if self.listeners.is_closed() { Err(Error::Closed) } else { Ok(()) }
    }
}
impl Memory<char> {
    pub fn from_str(text: &str) -> Self {
        Self::new(text.chars().collect())
    }
}

impl<T: Element> Io<T> for Memory<T> {
    fn capabilities(&self) -> Capabilities {
        let fixed = Capabilities::READ | Capabilities::WRITE | Capabilities::SEEK | Capabilities::SIZE | Capabilities::RESIZE;
        if self.appendable { fixed | Capabilities::APPEND } else { fixed }
    }
    fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }
    fn close(&mut self) -> Result<()> {
        if self.listeners.is_closed() {
            return Ok(());
        }
        self.listeners.close()
    }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> {
        self.listeners.add(listener)
    }
    fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.data.len() {
            return Err(Error::EndOfStream);
        }
        let n = buf.len().min(self.data.len() - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
    fn write(&mut self, buf: &[T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = if self.appendable {
            let end = self.position + buf.len();
            if end > self.data.len() {
                self.data.resize(end, T::default());
            }
            buf.len()
        }
        else if self.position >= self.data.len() {
            return Err(Error::EndOfStream);
        }
        else {
            buf.len().min(self.data.len() - self.position)
        };
        self.data[self.position..self.position + n].copy_from_slice(&buf[..n]);
        self.position += n;
        Ok(n)
    }
    fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.flushes += 1;
        Ok(())
    }
    fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.data.len() as u64)
    }
    fn position(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.position as u64)
    }
    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        self.check_open()?;
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position as u64,
            SeekOrigin::End => self.data.len() as u64,
        };
        let target = seek_target(base, offset)? as usize;
        if target > self.data.len() {
            if !self.appendable {
                return Err(Error::EndOfStream);
            }
            self.data.resize(target, T::default());
        }
        self.position = target;
        Ok(target as u64)
    }
    fn set_size(&mut self, size: i64) -> Result<()> {
        self.check_open()?;
        let size = non_negative(size)? as usize;
        self.data.resize(size, T::default());
        self.position = self.position.min(size);
        Ok(())
    }
}

/**
Hides a stream's size (and optionally its seekability), the way an incrementally produced source would look.
*/
#[derive(Debug)]
pub struct Unsized<I> {
    inner: I,
    seekable: bool,
}
impl<I> Unsized<I> {
    ///Hides both size and seek.
    pub fn new(inner: I) -> Self {
        Unsized { inner, seekable: false }
    }
    ///Hides size but keeps seek.
    pub fn seekable(inner: I) -> Self {
        Unsized { inner, seekable: true }
    }
    pub fn into_inner(self) -> I {
        self.inner
    }
}
impl<T: Element, I: Io<T>> Io<T> for Unsized<I> {
    fn capabilities(&self) -> Capabilities {
        let mut hidden = Capabilities::SIZE | Capabilities::RESIZE;
        if !self.seekable {
            hidden |= Capabilities::SEEK;
        }
        self.inner.capabilities().difference(hidden)
    }
    fn is_closed(&self) -> bool { self.inner.is_closed() }
    fn close(&mut self) -> Result<()> { self.inner.close() }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> { self.inner.on_close(listener) }
    fn read(&mut self, buf: &mut [T]) -> Result<usize> { self.inner.read(buf) }
    fn write(&mut self, buf: &[T]) -> Result<usize> { self.inner.write(buf) }
    fn flush(&mut self) -> Result<()> { self.inner.flush() }
    fn position(&mut self) -> Result<u64> {
        if self.seekable { self.inner.position() } else { Err(Error::Unsupported(Capabilities::SEEK)) }
    }
    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        if self.seekable { self.inner.seek(origin, offset) } else { Err(Error::Unsupported(Capabilities::SEEK)) }
    }
}

#[cfg(test)] mod tests {
    use super::*;

    #[test] fn memory_fixed_size() {
        let mut memory = Memory::from_slice(b"abc");
        assert_eq!(memory.write(b"xyzw").unwrap(), 3);
        assert!(matches!(memory.write(b"q"), Err(Error::EndOfStream)));
        assert!(matches!(memory.seek(SeekOrigin::End, 1), Err(Error::EndOfStream)));
        assert_eq!(memory.contents(), b"xyz");
    }

    #[test] fn memory_resize() {
        let mut memory = Memory::from_slice(b"abcd");
        memory.seek(SeekOrigin::End, 0).unwrap();
        assert!(matches!(memory.set_size(-1), Err(Error::NegativeValue(-1))));
        assert_eq!(memory.contents(), b"abcd");
        memory.set_size(2).unwrap();
        assert_eq!(memory.position().unwrap(), 2);
        assert_eq!(memory.contents(), b"ab");
        memory.set_size(3).unwrap();
        assert_eq!(memory.contents(), &[b'a', b'b', 0]);
    }

    #[test] fn memory_appendable() {
        let mut memory = Memory::appendable(b"ab".to_vec());
        memory.seek(SeekOrigin::End, 0).unwrap();
        memory.write_all(b"cd").unwrap();
        memory.seek(SeekOrigin::End, 2).unwrap();
        assert_eq!(memory.contents(), &[b'a', b'b', b'c', b'd', 0, 0]);
    }

    #[test] fn unsized_hides_capabilities() {
        let hidden = Unsized::new(Memory::from_slice(b"abc"));
        assert_eq!(Io::<u8>::capabilities(&hidden), Capabilities::READ | Capabilities::WRITE);
        let seekable = Unsized::seekable(Memory::from_slice(b"abc"));
        assert!(Io::<u8>::capabilities(&seekable).contains(Capabilities::SEEK));
        assert!(!Io::<u8>::capabilities(&seekable).contains(Capabilities::SIZE));
    }
}
