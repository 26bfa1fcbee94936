use async_trait::async_trait;
use crate::capability::{seek_target, Capabilities, CloseListener, CloseListeners, Element, SeekOrigin};
use crate::error::{non_negative, Error, Result};
use super::capability::AsyncIo;

///The reactive [crate::io::Sub]: a window of a seekable parent whose operations suspend.
#[derive(Debug)]
pub struct Sub<P> {
    parent: P,
    start: u64,
    size: u64,
    position: u64,
    close_parent: bool,
    listeners: CloseListeners,
}

impl<P> Sub<P> {
    pub fn new<T: Element>(parent: P, start: i64, size: i64, close_parent: bool) -> Result<Self> where P: AsyncIo<T> {
        let start = non_negative(start)?;
        let size = non_negative(size)?;
        if !parent.capabilities().contains(Capabilities::SEEK) {
            return Err(Error::Unsupported(Capabilities::SEEK));
        }
        Ok(Sub { parent, start, size, position: 0, close_parent, listeners: CloseListeners::new() })
    }
    pub fn into_parent(self) -> P {
        self.parent
    }
    fn check_open(&self) -> Result<()> {
        if self.listeners.is_closed() { Err(Error::Closed) } else { Ok(()) }
    }
    fn remaining(&self) -> u64 {
        self.size - self.position
    }
}

#[async_trait]
impl<T: Element, P: AsyncIo<T>> AsyncIo<T> for Sub<P> {
    fn capabilities(&self) -> Capabilities {
        let inherited = self.parent.capabilities() & (Capabilities::READ | Capabilities::WRITE | Capabilities::APPEND);
        inherited | Capabilities::SEEK | Capabilities::SIZE
    }
    fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }
    async fn close(&mut self) -> Result<()> {
        if self.listeners.is_closed() {
            return Ok(());
        }
        let parent = if self.close_parent { self.parent.close().await } else { Ok(()) };
        if let Err(e) = &parent {
            log::warn!("closing window parent failed: {e}");
        }
        let listeners = self.listeners.close();
        parent.and(listeners)
    }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> {
        self.listeners.add(listener)
    }

    async fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.remaining().min(buf.len() as u64) as usize;
        if limit == 0 {
            return Err(Error::EndOfStream);
        }
        self.parent.seek(SeekOrigin::Start, (self.start + self.position) as i64).await?;
        let n = self.parent.read(&mut buf[..limit]).await?;
        self.position += n as u64;
        Ok(n)
    }

    async fn write(&mut self, buf: &[T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.remaining().min(buf.len() as u64) as usize;
        if limit == 0 {
            return Err(Error::EndOfStream);
        }
        self.parent.seek(SeekOrigin::Start, (self.start + self.position) as i64).await?;
        let n = self.parent.write(&buf[..limit]).await?;
        self.position += n as u64;
        Ok(n)
    }

    async fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.parent.flush().await
    }

    async fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.size)
    }

    async fn position(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.position)
    }

    async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        self.check_open()?;
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position,
            SeekOrigin::End => self.size,
        };
        let target = seek_target(base, offset)?;
        if target > self.size {
            if !self.parent.capabilities().contains(Capabilities::WRITE | Capabilities::APPEND) {
                return Err(Error::EndOfStream);
            }
            self.parent.seek(SeekOrigin::Start, (self.start + target) as i64).await?;
            self.size = target;
        }
        self.position = target;
        Ok(target)
    }

    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        let count = non_negative(count)?;
        self.check_open()?;
        if count == 0 {
            return Ok(Some(0));
        }
        if self.remaining() == 0 {
            return Ok(None);
        }
        let skip = count.min(self.remaining());
        self.position += skip;
        Ok(Some(skip))
    }
}

#[cfg(test)] mod tests {
    use std::sync::{Arc, Mutex};
    use crate::capability::{Io as _, SeekOrigin};
    use crate::error::Error;
    use crate::io::Options;
    use crate::reactive::{AsyncIo, Composite, Inline};
    use crate::test::{poll_inline, Memory};
    use super::Sub;

    #[test] fn window_reads_and_writes() {
        let shared = Arc::new(Mutex::new(Memory::from_slice(b"0123456789")));
        let mut sub = Sub::new(Inline(shared.clone()), 2, 4, true).unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(poll_inline(sub.read(&mut buf)).unwrap().unwrap(), 4);
        assert_eq!(&buf[..4], b"2345");
        assert!(matches!(poll_inline(sub.read(&mut buf)).unwrap(), Err(Error::EndOfStream)));
        poll_inline(sub.seek(SeekOrigin::End, -1)).unwrap().unwrap();
        poll_inline(sub.write_all(b"x")).unwrap().unwrap();
        assert_eq!(shared.lock().unwrap().contents(), b"01234x6789");
        assert!(matches!(poll_inline(sub.seek(SeekOrigin::Start, 5)).unwrap(), Err(Error::EndOfStream)));
        poll_inline(sub.close()).unwrap().unwrap();
        assert!(shared.lock().unwrap().is_closed());
    }

    #[test] fn windows_as_composite_children() {
        let shared = Arc::new(Mutex::new(Memory::from_slice(b"abcdef")));
        let children: Vec<Box<dyn AsyncIo<u8>>> = vec![
            Box::new(Sub::new(Inline(shared.clone()), 4, 2, false).unwrap()),
            Box::new(Sub::new(Inline(shared.clone()), 0, 4, false).unwrap()),
        ];
        let mut composite = Composite::new(children, Options::new());
        let mut buf = [0u8; 6];
        poll_inline(composite.read_fully(&mut buf)).unwrap().unwrap();
        assert_eq!(&buf, b"efabcd");
        assert_eq!(poll_inline(composite.skip_up_to(1)).unwrap().unwrap(), None);
    }
}
