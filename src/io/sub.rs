use crate::capability::{seek_target, Capabilities, CloseListener, CloseListeners, Element, Io, SeekOrigin};
use crate::error::{non_negative, Error, Result};

/**
A window `[start, start + size)` of a seekable parent, exposed as a stream of its own.

The window keeps its own position and re-seeks the parent before every transfer, so several windows (or other
owners) can share one parent, typically through an `Arc<Mutex<_>>`.  Reads and writes never leave the window.  If the
parent appends, seeking past the end of the window grows it.
*/
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
    /**
    Windows `size` elements of `parent` starting at `start`.

    Fails with [Error::Unsupported] if the parent can't seek.
    */
    pub fn new<T: Element>(parent: P, start: i64, size: i64, close_parent: bool) -> Result<Self> where P: Io<T> {
        let start = non_negative(start)?;
        let size = non_negative(size)?;
        if !parent.capabilities().contains(Capabilities::SEEK) {
            return Err(Error::Unsupported(Capabilities::SEEK));
        }
        Ok(Sub { parent, start, size, position: 0, close_parent, listeners: CloseListeners::new() })
    }
    pub fn start(&self) -> u64 {
        self.start
    }
    pub fn parent(&self) -> &P {
        &self.parent
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

impl<P> Sub<P> {
    ///Seeks the parent to where this window's position lands.
    fn attach<T: Element>(&mut self) -> Result<()> where P: Io<T> {
        self.parent.seek(SeekOrigin::Start, (self.start + self.position) as i64)?;
        Ok(())
    }
}

impl<T: Element, P: Io<T>> Io<T> for Sub<P> {
    fn capabilities(&self) -> Capabilities {
        let inherited = self.parent.capabilities() & (Capabilities::READ | Capabilities::WRITE | Capabilities::APPEND);
        inherited | Capabilities::SEEK | Capabilities::SIZE
    }
    fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }
    fn close(&mut self) -> Result<()> {
        if self.listeners.is_closed() {
            return Ok(());
        }
        let parent = if self.close_parent {
            self.parent.close().map_err(|e| {
                log::warn!("closing window parent failed: {e}");
                e
            })
        } else {
            Ok(())
        };
        let listeners = self.listeners.close();
        parent.and(listeners)
    }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> {
        self.listeners.add(listener)
    }

    fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.remaining().min(buf.len() as u64) as usize;
        if limit == 0 {
            return Err(Error::EndOfStream);
        }
        self.attach::<T>()?;
        let n = self.parent.read(&mut buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[T]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.remaining().min(buf.len() as u64) as usize;
        if limit == 0 {
            return Err(Error::EndOfStream);
        }
        self.attach::<T>()?;
        let n = self.parent.write(&buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.parent.flush()
    }

    fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.size)
    }

    fn position(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.position)
    }

    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
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
            //the parent has to grow with the window
            self.parent.seek(SeekOrigin::Start, (self.start + target) as i64)?;
            log::trace!("window at {} grew from {} to {target}", self.start, self.size);
            self.size = target;
        }
        self.position = target;
        Ok(target)
    }

    fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
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
    use crate::capability::{Capabilities, Io, SeekOrigin};
    use crate::error::Error;
    use crate::test::{Memory, Unsized};
    use super::Sub;

    fn parent(data: &[u8]) -> Arc<Mutex<Memory<u8>>> {
        Arc::new(Mutex::new(Memory::from_slice(data)))
    }

    #[test] fn reads_exactly_the_window() {
        let mut sub = Sub::new(Memory::from_slice(b"0123456789"), 3, 4, false).unwrap();
        assert_eq!(sub.size().unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(sub.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"3456");
        assert!(matches!(sub.read(&mut buf), Err(Error::EndOfStream)));
        assert_eq!(sub.read_or_eof(&mut buf).unwrap(), None);
    }

    #[test] fn writes_land_in_the_parent() {
        let shared = parent(b"..........");
        let mut sub = Sub::new(shared.clone(), 2, 3, false).unwrap();
        sub.seek(SeekOrigin::Start, 1).unwrap();
        assert_eq!(sub.write(b"abcd").unwrap(), 2);
        assert!(sub.write_all(b"x").unwrap_err().is_end_of_stream());
        assert_eq!(shared.lock().unwrap().contents(), b"...ab.....");
        sub.flush().unwrap();
        assert_eq!(shared.lock().unwrap().flushes(), 1);
    }

    #[test] fn windows_share_a_parent() {
        let shared = parent(b"hello world");
        let mut hello = Sub::new(shared.clone(), 0, 5, false).unwrap();
        let mut world = Sub::new(shared.clone(), 6, 5, false).unwrap();
        let mut a = [0u8; 2];
        let mut b = [0u8; 3];
        hello.read_fully(&mut a).unwrap();
        world.read_fully(&mut b).unwrap();
        hello.read_fully(&mut b).unwrap();
        assert_eq!(&a, b"he");
        assert_eq!(&b, b"llo");
        world.read_fully(&mut a).unwrap();
        assert_eq!(&a, b"ld");
    }

    #[test] fn seek_policy() {
        let mut sub = Sub::new(Memory::from_slice(b"0123456789"), 2, 5, false).unwrap();
        assert_eq!(sub.seek(SeekOrigin::End, 0).unwrap(), 5);
        assert_eq!(sub.seek(SeekOrigin::Current, -2).unwrap(), 3);
        assert!(matches!(sub.seek(SeekOrigin::Start, 6), Err(Error::EndOfStream)));
        assert!(matches!(sub.seek(SeekOrigin::Current, -4), Err(Error::InvalidArgument(_))));
        assert_eq!(sub.position().unwrap(), 3);
        let mut buf = [0u8; 2];
        sub.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"56");
    }

    #[test] fn appendable_parent_grows_the_window() {
        let shared = Arc::new(Mutex::new(Memory::appendable(b"abc".to_vec())));
        let mut sub = Sub::new(shared.clone(), 1, 2, false).unwrap();
        assert!(sub.capabilities().contains(Capabilities::APPEND));
        assert_eq!(sub.seek(SeekOrigin::Start, 4).unwrap(), 4);
        assert_eq!(sub.size().unwrap(), 4);
        assert_eq!(shared.lock().unwrap().contents(), &[b'a', b'b', b'c', 0, 0]);
        sub.seek(SeekOrigin::Start, 2).unwrap();
        sub.write_all(b"de").unwrap();
        assert_eq!(shared.lock().unwrap().contents(), b"abcde");
    }

    #[test] fn skipping_is_bookkeeping() {
        let mut sub = Sub::new(Memory::from_slice(b"0123456789"), 4, 3, false).unwrap();
        assert_eq!(sub.skip_up_to(2).unwrap(), Some(2));
        assert_eq!(sub.skip_up_to(5).unwrap(), Some(1));
        assert_eq!(sub.skip_up_to(1).unwrap(), None);
        assert!(matches!(sub.skip_up_to(-1), Err(Error::NegativeValue(-1))));
        sub.seek(SeekOrigin::Start, 0).unwrap();
        sub.skip_fully(2).unwrap();
        assert!(sub.skip_fully(2).unwrap_err().is_end_of_stream());
    }

    #[test] fn close_optionally_closes_parent() {
        let shared = parent(b"abc");
        let mut keep = Sub::new(shared.clone(), 0, 3, false).unwrap();
        keep.close().unwrap();
        assert!(!shared.lock().unwrap().is_closed());
        assert!(matches!(keep.read(&mut [0u8; 1]), Err(Error::Closed)));
        let mut owning = Sub::new(shared.clone(), 0, 3, true).unwrap();
        owning.close().unwrap();
        owning.close().unwrap();
        assert!(shared.lock().unwrap().is_closed());
    }

    #[test] fn rejects_bad_parents() {
        let unseekable = Unsized::new(Memory::from_slice(b"abc"));
        assert!(matches!(Sub::new(unseekable, 0, 1, false), Err(Error::Unsupported(c)) if c == Capabilities::SEEK));
        assert!(matches!(Sub::new(Memory::from_slice(b"abc"), -1, 1, false), Err(Error::NegativeValue(-1))));
        assert!(matches!(Sub::new(Memory::from_slice(b"abc"), 0, -3, false), Err(Error::NegativeValue(-3))));
    }

    #[test] fn window_inside_a_composite() {
        use crate::io::{Composite, Options};
        let shared = parent(b"0123456789");
        let children: Vec<Box<dyn Io<u8>>> = vec![
            Box::new(Sub::new(shared.clone(), 7, 3, false).unwrap()),
            Box::new(Sub::new(shared.clone(), 0, 3, false).unwrap()),
        ];
        let mut composite = Composite::new(children, Options::new());
        let mut buf = [0u8; 6];
        composite.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"789012");
    }
}
