use std::fmt::{Debug, Formatter};
use crate::capability::{resolve_size, seek_target, Capabilities, CloseListener, CloseListeners, Element, Io, SeekOrigin};
use crate::chain::{Chain, Cursor, Locate};
use crate::error::{non_negative, Error, Result};
use super::Options;

/**
Stitches an ordered list of children into one stream.

Position `p` of the composite is position `p - start` of the child whose range covers it, where `start` is the sum of
the sizes of the children before it.  Sizes are resolved lazily: sequential reads and writes work over children that
never report a size, moving on whenever a child reports [Error::EndOfStream].  Seeking and [Io::size] need the sizes
of the children they walk past.

Exhausting a child's size (other than the last one's) moves the cursor to the start of the next child right away,
flushing the outgoing child and, under [Options::garbage_collect_on_consume], dropping it.  The incoming child isn't
touched until the next operation.

```
use segio::capability::{Io, SeekOrigin};
use segio::io::{Composite, Options};
use segio::memory::Memory;

let mut composite = Composite::<u8>::new(vec![
    Box::new(Memory::from_slice(b"abc")) as Box<dyn Io<u8>>,
    Box::new(Memory::from_slice(b"")),
    Box::new(Memory::from_slice(b"defg")),
], Options::new());
assert_eq!(composite.size().unwrap(), 7);
composite.seek(SeekOrigin::Start, 3).unwrap();
let mut buf = [0u8; 4];
composite.read_fully(&mut buf).unwrap();
assert_eq!(&buf, b"defg");
assert!(composite.read(&mut buf).unwrap_err().is_end_of_stream());
```
*/
pub struct Composite<T: Element> {
    chain: Chain<Box<dyn Io<T>>>,
    options: Options,
    listeners: CloseListeners,
    ///Error from bookkeeping that happened after a transfer already succeeded.  Returned by the next call.
    deferred: Option<Error>,
}

impl<T: Element> Debug for Composite<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composite")
            .field("segments", &self.chain.len())
            .field("live", &self.chain.live())
            .field("cursor", &self.chain.cursor)
            .field("options", &self.options)
            .field("closed", &self.listeners.is_closed())
            .finish()
    }
}

fn collected() -> Error {
    Error::InvalidArgument("segment was already collected")
}

impl<T: Element> Composite<T> {
    pub fn new<I>(children: I, options: Options) -> Self where I: IntoIterator<Item=Box<dyn Io<T>>> {
        Composite {
            chain: Chain::new(children.into_iter().collect()),
            options,
            listeners: CloseListeners::new(),
            deferred: None,
        }
    }
    ///Appends a child after the existing ones, such as the next chunk of an incrementally produced source.
    pub fn push(&mut self, child: Box<dyn Io<T>>) -> Result<()> {
        self.check_open()?;
        self.chain.push(child);
        Ok(())
    }
    ///Number of children that haven't been collected.
    pub fn len(&self) -> usize {
        self.chain.live()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn options(&self) -> Options {
        self.options
    }

    fn check_open(&self) -> Result<()> {
        if self.listeners.is_closed() { Err(Error::Closed) } else { Ok(()) }
    }
    ///Entry check for every operation: closed, or a deferred error from last time.
    fn check(&mut self) -> Result<()> {
        self.check_open()?;
        match self.deferred.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    ///Brings the current child's own position in line with the cursor.
    fn attach(&mut self) -> Result<()> {
        if self.chain.at_end() || self.chain.cursor.attached {
            return Ok(());
        }
        let segment = self.chain.cursor.segment;
        let local = self.chain.cursor.local;
        let known = self.chain.size(segment);
        let child = self.chain.child_mut(segment).ok_or_else(collected)?;
        let capabilities = child.capabilities();
        if capabilities.contains(Capabilities::SEEK) {
            child.seek(SeekOrigin::Start, local as i64)?;
        }
        else if local != 0 {
            return Err(Error::Unsupported(Capabilities::SEEK));
        }
        let size = match known {
            None if capabilities.contains(Capabilities::SIZE) => Some(child.size()?),
            known => known,
        };
        if let Some(size) = size {
            //an appendable child may have grown by seeking past its end
            self.chain.set_size(segment, size.max(local));
        }
        self.chain.cursor.attached = true;
        Ok(())
    }

    ///Crosses into the next segment: flushes the outgoing child, and collects it if asked to.
    fn advance(&mut self) -> Result<()> {
        let outgoing = self.chain.step_forward();
        let mut result = Ok(());
        if let Some(child) = self.chain.child_mut(outgoing) {
            if child.capabilities().contains(Capabilities::WRITE) {
                result = child.flush();
            }
        }
        if self.options.collects() {
            let closed = self.collect(outgoing);
            result = result.and(closed);
        }
        result
    }

    fn collect(&mut self, segment: usize) -> Result<()> {
        let Some(mut child) = self.chain.collect(segment) else {
            return Ok(());
        };
        log::debug!("collected segment {segment}");
        if self.options.closes_children() {
            child.close()?;
        }
        Ok(())
    }

    ///Collects every segment before `segment`.
    fn collect_before(&mut self, segment: usize) -> Result<()> {
        let mut result = Ok(());
        while self.chain.floor() < segment {
            let floor = self.chain.floor();
            if let Some(child) = self.chain.child_mut(floor) {
                if child.capabilities().contains(Capabilities::WRITE) {
                    result = result.and(child.flush());
                }
            }
            result = result.and(self.collect(floor));
        }
        result
    }

    ///Eagerly crosses a boundary the cursor just reached.  Errors are held for the next call, since the transfer
    ///that got us here already succeeded.
    fn after_transfer(&mut self) {
        let has_next = self.chain.cursor.segment + 1 < self.chain.len();
        if has_next && self.chain.remaining() == Some(0) {
            if let Err(e) = self.advance() {
                log::debug!("deferring error from crossing a boundary: {e}");
                self.deferred = Some(e);
            }
        }
    }

    ///Parks the cursor at the end of the last child so an append can continue it.
    fn reattach_last(&mut self) -> Result<()> {
        let Some(last) = self.chain.len().checked_sub(1) else {
            return Err(Error::EndOfStream);
        };
        let global = self.chain.cursor.global;
        let known = self.chain.size(last);
        let Some(child) = self.chain.child_mut(last) else {
            return Err(Error::EndOfStream);
        };
        if !child.capabilities().contains(Capabilities::WRITE | Capabilities::APPEND) {
            return Err(Error::EndOfStream);
        }
        let size = match known {
            Some(size) => size,
            None => resolve_size::<T, _>(child)?,
        };
        self.chain.set_size(last, size);
        self.chain.place(last, size, global);
        Ok(())
    }

    ///Whether the cursor's child is the last one and grows on writes past its end.
    fn current_appends(&mut self) -> bool {
        let segment = self.chain.cursor.segment;
        segment + 1 == self.chain.len() && self.chain.child_mut(segment)
            .map_or(false, |c| c.capabilities().contains(Capabilities::APPEND))
    }

    fn seek_to(&mut self, target: u64) -> Result<u64> {
        loop {
            match self.chain.locate(target) {
                Locate::NeedSize { segment } => {
                    let child = self.chain.child_mut(segment).ok_or_else(collected)?;
                    let size = resolve_size::<T, _>(child)?;
                    self.chain.set_size(segment, size);
                }
                Locate::Found { segment, local } => {
                    self.move_to(segment, local, target)?;
                    return Ok(target);
                }
                Locate::End => {
                    self.chain.place_at_end(target);
                    self.collect_passed(self.chain.len());
                    return Ok(target);
                }
                Locate::Beyond { total } => {
                    let last = self.chain.len().checked_sub(1).ok_or(Error::EndOfStream)?;
                    let appends = self.chain.child_mut(last)
                        .map_or(false, |c| c.capabilities().contains(Capabilities::WRITE | Capabilities::APPEND));
                    if !appends {
                        return Err(Error::EndOfStream);
                    }
                    let start = total - self.chain.size(last).unwrap_or(0);
                    self.move_to(last, target - start, target)?;
                    return Ok(target);
                }
                Locate::Collected => return Err(Error::InvalidArgument("seek target lies in a collected segment")),
            }
        }
    }

    ///Moves the cursor and attaches to the child there.  Nothing is collected unless attaching succeeds.
    fn move_to(&mut self, segment: usize, local: u64, global: u64) -> Result<()> {
        log::trace!("composite seek to segment {segment} local {local} global {global}");
        self.chain.place(segment, local, global);
        self.attach()?;
        self.collect_passed(segment);
        Ok(())
    }

    ///Collects what a successful seek left behind.  The seek already happened, so errors wait for the next call.
    fn collect_passed(&mut self, segment: usize) {
        if !self.options.collects() {
            return;
        }
        if let Err(e) = self.collect_before(segment) {
            log::debug!("deferring error from collecting before segment {segment}: {e}");
            self.deferred = Some(e);
        }
    }

    ///Puts the cursor back where a failed operation found it.
    fn restore(&mut self, origin: Cursor) {
        if origin.segment < self.chain.floor() {
            return;
        }
        //a seekable child may have been moved; an unseekable one can only be where it was
        let seekable = self.chain.child(origin.segment)
            .map_or(false, |c| c.capabilities().contains(Capabilities::SEEK));
        self.chain.cursor = Cursor { attached: origin.attached && !seekable, ..origin };
    }

    fn seek_from(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.chain.cursor.global,
            SeekOrigin::End => self.size()?,
        };
        let target = seek_target(base, offset)?;
        if target == self.chain.cursor.global {
            return Ok(target);
        }
        //within the current segment: no need to walk
        if !self.chain.at_end() {
            let segment = self.chain.cursor.segment;
            let start = self.chain.cursor.segment_start();
            if let Some(size) = self.chain.size(segment) {
                if target >= start && target < start + size {
                    self.chain.place(segment, target - start, target);
                    self.attach()?;
                    return Ok(target);
                }
            }
        }
        self.seek_to(target)
    }
}

impl<T: Element> Io<T> for Composite<T> {
    /**
    READ, WRITE and SEEK when every live child has them.  SIZE when every size not yet known can be resolved.
    APPEND when the last child appends.
    */
    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::READ | Capabilities::WRITE | Capabilities::SEEK | Capabilities::SIZE;
        let mut last = Capabilities::empty();
        for segment in self.chain.floor()..self.chain.len() {
            let Some(child) = self.chain.child(segment) else { continue };
            let child = child.capabilities();
            capabilities &= child | Capabilities::SIZE;
            let resolvable = self.chain.size(segment).is_some() || child.intersects(Capabilities::SIZE | Capabilities::SEEK);
            if !resolvable {
                capabilities.remove(Capabilities::SIZE);
            }
            last = child;
        }
        if last.contains(Capabilities::WRITE | Capabilities::APPEND) {
            capabilities |= Capabilities::APPEND;
        }
        capabilities
    }
    fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }
    fn close(&mut self) -> Result<()> {
        if self.listeners.is_closed() {
            return Ok(());
        }
        let mut first_error = self.deferred.take();
        if self.options.closes_children() {
            for child in self.chain.children_mut() {
                if let Err(e) = child.close() {
                    log::warn!("closing composite child failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Err(e) = self.listeners.close() {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> {
        self.listeners.add(listener)
    }

    fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.chain.at_end() {
                return Err(Error::EndOfStream);
            }
            if self.chain.remaining() == Some(0) {
                self.advance()?;
                continue;
            }
            self.attach()?;
            let limit = self.chain.remaining().map_or(buf.len(), |r| r.min(buf.len() as u64) as usize);
            if limit == 0 {
                //attaching resolved the size to exactly where we are
                self.advance()?;
                continue;
            }
            let child = self.chain.child_mut(self.chain.cursor.segment).ok_or_else(collected)?;
            match child.read(&mut buf[..limit]) {
                Ok(0) | Err(Error::EndOfStream) => self.advance()?,
                Ok(n) => {
                    self.chain.advance_local(n as u64);
                    self.after_transfer();
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write(&mut self, buf: &[T]) -> Result<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.chain.at_end() {
                self.reattach_last()?;
            }
            let appends = self.current_appends();
            if !appends && self.chain.remaining() == Some(0) {
                self.advance()?;
                continue;
            }
            self.attach()?;
            let limit = match self.chain.remaining() {
                Some(remaining) if !appends => remaining.min(buf.len() as u64) as usize,
                _ => buf.len(),
            };
            if limit == 0 {
                self.advance()?;
                continue;
            }
            let is_last = self.chain.cursor.segment + 1 == self.chain.len();
            let child = self.chain.child_mut(self.chain.cursor.segment).ok_or_else(collected)?;
            match child.write(&buf[..limit]) {
                Ok(0) | Err(Error::EndOfStream) => {
                    if is_last {
                        return Err(Error::EndOfStream);
                    }
                    self.advance()?;
                }
                Ok(n) => {
                    self.chain.advance_local(n as u64);
                    self.after_transfer();
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.check()?;
        let mut first_error = None;
        for child in self.chain.children_mut() {
            if child.capabilities().contains(Capabilities::WRITE) {
                if let Err(e) = child.flush() {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn size(&mut self) -> Result<u64> {
        self.check()?;
        for segment in self.chain.unsized_segments() {
            let child = self.chain.child_mut(segment).ok_or_else(collected)?;
            let size = resolve_size::<T, _>(child)?;
            self.chain.set_size(segment, size);
        }
        self.chain.total().ok_or(Error::Unsupported(Capabilities::SIZE))
    }

    fn position(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.chain.cursor.global)
    }

    fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        self.check()?;
        let before = self.chain.cursor;
        self.seek_from(origin, offset).map_err(|e| {
            self.restore(before);
            e
        })
    }

    fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        let count = non_negative(count)?;
        self.check()?;
        if count == 0 {
            return Ok(Some(0));
        }
        loop {
            if self.chain.at_end() {
                return Ok(None);
            }
            if self.chain.remaining() == Some(0) {
                self.advance()?;
                continue;
            }
            self.attach()?;
            let segment = self.chain.cursor.segment;
            let seekable = self.chain.child_mut(segment).ok_or_else(collected)?
                .capabilities().contains(Capabilities::SEEK);
            match self.chain.remaining() {
                Some(0) => self.advance()?,
                Some(remaining) if seekable => {
                    //bookkeeping only; the child is re-seeked on the next transfer
                    let skip = count.min(remaining);
                    self.chain.advance_local(skip);
                    self.chain.cursor.attached = false;
                    self.after_transfer();
                    return Ok(Some(skip));
                }
                remaining => {
                    let request = remaining.map_or(count, |r| r.min(count));
                    let child = self.chain.child_mut(segment).ok_or_else(collected)?;
                    match child.skip_up_to(request as i64)? {
                        None | Some(0) => self.advance()?,
                        Some(n) => {
                            self.chain.advance_local(n);
                            self.after_transfer();
                            return Ok(Some(n));
                        }
                    }
                }
            }
        }
    }
}
