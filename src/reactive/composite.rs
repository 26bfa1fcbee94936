use std::fmt::{Debug, Formatter};
use async_trait::async_trait;
use crate::capability::{Capabilities, CloseListener, CloseListeners, Element, SeekOrigin};
use crate::error::{non_negative, Error, Result};
use crate::io::Options;
use super::capability::AsyncIo;
use super::cursor::{Child, Traversal};

/**
The reactive [crate::io::Composite]: the same stitched-together stream, with children that suspend.

Positions, the boundary policy (including the eager advance at the end of a non-final segment), and errors all match
the blocking composite.  Absolute seeks scan from the first live child; relative seeks and transfers walk from
wherever the last call left off.

```
use segio::capability::SeekOrigin;
use segio::io::Options;
use segio::memory::Memory;
use segio::reactive::{AsyncIo, Composite, Inline};
use std::time::Duration;

let mut composite = Composite::<u8>::new(vec![
    Box::new(Inline(Memory::from_slice(b"abc"))) as Box<dyn AsyncIo<u8>>,
    Box::new(Inline(Memory::from_slice(b"defg"))),
], Options::new());
let mut buf = [0u8; 4];
segio::sync::block(Duration::from_secs(1), async {
    composite.seek(SeekOrigin::Start, 3).await?;
    composite.read_fully(&mut buf).await
}).unwrap().unwrap();
assert_eq!(&buf, b"defg");
```
*/
pub struct Composite<T: Element> {
    traversal: Traversal<T>,
    listeners: CloseListeners,
}

impl<T: Element> Debug for Composite<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composite")
            .field("segments", &self.traversal.chain.len())
            .field("cursor", &self.traversal.chain.cursor)
            .field("options", &self.traversal.options)
            .field("closed", &self.listeners.is_closed())
            .finish()
    }
}

impl<T: Element> Composite<T> {
    pub fn new<I>(children: I, options: Options) -> Self where I: IntoIterator<Item=Child<T>> {
        Composite { traversal: Traversal::new(children.into_iter().collect(), options), listeners: CloseListeners::new() }
    }
    pub fn push(&mut self, child: Child<T>) -> Result<()> {
        self.check_open()?;
        self.traversal.chain.push(child);
        Ok(())
    }
    ///Number of children that haven't been collected.
    pub fn len(&self) -> usize {
        self.traversal.chain.live()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<()> {
        if self.listeners.is_closed() { Err(Error::Closed) } else { Ok(()) }
    }
    fn check(&mut self) -> Result<()> {
        self.check_open()?;
        self.traversal.take_deferred()
    }
}

#[async_trait]
impl<T: Element> AsyncIo<T> for Composite<T> {
    fn capabilities(&self) -> Capabilities {
        let chain = &self.traversal.chain;
        let mut capabilities = Capabilities::READ | Capabilities::WRITE | Capabilities::SEEK | Capabilities::SIZE;
        let mut last = Capabilities::empty();
        for segment in chain.floor()..chain.len() {
            let Some(child) = chain.child(segment) else { continue };
            let child = child.capabilities();
            capabilities &= child | Capabilities::SIZE;
            if chain.size(segment).is_none() && !child.intersects(Capabilities::SIZE | Capabilities::SEEK) {
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
    async fn close(&mut self) -> Result<()> {
        if self.listeners.is_closed() {
            return Ok(());
        }
        let mut first_error = self.traversal.deferred.take();
        if self.traversal.options.closes_children() {
            for child in self.traversal.chain.children_mut() {
                if let Err(e) = child.close().await {
                    log::warn!("closing reactive composite child failed: {e}");
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

    async fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let t = &mut self.traversal;
        loop {
            if t.chain.at_end() {
                return Err(Error::EndOfStream);
            }
            if t.chain.remaining() == Some(0) {
                t.advance().await?;
                continue;
            }
            t.attach().await?;
            let limit = t.chain.remaining().map_or(buf.len(), |r| r.min(buf.len() as u64) as usize);
            if limit == 0 {
                t.advance().await?;
                continue;
            }
            match t.child()?.read(&mut buf[..limit]).await {
                Ok(0) | Err(Error::EndOfStream) => t.advance().await?,
                Ok(n) => {
                    t.chain.advance_local(n as u64);
                    t.after_transfer().await;
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write(&mut self, buf: &[T]) -> Result<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let t = &mut self.traversal;
        loop {
            if t.chain.at_end() {
                t.reattach_last().await?;
            }
            let appends = t.current_appends();
            if !appends && t.chain.remaining() == Some(0) {
                t.advance().await?;
                continue;
            }
            t.attach().await?;
            let limit = match t.chain.remaining() {
                Some(remaining) if !appends => remaining.min(buf.len() as u64) as usize,
                _ => buf.len(),
            };
            if limit == 0 {
                t.advance().await?;
                continue;
            }
            let is_last = t.chain.cursor.segment + 1 == t.chain.len();
            match t.child()?.write(&buf[..limit]).await {
                Ok(0) | Err(Error::EndOfStream) => {
                    if is_last {
                        return Err(Error::EndOfStream);
                    }
                    t.advance().await?;
                }
                Ok(n) => {
                    t.chain.advance_local(n as u64);
                    t.after_transfer().await;
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.check()?;
        let mut first_error = None;
        for child in self.traversal.chain.children_mut() {
            if child.capabilities().contains(Capabilities::WRITE) {
                if let Err(e) = child.flush().await {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn size(&mut self) -> Result<u64> {
        self.check()?;
        self.traversal.total().await
    }

    async fn position(&mut self) -> Result<u64> {
        self.check_open()?;
        Ok(self.traversal.chain.cursor.global)
    }

    async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        self.check()?;
        self.traversal.seek(origin, offset).await
    }

    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        let count = non_negative(count)?;
        self.check()?;
        if count == 0 {
            return Ok(Some(0));
        }
        let t = &mut self.traversal;
        loop {
            if t.chain.at_end() {
                return Ok(None);
            }
            if t.chain.remaining() == Some(0) {
                t.advance().await?;
                continue;
            }
            t.attach().await?;
            let seekable = t.child()?.capabilities().contains(Capabilities::SEEK);
            match t.chain.remaining() {
                Some(0) => t.advance().await?,
                Some(remaining) if seekable => {
                    let skip = count.min(remaining);
                    t.chain.advance_local(skip);
                    t.chain.cursor.attached = false;
                    t.after_transfer().await;
                    return Ok(Some(skip));
                }
                remaining => {
                    let request = remaining.map_or(count, |r| r.min(count));
                    match t.child()?.skip_up_to(request as i64).await? {
                        None | Some(0) => t.advance().await?,
                        Some(n) => {
                            t.chain.advance_local(n);
                            t.after_transfer().await;
                            return Ok(Some(n));
                        }
                    }
                }
            }
        }
    }
}
