/*!
The async cursor: walks a [Chain] of reactive children.

There are two ways to get somewhere.  The sequential cursor lives in the chain and is reused from call to call;
moving it costs nothing within a segment and one step per segment crossed.  It serves reads, writes, and relative
seeks.  The locate cursor is stateless: it scans from the first live segment, resolving sizes as it goes, and serves
absolute seeks.

Both are expressed as transitions between [Step]s, driven by a loop in [Traversal::travel].
*/
use crate::capability::{seek_target, Capabilities, Element, SeekOrigin};
use crate::chain::{Chain, Cursor, Locate};
use crate::error::{Error, Result};
use crate::io::Options;
use super::capability::{resolve_size, AsyncIo};

pub(crate) type Child<T> = Box<dyn AsyncIo<T>>;

///Where a traversal is.
#[derive(Debug)]
pub(crate) enum Step {
    ///Scanning from the first live segment.
    Locating,
    ///The target is known; attach to it.
    AtTarget { segment: usize, local: u64 },
    ///The target is at or after the sequential cursor.
    AdvancingForward,
    ///The target is before the sequential cursor.
    AdvancingBackward,
    Failed(Error),
}

fn collected() -> Error {
    Error::InvalidArgument("segment was already collected")
}

///Segments, cursor, and the bookkeeping every reactive composite operation shares.
pub(crate) struct Traversal<T: Element> {
    pub(crate) chain: Chain<Child<T>>,
    pub(crate) options: Options,
    ///Error from bookkeeping that happened after a transfer already succeeded.
    pub(crate) deferred: Option<Error>,
}

impl<T: Element> Traversal<T> {
    pub(crate) fn new(children: Vec<Child<T>>, options: Options) -> Self {
        Traversal { chain: Chain::new(children), options, deferred: None }
    }

    pub(crate) fn take_deferred(&mut self) -> Result<()> {
        match self.deferred.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn child(&mut self) -> Result<&mut Child<T>> {
        self.chain.child_mut(self.chain.cursor.segment).ok_or_else(collected)
    }

    ///Whether the cursor's child is the last one and grows on writes past its end.
    pub(crate) fn current_appends(&self) -> bool {
        let segment = self.chain.cursor.segment;
        segment + 1 == self.chain.len() && self.chain.child(segment)
            .map_or(false, |c| c.capabilities().contains(Capabilities::WRITE | Capabilities::APPEND))
    }

    ///Brings the current child's own position in line with the cursor.
    pub(crate) async fn attach(&mut self) -> Result<()> {
        if self.chain.at_end() || self.chain.cursor.attached {
            return Ok(());
        }
        let segment = self.chain.cursor.segment;
        let local = self.chain.cursor.local;
        let known = self.chain.size(segment);
        let child = self.chain.child_mut(segment).ok_or_else(collected)?;
        let capabilities = child.capabilities();
        if capabilities.contains(Capabilities::SEEK) {
            child.seek(SeekOrigin::Start, local as i64).await?;
        }
        else if local != 0 {
            return Err(Error::Unsupported(Capabilities::SEEK));
        }
        let size = match known {
            None if capabilities.contains(Capabilities::SIZE) => Some(child.size().await?),
            known => known,
        };
        if let Some(size) = size {
            self.chain.set_size(segment, size.max(local));
        }
        self.chain.cursor.attached = true;
        Ok(())
    }

    ///Crosses into the next segment: flushes the outgoing child, and collects it if asked to.
    pub(crate) async fn advance(&mut self) -> Result<()> {
        let outgoing = self.chain.step_forward();
        let flushed = self.retire(outgoing).await;
        if self.options.collects() {
            let closed = self.collect(outgoing).await;
            return flushed.and(closed);
        }
        flushed
    }

    async fn retire(&mut self, segment: usize) -> Result<()> {
        match self.chain.child_mut(segment) {
            Some(child) if child.capabilities().contains(Capabilities::WRITE) => child.flush().await,
            _ => Ok(()),
        }
    }

    async fn collect(&mut self, segment: usize) -> Result<()> {
        let Some(mut child) = self.chain.collect(segment) else {
            return Ok(());
        };
        log::debug!("collected reactive segment {segment}");
        if self.options.closes_children() {
            child.close().await?;
        }
        Ok(())
    }

    async fn collect_before(&mut self, segment: usize) -> Result<()> {
        let mut result = Ok(());
        while self.chain.floor() < segment {
            let floor = self.chain.floor();
            result = result.and(self.retire(floor).await);
            result = result.and(self.collect(floor).await);
        }
        result
    }

    ///Eagerly crosses a boundary the cursor just reached, deferring any error to the next call.
    pub(crate) async fn after_transfer(&mut self) {
        let has_next = self.chain.cursor.segment + 1 < self.chain.len();
        if has_next && self.chain.remaining() == Some(0) {
            if let Err(e) = self.advance().await {
                log::debug!("deferring error from crossing a boundary: {e}");
                self.deferred = Some(e);
            }
        }
    }

    ///Parks the cursor at the end of the last child so an append can continue it.
    pub(crate) async fn reattach_last(&mut self) -> Result<()> {
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
            None => resolve_size::<T, _>(child).await?,
        };
        self.chain.set_size(last, size);
        self.chain.place(last, size, global);
        Ok(())
    }

    async fn size_of(&mut self, segment: usize) -> Result<u64> {
        if let Some(size) = self.chain.size(segment) {
            return Ok(size);
        }
        let child = self.chain.child_mut(segment).ok_or_else(collected)?;
        let size = resolve_size::<T, _>(child).await?;
        self.chain.set_size(segment, size);
        Ok(size)
    }

    pub(crate) async fn total(&mut self) -> Result<u64> {
        for segment in self.chain.unsized_segments() {
            self.size_of(segment).await?;
        }
        self.chain.total().ok_or(Error::Unsupported(Capabilities::SIZE))
    }

    /**
    Seeks the sequential cursor, picking the traversal that fits the origin.

    On failure the cursor goes back to where it was, unless walking forward already collected that segment, in which
    case it stays at the last boundary it crossed.
    */
    pub(crate) async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        let before = self.chain.cursor;
        let result = self.seek_from(origin, offset).await;
        if result.is_err() {
            self.restore(before);
        }
        result
    }

    fn restore(&mut self, origin: Cursor) {
        if origin.segment < self.chain.floor() {
            return;
        }
        //a seekable child may have been moved; an unseekable one can only be where it was
        let seekable = self.chain.child(origin.segment)
            .map_or(false, |c| c.capabilities().contains(Capabilities::SEEK));
        self.chain.cursor = Cursor { attached: origin.attached && !seekable, ..origin };
    }

    ///Collects what a successful seek left behind, deferring errors to the next call.
    async fn collect_passed(&mut self, segment: usize) {
        if !self.options.collects() {
            return;
        }
        if let Err(e) = self.collect_before(segment).await {
            log::debug!("deferring error from collecting before segment {segment}: {e}");
            self.deferred = Some(e);
        }
    }

    async fn seek_from(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        let (base, step) = match origin {
            SeekOrigin::Start => (0, Step::Locating),
            SeekOrigin::End => (self.total().await?, Step::Locating),
            SeekOrigin::Current => {
                let step = if offset >= 0 { Step::AdvancingForward } else { Step::AdvancingBackward };
                (self.chain.cursor.global, step)
            }
        };
        let target = seek_target(base, offset)?;
        if target == self.chain.cursor.global {
            return Ok(target);
        }
        self.travel(target, step).await
    }

    ///Runs steps until the cursor rests at `target` or a step fails.
    async fn travel(&mut self, target: u64, mut step: Step) -> Result<u64> {
        loop {
            log::trace!("traversal towards {target}: {step:?}");
            step = match step {
                Step::Locating => match self.chain.locate(target) {
                    Locate::NeedSize { segment } => {
                        self.size_of(segment).await?;
                        Step::Locating
                    }
                    Locate::Found { segment, local } => Step::AtTarget { segment, local },
                    Locate::End => {
                        self.chain.place_at_end(target);
                        self.collect_passed(self.chain.len()).await;
                        return Ok(target);
                    }
                    Locate::Beyond { total } => self.beyond(target, total),
                    Locate::Collected => Step::Failed(Error::InvalidArgument("seek target lies in a collected segment")),
                },
                Step::AtTarget { segment, local } => {
                    let here = self.chain.cursor;
                    self.chain.place(segment, local, target);
                    if let Err(e) = self.attach().await {
                        self.restore(here);
                        return Err(e);
                    }
                    self.collect_passed(segment).await;
                    return Ok(target);
                }
                Step::AdvancingForward => {
                    let segment = self.chain.cursor.segment;
                    if self.chain.at_end() || segment + 1 == self.chain.len() {
                        //past the last boundary, End and Beyond are the locate cursor's business
                        let start = self.chain.cursor.segment_start();
                        match self.chain.size(segment) {
                            Some(size) if target < start + size => Step::AtTarget { segment, local: target - start },
                            _ => Step::Locating,
                        }
                    }
                    else {
                        let start = self.chain.cursor.segment_start();
                        let size = self.size_of(segment).await?;
                        if target < start + size {
                            Step::AtTarget { segment, local: target - start }
                        }
                        else {
                            self.chain.place(segment, size, start + size);
                            self.advance().await?;
                            Step::AdvancingForward
                        }
                    }
                }
                Step::AdvancingBackward => {
                    let start = self.chain.cursor.segment_start();
                    if !self.chain.at_end() && target >= start {
                        Step::AtTarget { segment: self.chain.cursor.segment, local: target - start }
                    }
                    else if self.chain.step_backward() {
                        Step::AdvancingBackward
                    }
                    else {
                        Step::Failed(Error::InvalidArgument("seek target lies in a collected segment"))
                    }
                }
                Step::Failed(e) => return Err(e),
            }
        }
    }

    ///A target past the end is only reachable by growing an appendable last child.
    fn beyond(&self, target: u64, total: u64) -> Step {
        let Some(last) = self.chain.len().checked_sub(1) else {
            return Step::Failed(Error::EndOfStream);
        };
        let appends = self.chain.child(last)
            .map_or(false, |c| c.capabilities().contains(Capabilities::WRITE | Capabilities::APPEND));
        if !appends {
            return Step::Failed(Error::EndOfStream);
        }
        let start = total - self.chain.size(last).unwrap_or(0);
        Step::AtTarget { segment: last, local: target - start }
    }
}

#[cfg(test)] mod tests {
    use crate::capability::SeekOrigin;
    use crate::error::Error;
    use crate::io::Options;
    use crate::reactive::Inline;
    use crate::test::{poll_inline, Memory, Unsized};
    use super::{Child, Traversal};

    fn traversal(parts: &[&[u8]], options: Options) -> Traversal<u8> {
        let children: Vec<Child<u8>> = parts.iter().map(|p| Box::new(Inline(Memory::from_slice(p))) as Child<u8>).collect();
        Traversal::new(children, options)
    }

    #[test] fn relative_seeks_walk_both_ways() {
        let mut t = traversal(&[b"ab", b"", b"cde", b"f"], Options::new());
        assert_eq!(poll_inline(t.seek(SeekOrigin::Current, 4)).unwrap().unwrap(), 4);
        assert_eq!(t.chain.cursor.segment, 2);
        assert_eq!(t.chain.cursor.local, 2);
        assert_eq!(poll_inline(t.seek(SeekOrigin::Current, -3)).unwrap().unwrap(), 1);
        assert_eq!(t.chain.cursor.segment, 0);
        assert_eq!(poll_inline(t.seek(SeekOrigin::Current, 5)).unwrap().unwrap(), 6);
        assert!(t.chain.at_end());
        assert!(matches!(poll_inline(t.seek(SeekOrigin::Current, 1)).unwrap(), Err(Error::EndOfStream)));
        assert_eq!(poll_inline(t.seek(SeekOrigin::Current, -1)).unwrap().unwrap(), 5);
        assert_eq!(t.chain.cursor.segment, 3);
    }

    #[test] fn locate_resolves_sizes_lazily() {
        let mut t = traversal(&[b"abc", b"defg", b"hi"], Options::new());
        assert_eq!(poll_inline(t.seek(SeekOrigin::Start, 4)).unwrap().unwrap(), 4);
        assert_eq!(t.chain.size(2), None);
        assert_eq!(poll_inline(t.seek(SeekOrigin::End, -1)).unwrap().unwrap(), 8);
        assert_eq!(t.chain.total(), Some(9));
    }

    #[test] fn forward_seeks_collect() {
        let mut t = traversal(&[b"ab", b"cd", b"ef"], Options::new().garbage_collect_on_consume(true));
        poll_inline(t.seek(SeekOrigin::Current, 5)).unwrap().unwrap();
        assert_eq!(t.chain.live(), 1);
        assert!(matches!(poll_inline(t.seek(SeekOrigin::Current, -2)).unwrap(), Err(Error::InvalidArgument(_))));
        assert!(matches!(poll_inline(t.seek(SeekOrigin::Start, 0)).unwrap(), Err(Error::InvalidArgument(_))));
    }

    #[test] fn unseekable_children_need_sequential_access() {
        let children: Vec<Child<u8>> = vec![Box::new(Inline(Unsized::new(Memory::from_slice(b"abc"))))];
        let mut t = Traversal::new(children, Options::new());
        assert!(matches!(poll_inline(t.seek(SeekOrigin::Start, 1)).unwrap(), Err(Error::Unsupported(_))));
    }
}
