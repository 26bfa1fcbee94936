/*!
The ordered segment list behind a composite.

Segments live in an arena indexed by their order.  A garbage-collected segment keeps its slot (and its size, which
is always known by the time the cursor has passed it) but loses its child, so indices and start offsets never
shift.  Everything here is pure bookkeeping; talking to children is left to the blocking and reactive composites,
which drive [Chain::locate] and [Chain::step_forward] with their own flavor of I/O.
*/

#[derive(Debug)]
pub(crate) struct Segment<C> {
    ///`None` once collected.
    child: Option<C>,
    ///`None` until resolved.
    size: Option<u64>,
}

/**
Where a composite currently is.

`segment == len` means the cursor sits at the end of the stream, attached to no child.  `attached` records whether
the child's own position is known to equal `local`; it is cleared whenever the cursor moves without telling the
child.
*/
#[derive(Debug,Clone,Copy,PartialEq,Eq,Default)]
pub(crate) struct Cursor {
    pub(crate) segment: usize,
    pub(crate) local: u64,
    pub(crate) global: u64,
    pub(crate) attached: bool,
}

impl Cursor {
    ///Start offset of the cursor's segment.
    pub(crate) fn segment_start(&self) -> u64 {
        self.global - self.local
    }
}

///Outcome of one [Chain::locate] pass.
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub(crate) enum Locate {
    ///`target` lies in `segment` at `local`.
    Found { segment: usize, local: u64 },
    ///`target` is exactly the end of the stream.
    End,
    ///`target` lies past the end of a stream of `total` elements.
    Beyond { total: u64 },
    ///The size of `segment` has to be resolved before locating can go on.
    NeedSize { segment: usize },
    ///`target` lies in a segment that was already collected.
    Collected,
}

#[derive(Debug)]
pub(crate) struct Chain<C> {
    segments: Vec<Segment<C>>,
    ///Index of the first segment that hasn't been collected.
    floor: usize,
    pub(crate) cursor: Cursor,
}

impl<C> Chain<C> {
    pub(crate) fn new(children: Vec<C>) -> Self {
        Chain {
            segments: children.into_iter().map(|child| Segment { child: Some(child), size: None }).collect(),
            floor: 0,
            cursor: Cursor::default(),
        }
    }
    ///Appends a segment.  If the cursor was parked at the end, it now sits at the start of the new segment.
    pub(crate) fn push(&mut self, child: C) {
        self.segments.push(Segment { child: Some(child), size: None });
    }
    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }
    ///Segments whose child hasn't been collected.
    pub(crate) fn live(&self) -> usize {
        self.segments[self.floor..].iter().filter(|s| s.child.is_some()).count()
    }
    pub(crate) fn floor(&self) -> usize {
        self.floor
    }
    pub(crate) fn at_end(&self) -> bool {
        self.cursor.segment >= self.segments.len()
    }
    pub(crate) fn child(&self, segment: usize) -> Option<&C> {
        self.segments.get(segment).and_then(|s| s.child.as_ref())
    }
    pub(crate) fn child_mut(&mut self, segment: usize) -> Option<&mut C> {
        self.segments.get_mut(segment).and_then(|s| s.child.as_mut())
    }
    pub(crate) fn size(&self, segment: usize) -> Option<u64> {
        self.segments.get(segment).and_then(|s| s.size)
    }
    pub(crate) fn set_size(&mut self, segment: usize, size: u64) {
        if let Some(s) = self.segments.get_mut(segment) {
            s.size = Some(size);
        }
    }
    ///Segments whose size is still unknown.
    pub(crate) fn unsized_segments(&self) -> Vec<usize> {
        (self.floor..self.segments.len()).filter(|&i| self.segments[i].size.is_none()).collect()
    }
    ///Sum of all sizes, if every one is known.
    pub(crate) fn total(&self) -> Option<u64> {
        self.segments.iter().map(|s| s.size).sum()
    }
    ///Start offset of `segment`, if every earlier size is known.
    pub(crate) fn start_of(&self, segment: usize) -> Option<u64> {
        self.segments[..segment.min(self.segments.len())].iter().map(|s| s.size).sum()
    }
    ///Elements left in the cursor's segment, if its size is known.
    pub(crate) fn remaining(&self) -> Option<u64> {
        self.size(self.cursor.segment).map(|size| size.saturating_sub(self.cursor.local))
    }
    pub(crate) fn children_mut(&mut self) -> impl Iterator<Item=&mut C> {
        self.segments.iter_mut().filter_map(|s| s.child.as_mut())
    }

    ///Advances the cursor by `count` elements within its segment.  Grows the segment's cached size if the cursor
    ///moves past it, which only appendable children allow.
    pub(crate) fn advance_local(&mut self, count: u64) {
        self.cursor.local += count;
        self.cursor.global += count;
        let segment = self.cursor.segment;
        if let Some(size) = self.size(segment) {
            if self.cursor.local > size {
                self.set_size(segment, self.cursor.local);
            }
        }
    }

    /**
    Moves the cursor from the end of its segment to the start of the next one and returns the index it left.

    The cursor's local offset becomes the outgoing segment's size: the cursor only steps forward once it has reached
    the declared size or the child reported its end, whichever came first.
    */
    pub(crate) fn step_forward(&mut self) -> usize {
        let outgoing = self.cursor.segment;
        self.set_size(outgoing, self.cursor.local);
        let global = self.cursor.global;
        self.cursor = Cursor { segment: outgoing + 1, local: 0, global, attached: false };
        log::trace!("chain stepped from segment {outgoing} to {} at {global}", outgoing + 1);
        outgoing
    }

    /**
    Moves the cursor to the end of the previous segment, which must have a known size.

    Returns `false` if there is no previous segment or it was collected.
    */
    pub(crate) fn step_backward(&mut self) -> bool {
        let segment = self.cursor.segment;
        if segment == 0 || segment - 1 < self.floor {
            return false;
        }
        match self.size(segment - 1) {
            Some(size) => {
                let global = self.cursor.segment_start();
                self.cursor = Cursor { segment: segment - 1, local: size, global, attached: false };
                true
            }
            None => false,
        }
    }

    ///Takes the child out of `segment`, leaving a tombstone.  Only the segment right at the floor can be collected.
    pub(crate) fn collect(&mut self, segment: usize) -> Option<C> {
        if segment != self.floor {
            return None;
        }
        self.floor += 1;
        self.segments[segment].child.take()
    }

    /**
    One pass of the locate cursor: walks from the first live segment towards `target` using cached sizes.

    Stops with [Locate::NeedSize] at the first unknown size; resolve it with [Self::set_size] and call again.
    */
    pub(crate) fn locate(&self, target: u64) -> Locate {
        let Some(mut start) = self.start_of(self.floor) else {
            //collected segments always have their size recorded
            return Locate::NeedSize { segment: self.floor };
        };
        if target < start {
            return Locate::Collected;
        }
        for segment in self.floor..self.segments.len() {
            let Some(size) = self.segments[segment].size else {
                return Locate::NeedSize { segment };
            };
            if target < start + size {
                return Locate::Found { segment, local: target - start };
            }
            start += size;
        }
        if target == start { Locate::End } else { Locate::Beyond { total: start } }
    }

    ///Places the cursor at a located position, unattached.
    pub(crate) fn place(&mut self, segment: usize, local: u64, global: u64) {
        self.cursor = Cursor { segment, local, global, attached: false };
    }
    pub(crate) fn place_at_end(&mut self, total: u64) {
        self.cursor = Cursor { segment: self.segments.len(), local: 0, global: total, attached: false };
    }
}
