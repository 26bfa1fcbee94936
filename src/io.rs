/*!
Blocking composition of streams.

There are two ways to build a stream out of other streams:
* [Composite], which stitches an ordered list of children end to end into one virtual stream,
* [Sub], which exposes a window of one seekable parent as a stream of its own.

Both implement [crate::capability::Io] themselves, so they nest.  Calls block the calling thread for as long as the
children do; see [crate::reactive] for the suspending flavor.

|                    | Composite                         | Sub                            |
|--------------------|-----------------------------------|--------------------------------|
| Children           | any number, sizes may be unknown  | one seekable parent            |
| Position           | global over all children          | local to the window            |
| Closes             | children, if asked                | parent, if asked               |
*/
mod composite;
mod sub;

pub use composite::Composite;
pub use sub::Sub;

/**
How a composite treats its children.

```
use segio::io::Options;
let options = Options::new().close_children_on_close(true).garbage_collect_on_consume(true);
assert!(options.closes_children());
```
*/
#[derive(Debug,Clone,Copy,Default,PartialEq,Eq,Hash)]
pub struct Options {
    close_children: bool,
    collect: bool,
}
impl Options {
    ///Neither closes nor collects children.
    pub fn new() -> Self {
        Self::default()
    }
    ///Closing the composite closes its remaining children.  Collected children are closed when collected.
    pub fn close_children_on_close(mut self, close: bool) -> Self {
        self.close_children = close;
        self
    }
    /**
    Drop each child as soon as the cursor moves past it.

    This bounds memory when children are produced incrementally, at the price of random access: positions in a
    collected child can no longer be seeked to.
    */
    pub fn garbage_collect_on_consume(mut self, collect: bool) -> Self {
        self.collect = collect;
        self
    }
    pub fn closes_children(&self) -> bool {
        self.close_children
    }
    pub fn collects(&self) -> bool {
        self.collect
    }
}
