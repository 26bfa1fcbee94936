/*!
Composite and windowed views over element streams.

segio builds one stream out of others:
* [io::Composite] stitches an ordered list of children end to end, resolving sizes only as it needs them,
* [io::Sub] exposes a window of a seekable parent as a stream of its own.

Every stream speaks the capability-based [capability::Io] trait, so composites nest.  With the `reactive` feature,
[reactive] provides the same over [reactive::AsyncIo], whose operations suspend instead of blocking.  With the
`lookahead` feature, [lookahead::Lookahead] prefetches from a slow producer on a caller-supplied thread strategy.
*/
pub mod capability;
pub mod error;
pub mod io;
pub mod memory;
pub mod sync;

mod chain;
mod fake_waker;

#[cfg(feature="reactive")]
pub mod reactive;

#[cfg(feature="lookahead")]
pub mod lookahead;


pub use capability::{Capabilities, Element, Io, SeekOrigin};
pub use error::{Error, Result};
pub use priority::Priority;

#[cfg(feature="block_party")]
pub use block_party;
