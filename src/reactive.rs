/*!
Suspending composition of streams.

This is the async mirror of [crate::io]: [Composite] and [Sub] have the same positions, boundary policy, and error
behavior as their blocking counterparts, but every step that may have to wait on a child (seeking it, resolving its
size, crossing into the next segment) is an `.await` point.

Children implement [AsyncIo].  Blocking streams become children through one of two adapters:
* [Inline] calls the blocking stream directly from `poll`.  Use it for streams known to be fast, like memory.
* [Offload] moves each call onto a [block_party::Spawn] strategy supplied by the caller, and suspends until it's done.

There is no global executor: whatever polls these futures drives them.
*/
mod capability;
mod cursor;
mod composite;
mod sub;
mod adapt;

pub use capability::AsyncIo;
pub use composite::Composite;
pub use sub::Sub;
pub use adapt::{Inline, Offload};
