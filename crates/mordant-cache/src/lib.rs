//! Mordant Cache
//!
//! The local content store for provisioned assets. Assets live at
//! `{root}/{category}/{name}`; a small metadata index under
//! `{root}/.mordant/index/` records the size each asset had when it was
//! committed, so torn or truncated files are detected on the next lookup.
//!
//! Writers never touch a canonical path directly. A fetch first obtains a
//! [`FetchTicket`] from [`CacheStore::begin_fetch`], streams into the ticket's
//! temp file (in the same directory as the canonical path), and then
//! [`CacheStore::commit`]s, which renames the temp file into place. At most one
//! ticket exists per asset; concurrent callers receive a [`FetchWaiter`] and
//! observe the leader's outcome instead of downloading again.

mod entry;
mod error;
mod flight;
mod store;

pub use entry::{CacheEntry, CacheState};
pub use error::CacheError;
pub use flight::{FetchOutcome, FetchSlot, FetchTicket, FetchWaiter};
pub use store::CacheStore;
