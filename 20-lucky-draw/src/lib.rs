//! Single-event prize draw backed by a shared key-value store.
//!
//! An admin opens a draw with a set of prizes and an optional time limit,
//! participants register exactly once, and closing the draw pairs prizes to
//! entrants at random. All coordination happens through atomic operations of
//! the store; the application keeps no shared mutable state of its own.
//!
//! - [`keys`] names every record the draw keeps in the store.
//! - [`store`] defines the [`KeyValueStore`](store::KeyValueStore) trait with
//!   Redis and in-memory backends.
//! - [`profile`] resolves participant profiles through a read-through cache in
//!   front of the GitHub users API.
//! - [`state`] derives the current phase of the draw from store contents.
//! - [`registry`] admits entrants, at most once per identity.
//! - [`allocator`] pairs prizes with entrants when the draw closes.
//! - [`winners`] builds and caches the human-facing winner list.
//! - [`draw`] ties the components together behind one handle.
//! - [`cli`] and [`http`] are the process configuration and the JSON API.

pub mod allocator;
pub mod cli;
pub mod draw;
pub mod error;
pub mod http;
pub mod keys;
pub mod profile;
pub mod registry;
pub mod state;
pub mod store;
pub mod winners;

pub use draw::LuckyDraw;
pub use error::DrawError;
pub use state::DrawState;
