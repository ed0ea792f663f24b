//! SQLite backend for the Alerta incident store and connection registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Because every mutation executes as a
//! single closure on that thread — inside one SQL transaction — the atomicity
//! contracts of the store traits hold with no read-modify-write window.

mod encode;
mod registry;
mod schema;
mod store;

pub use store::SqliteStore;

#[cfg(test)]
mod tests;
