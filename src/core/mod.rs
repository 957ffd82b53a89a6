//! Core implementation
//!
//! `store` owns the connection and lifecycle; `catalog`, `index`, `batch` and
//! `iter` add the table, key, batch and iteration operations to [`Store`].

pub mod config;
pub mod error;
pub mod hashing;
pub mod iter;
pub mod schema;
pub mod store;

pub(crate) mod batch;
pub(crate) mod catalog;
pub(crate) mod index;
pub(crate) mod statements;


pub use store::{Store, StoreBuilder};
