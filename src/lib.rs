//! Turnstile: queued distributed locks over a coordination service.
//!
//! Clients open a [`session::Session`] against a coordination service and lock
//! named resources through [`locks::Locks`]. Each attempt queues an ephemeral
//! sequential node; the lowest node holds the lock and every waiter watches
//! only its predecessor, so grants are FIFO and a crashed holder's lock passes
//! on as soon as its session ends.
//!
//! Two coordination services are included: [`memory::MemoryService`] for one
//! process, and [`fs::FsService`] for processes sharing a directory.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod memory;
pub mod namespace;
pub mod session;

pub use error::{Result, TurnstileError};
