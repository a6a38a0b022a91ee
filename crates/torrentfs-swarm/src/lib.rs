#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! The seam between the torrentfs engine and the swarm library.
//!
//! The engine never talks to a BitTorrent implementation directly; it holds a
//! [`SwarmSession`] capability object and degrades gracefully when a
//! capability is missing. [`sim::SimSession`] is the in-process
//! implementation: it materialises prioritised pieces into the sparse cache
//! on a configurable delay, which makes every read/pin/prefetch path
//! exercisable end to end without a network.

pub mod session;
pub mod sim;

pub use session::{
    SessionCaps, SessionFactory, SessionParams, SessionStatus, SwarmPeer, SwarmSession,
    SwarmTracker,
};
pub use sim::{SimOptions, SimSession, SimSessionFactory, content_byte, expected_file_bytes};
