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

//! Framed RPC over a local stream socket.
//!
//! Every message is a 4-byte big-endian length prefix followed by that many
//! bytes: JSON frames for requests and responses, plus one raw bytes frame
//! after an `ok:true` `read` response that declares `data_len > 0`. Each
//! connection is served by its own task and answers strictly in request
//! order; a client disconnecting mid-response never takes the server down.

pub mod framing;
pub mod protocol;
pub mod server;

pub use framing::{read_frame, write_frame};
pub use protocol::{READ_SIZE_MAX, Request};
pub use server::{RpcServer, default_socket_path};
