//! Remote command protocol
//!
//! Clients send blocks of shell-quoted command lines terminated by an empty
//! line and get back an `OK` record followed by results, or a single
//! `ERROR <code> <message>` record. The dispatch table is static; every
//! block runs as one transaction set over the tree.

mod commands;
mod dispatcher;
mod quoting;
mod server;

pub use commands::*;
pub use dispatcher::*;
pub use quoting::{join, quote, split};
pub use server::*;
