//! Transactional tree of configurable objects
//!
//! This module provides:
//! - Typed parameters with validators and read-only access
//! - Objects holding a working snapshot and, during a transaction, a saved one
//! - An arena of nodes addressed by stable handles, with a schema registry
//! - Transaction sets that start, commit or abandon a group of objects together
//! - The per-session read cache handed to every hardware read

mod arena;
mod cache;
mod object;
mod schema;
mod transaction;
mod value;

pub use arena::*;
pub use cache::*;
pub use object::*;
pub use schema::*;
pub use transaction::*;
pub use value::*;
