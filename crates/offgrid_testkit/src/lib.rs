//! # Offgrid Testkit
//!
//! Test utilities for Offgrid.
//!
//! This crate provides:
//! - A fixture schema (tasks, lists, tags) and change-object builders
//! - Graph builders over memory and file stores with scripted
//!   transports
//!
//! The cross-crate scenario suite lives in this crate's `tests/`
//! directory and exercises the full stack: offline saves, FIFO replay,
//! durability-before-delivery ordering, and restart recovery.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;

pub use fixtures::*;
