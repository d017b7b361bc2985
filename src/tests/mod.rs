//! End-to-end tests
//!
//! Drive the full path: facade, channel, worker thread, router, sessions and
//! the in-memory engine.

pub mod fixtures;
