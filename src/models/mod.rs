//! Data models for the Table API.
//!
//! Request descriptions, page windows, display-value modes, response
//! envelopes and the result shapes returned to callers.

mod common;

pub use common::*;
