//! Index administration: the batch counterpart to lifecycle-triggered sync.

pub mod admin;

pub use admin::{BatchFailure, BatchReport, IndexAdmin};
