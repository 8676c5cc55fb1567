//! On-disk license cache.

pub mod file;
