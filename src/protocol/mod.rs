//! Local socket protocol: requests, license records and replies.

pub mod framing;
pub mod models;
pub mod request;
