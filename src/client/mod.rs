//! Remote licensing service client.

pub mod http;
