//! Key material and license blob encryption.

pub mod cipher;
pub mod keystore;
