//! Modules layer - Infrastructure components
//!
//! Contains the encryption engine, private blob storage and the host resource probe.

pub mod crypto;
pub mod resources;
pub mod storage;
