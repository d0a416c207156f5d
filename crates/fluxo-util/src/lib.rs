#![forbid(unsafe_code)]
//! Filesystem, hashing, process and download helpers shared by the fluxo crates.

pub mod artifact;
pub mod download;
pub mod error;
pub mod fs;
pub mod hash;
pub mod maven;
pub mod process;
