//! File and directory transfer to the destination host.

pub mod mirror;

pub use mirror::Mirror;
