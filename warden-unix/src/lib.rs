//! Thin wrappers around the Unix process and account primitives the
//! supervisor needs: signal delivery, liveness probes, session detachment,
//! and principal lookup. Everything here is `#[cfg(unix)]`; the daemon crate
//! gates its process-backed actions on the same condition.

pub mod accounts;
pub mod process;
