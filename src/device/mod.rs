//! Device source module.
//!
//! The terminal itself is an external collaborator. This module defines the
//! contract a source must satisfy, the shared connection handle, and two
//! sources that ship with the crate.

pub mod file;
pub mod link;
pub mod memory;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use file::{parse_device_timestamp, FileDevice};
pub use link::DeviceLink;
pub use memory::MemoryDevice;
pub use source::{DeviceConnector, DeviceError, DeviceSession, DeviceTarget, DEFAULT_DEVICE_PORT};
pub use types::{DeviceUser, PunchType, RawPunch, UserDirectory, UNKNOWN_USER};
