//! Device backends for `chatpad`.
//!
//! Implementations of [`Device`](crate::device::Device) for concrete consoles.
//!
//! # Feature flags
//! - **`virtual`**: the deterministic software console (default).
//!
//! Emulator cores integrate by implementing the same trait; chatpad never reaches
//! into their CPU/PPU internals.

#[cfg(feature = "virtual")]
#[cfg_attr(docsrs, doc(cfg(feature = "virtual")))]
pub mod virtual_input;

#[cfg(feature = "virtual")]
pub use virtual_input::VirtualConsole;
