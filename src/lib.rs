//! Device memory protocol and ringbuffer dive-log extraction core.
//!
//! Six layers, leaves first: [`transport`] → [`framing`] → [`transfer`] →
//! [`memory`] → the per-family extractors ([`family_a`], [`family_b`]) →
//! [`parser`]. [`session`] ties a transport and a [`layout::Family`]
//! together into the external session API; [`serial_transport`] is the one
//! concrete `Transport` this crate ships.

pub mod error;
pub mod family_a;
pub mod family_b;
pub mod framing;
pub mod layout;
pub mod memory;
pub mod parser;
pub mod serial_transport;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod util;

pub use error::{DcError, Result};
pub use layout::{Family, LayoutA, LayoutB};
pub use session::DeviceSession;
