//! Gran Turismo 7 simulator-interface connector.
//!
//! The console broadcasts Salsa20-encrypted frames on UDP port 33740 to any
//! host that keeps sending a one-byte heartbeat to port 33739.

pub mod cipher;
pub mod layout;
pub mod session;

pub use cipher::CipherError;
pub use layout::{decode_datagram, DecodeError, FrameLayout, LayoutKind};
pub use session::{Gt7Config, Gt7Session};
