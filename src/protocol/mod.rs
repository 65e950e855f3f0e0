//! Domain types shared by the session core, the transport contract and the UI layer
//!
//! Everything here is plain data plus listener traits; no I/O happens in this module.

pub mod mpn;
pub mod status;
pub mod subscription;
pub mod trigger;

pub use mpn::*;
pub use status::*;
pub use subscription::*;
pub use trigger::*;
