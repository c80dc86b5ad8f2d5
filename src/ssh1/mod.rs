//! The SSH-1 login-phase protocol state machine (`spec.md` §4.6).

pub mod auth;
pub mod hostkey;
pub mod login_machine;
pub mod packets;

pub use hostkey::{DialogDecision, HostKeyFingerprint};
pub use login_machine::{Action, Event, Ssh1KeyFile, Ssh1LoginMachine};
pub use packets::Packet;
