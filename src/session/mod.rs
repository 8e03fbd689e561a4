//! Session data model and registry (§3, §9).

pub mod session;
pub mod table;

pub use session::{Endpoint, PacketCounters, Session, Side, Twin};
pub use table::{compare_session_tags, decode_token, Part, SessionId, SessionTable, TagMatch, CONTROL_TOKEN};
