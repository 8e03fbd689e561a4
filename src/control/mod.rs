//! The control protocol: parsing, verb dispatch, and reply formatting
//! (§4.1, §6).

pub mod dispatch;
pub mod ecode;
pub mod parse;
pub mod reply;

pub use dispatch::{dispatch, DispatchContext};
pub use ecode::Ecode;
pub use reply::Reply;
