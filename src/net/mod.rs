//! Address parsing and the RTP/RTCP port-pair allocator.

pub mod address;
pub mod ports;

pub use address::resolve;
pub use ports::PortAllocator;
