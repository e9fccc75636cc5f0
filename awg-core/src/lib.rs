#![forbid(unsafe_code)]

mod config;
mod cps;
mod junk;
mod mode;
mod transform;
mod wire;

pub use config::{Config, ConfigError, LogLevel, RangeU32, RawParams};
pub use cps::{generate_cps_packets, CpsError, CpsTemplate};
pub use junk::generate_junk;
pub use mode::ProtocolMode;
pub use transform::{transform_inbound, transform_outbound};
pub use wire::{read_u32_le, write_u32_le};
