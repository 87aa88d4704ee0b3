#[macro_use]
extern crate tracing;

pub mod capabilities;
pub mod config;
pub mod error;
pub mod persister;
pub mod time;
pub mod version;
