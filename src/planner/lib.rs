//! Pure segment-placement expansion and validation. No I/O beyond what
//! callers hand it: the Hub resolves addresses to hostnames over RPC and
//! passes the resulting map in, the Controller decodes the operator's
//! configuration file and passes the resulting `ClusterConfig` in.
#[macro_use]
extern crate tracing;

pub mod expand;
pub mod input;
pub mod locale;
pub mod validate;

pub use input::{ClusterConfig, MirroringType, SEGMENT_NAME_PREFIX};
