#[macro_use]
extern crate tracing;

pub mod agent_conn;
pub mod hub;
pub mod journal;

pub use agent_conn::AgentConn;
pub use hub::Hub;
pub use journal::Journal;
