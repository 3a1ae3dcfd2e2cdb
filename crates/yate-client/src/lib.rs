//! Agent-side YATE client: the datagram link to a proxy and the world model
//! it maintains.

pub mod client;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod state;
pub mod world;

pub use client::{CancelHandle, Callbacks, QueryOptions, YateClient};
pub use config::{ClientConfig, ClientSection};
pub use driver::Driver;
pub use error::ClientError;
pub use state::ConnectionState;
pub use world::{VisualWindow, WorldModel};
