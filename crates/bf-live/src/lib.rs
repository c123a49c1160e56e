pub mod gateway;
pub mod broker_client;
pub mod data_feed;

pub use gateway::*;
pub use broker_client::*;
pub use data_feed::*;
