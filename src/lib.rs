mod client;

pub use rio_live_types as types;
pub use client::{connect, connect_with_config, Client, ClientTx, ServerRx};
pub use client::config::Config;

#[cfg(feature = "utils")]
pub use rio_live_utils as utils;
