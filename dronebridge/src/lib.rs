pub mod bridge;
pub mod config;
pub mod cot;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod status;
pub mod transport;

pub use error::{BridgeError, Result};
