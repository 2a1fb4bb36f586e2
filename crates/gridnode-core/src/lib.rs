pub mod codec;
pub mod config;
pub mod transport;
pub mod types;

pub use codec::{CodecError, JsonCodec, ObjectCodec};
pub use config::NodeConfig;
pub use types::*;
