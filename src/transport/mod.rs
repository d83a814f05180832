pub mod error;
pub mod rpc;
pub mod tcp;
pub mod traits;

pub use error::TransportError;
pub use rpc::RpcClient;
pub use tcp::TcpConnector;
pub use traits::{
    ConnectRequest, TransportClient, TransportConnector, TransportEvents, TransportStream,
};
