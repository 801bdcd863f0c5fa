pub mod config;
pub mod control;
pub mod events;
pub mod state;
pub mod transport;
pub mod tree;

pub use config::MumbleConfig;
#[cfg(not(feature = "coverage"))]
pub use control::tls_connect;
pub use control::{
    BlockingControlTransport, ControlConnector, ControlHandshake, ControlMessage, ControlSession,
    ControlTransport, HandshakeRequest, MumbleProtocolControlConnector, NoopControlConnector,
    SocketControlConnector, TextMessageCommand, UserStateCommand,
};
pub use events::{TextMessage, TransportEvent};
pub use transport::MumbleTransport;
pub use tree::{channel_tree, TreeItem, TreeItemKind};
