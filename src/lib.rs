pub mod mumble;
pub mod transport;

pub use mumble::{MumbleConfig, MumbleTransport, TextMessage, TransportEvent};
pub use transport::acl::{
    AccessControl, AclError, AclTarget, ChannelAcl, ChannelGroup, Permissions,
};
pub use transport::errors::TransportError;
pub use transport::types::{Channel, ConnState, User};
