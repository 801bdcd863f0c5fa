use serde::{Deserialize, Serialize};

use crate::transport::acl::{AccessControl, Permissions};
use crate::transport::types::{Channel, ConnState, User};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub actor_id: Option<u32>,
    pub channel_ids: Vec<u32>,
    pub user_ids: Vec<u32>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    ConnectionState(ConnState),
    Channels(Vec<Channel>),
    Users(Vec<User>),
    Text(TextMessage),
    AccessControl {
        channel_id: u32,
        access_control: AccessControl,
    },
    Permissions {
        channel_id: u32,
        permissions: Permissions,
    },
    Error(String),
}
