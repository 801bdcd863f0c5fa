use std::collections::HashMap;

use crate::transport::acl::{AccessControl, Permissions};
use crate::transport::types::{Channel, User};

#[derive(Debug, Default)]
pub struct StateCache {
    channels: HashMap<u32, Channel>,
    users: HashMap<u32, User>,
    access_controls: HashMap<u32, AccessControl>,
    permissions: HashMap<u32, Permissions>,
}

#[derive(Debug)]
pub struct ChannelStateUpdate {
    pub id: u32,
    pub name: Option<String>,
    pub parent_id: Option<u32>,
}

#[derive(Debug)]
pub struct UserStateUpdate {
    pub id: u32,
    pub name: Option<String>,
    pub channel_id: Option<u32>,
    pub muted: Option<bool>,
    pub deafened: Option<bool>,
    pub talking: Option<bool>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn user(&self, id: u32) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn access_control(&self, channel_id: u32) -> Option<&AccessControl> {
        self.access_controls.get(&channel_id)
    }

    pub fn permissions(&self, channel_id: u32) -> Option<Permissions> {
        self.permissions.get(&channel_id).copied()
    }

    pub fn apply_channel_state(&mut self, update: ChannelStateUpdate) {
        let entry = self.channels.entry(update.id).or_insert_with(|| Channel {
            id: update.id,
            name: String::from(""),
            parent_id: None,
        });

        if let Some(name) = update.name {
            entry.name = name;
        }

        if let Some(parent_id) = update.parent_id {
            entry.parent_id = Some(parent_id);
        }
    }

    /// Drops a channel together with the access-control state it owns.
    pub fn apply_channel_remove(&mut self, id: u32) {
        self.channels.remove(&id);
        self.access_controls.remove(&id);
        self.permissions.remove(&id);
    }

    pub fn apply_user_state(&mut self, update: UserStateUpdate) {
        let entry = self.users.entry(update.id).or_insert_with(|| User {
            id: update.id,
            name: String::from("Unknown"),
            channel_id: 0,
            muted: false,
            deafened: false,
            talking: false,
        });

        if let Some(name) = update.name {
            entry.name = name;
        }

        if let Some(channel_id) = update.channel_id {
            entry.channel_id = channel_id;
        }

        if let Some(muted) = update.muted {
            entry.muted = muted;
        }

        if let Some(deafened) = update.deafened {
            entry.deafened = deafened;
        }

        if let Some(talking) = update.talking {
            entry.talking = talking;
        }
    }

    pub fn apply_user_remove(&mut self, id: u32) {
        self.users.remove(&id);
    }

    /// Replaces the channel's access-control state wholesale.
    pub fn apply_access_control(&mut self, access_control: AccessControl) {
        self.access_controls
            .insert(access_control.channel_id, access_control);
    }

    pub fn apply_permissions(&mut self, channel_id: u32, permissions: Permissions) {
        self.permissions.insert(channel_id, permissions);
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = self.channels.values().cloned().collect::<Vec<_>>();
        channels.sort_by_key(|channel| channel.id);
        channels
    }

    pub fn users(&self) -> Vec<User> {
        let mut users = self.users.values().cloned().collect::<Vec<_>>();
        users.sort_by_key(|user| user.id);
        users
    }
}
