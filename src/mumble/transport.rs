use crate::mumble::events::TextMessage;
use crate::mumble::state::{ChannelStateUpdate, StateCache, UserStateUpdate};
use crate::mumble::tree::{channel_tree, TreeItem};
#[cfg(not(feature = "coverage"))]
use crate::mumble::{tls_connect, SocketControlConnector};
use crate::mumble::{
    ControlConnector, ControlMessage, ControlSession, HandshakeRequest, MumbleConfig,
    NoopControlConnector, TextMessageCommand, TransportEvent, UserStateCommand,
};
use crate::transport::acl::{AccessControl, Permissions};
use crate::transport::errors::TransportError;
use crate::transport::types::ConnState;

pub struct MumbleTransport {
    config: MumbleConfig,
    conn_state: ConnState,
    events: Vec<TransportEvent>,
    control: Box<dyn ControlConnector>,
    state: StateCache,
    session_id: Option<u32>,
    current_channel_id: Option<u32>,
    control_session: Option<Box<dyn ControlSession>>,
    self_muted: bool,
    self_deafened: bool,
}

impl MumbleTransport {
    pub fn new(config: MumbleConfig) -> Self {
        Self::with_connector(config, Box::new(NoopControlConnector))
    }

    #[cfg(not(feature = "coverage"))]
    pub fn new_with_tls(config: MumbleConfig) -> Self {
        let connector = SocketControlConnector::new(tls_connect);
        Self::with_connector(config, Box::new(connector))
    }

    pub fn with_connector(config: MumbleConfig, control: Box<dyn ControlConnector>) -> Self {
        Self {
            config,
            conn_state: ConnState::Disconnected,
            events: Vec::new(),
            control,
            state: StateCache::new(),
            session_id: None,
            current_channel_id: None,
            control_session: None,
            self_muted: false,
            self_deafened: false,
        }
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn_state
    }

    pub fn take_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn current_channel_id(&self) -> Option<u32> {
        self.current_channel_id
    }

    pub fn is_self_muted(&self) -> bool {
        self.self_muted
    }

    pub fn is_self_deafened(&self) -> bool {
        self.self_deafened
    }

    pub fn access_control(&self, channel_id: u32) -> Option<&AccessControl> {
        self.state.access_control(channel_id)
    }

    pub fn permissions(&self, channel_id: u32) -> Option<Permissions> {
        self.state.permissions(channel_id)
    }

    /// Flattened channel/user hierarchy for display.
    pub fn tree(&self) -> Vec<TreeItem> {
        channel_tree(&self.state.channels(), &self.state.users())
    }

    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Disconnected {
            return Ok(());
        }

        let server = self.config.server.trim();
        if server.is_empty() {
            return Err(TransportError::InvalidConfig(
                "server is required".to_string(),
            ));
        }
        let username = self.config.username.trim();
        if username.is_empty() {
            return Err(TransportError::InvalidConfig(
                "username is required".to_string(),
            ));
        }

        log::info!(
            "connecting to {}:{} as {}",
            self.config.server,
            self.config.port,
            self.config.username
        );
        self.set_conn_state(ConnState::Connecting);
        let request = HandshakeRequest {
            server: self.config.server.clone(),
            port: self.config.port,
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            access_tokens: self.config.access_tokens.clone(),
            accept_invalid_certs: self.config.accept_invalid_certs,
        };
        let handshake = match self.control.handshake(request) {
            Ok(handshake) => handshake,
            Err(error) => {
                log::warn!("handshake failed: {error}");
                self.set_conn_state(ConnState::Error);
                self.events.push(TransportEvent::Error(error.to_string()));
                return Err(error);
            }
        };
        self.control_session = handshake.session;

        for message in handshake.messages {
            if let ControlMessage::Rejected { reason } = message {
                log::warn!("server rejected connection: {reason}");
                self.control_session = None;
                self.set_conn_state(ConnState::Error);
                self.events.push(TransportEvent::Error(reason.clone()));
                return Err(TransportError::Protocol(reason));
            }
            self.apply_control_message(message);
        }

        self.set_conn_state(ConnState::Connected);
        Ok(())
    }

    /// Drops the control session and clears all server state.
    pub fn disconnect(&mut self) {
        if self.conn_state == ConnState::Disconnected {
            return;
        }
        log::info!("disconnecting from {}", self.config.server);
        self.control_session = None;
        self.state = StateCache::new();
        self.session_id = None;
        self.current_channel_id = None;
        self.self_muted = false;
        self.self_deafened = false;
        self.set_conn_state(ConnState::Disconnected);
    }

    pub fn join_channel(&mut self, channel_id: u32) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }

        let session_id = self
            .session_id
            .ok_or_else(|| TransportError::Protocol("missing session id".to_string()))?;

        if self.state.channel(channel_id).is_none() {
            return Err(TransportError::Protocol("unknown channel".to_string()));
        }

        if self.state.user(session_id).is_none() {
            return Err(TransportError::Protocol(
                "missing self user state".to_string(),
            ));
        }

        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        session.send_user_state(UserStateCommand {
            session_id,
            channel_id: Some(channel_id),
            muted: None,
            deafened: None,
        })?;

        self.state.apply_user_state(UserStateUpdate {
            id: session_id,
            name: None,
            channel_id: Some(channel_id),
            muted: None,
            deafened: None,
            talking: None,
        });
        self.current_channel_id = Some(channel_id);
        let users = self.state.users();
        self.events.push(TransportEvent::Users(users));
        Ok(())
    }

    pub fn set_self_mute(&mut self, muted: bool) -> Result<(), TransportError> {
        self.send_self_state(muted, self.self_deafened)
    }

    pub fn set_self_deafen(&mut self, deafened: bool) -> Result<(), TransportError> {
        self.send_self_state(self.self_muted, deafened)
    }

    // Every self-state send carries both flags so the server never sees a
    // partial mute/deafen pair.
    fn send_self_state(&mut self, muted: bool, deafened: bool) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }
        let session_id = self
            .session_id
            .ok_or_else(|| TransportError::Protocol("missing session id".to_string()))?;
        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        session.send_user_state(UserStateCommand {
            session_id,
            channel_id: None,
            muted: Some(muted),
            deafened: Some(deafened),
        })?;

        self.self_muted = muted;
        self.self_deafened = deafened;
        if self.state.user(session_id).is_some() {
            self.state.apply_user_state(UserStateUpdate {
                id: session_id,
                name: None,
                channel_id: None,
                muted: Some(muted),
                deafened: Some(deafened),
                talking: None,
            });
            let users = self.state.users();
            self.events.push(TransportEvent::Users(users));
        }
        Ok(())
    }

    pub fn send_text_message(&mut self, command: TextMessageCommand) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }
        if command.message.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "message is required".to_string(),
            ));
        }
        if command.channel_ids.is_empty() && command.user_ids.is_empty() {
            return Err(TransportError::InvalidConfig(
                "at least one target is required".to_string(),
            ));
        }
        for channel_id in &command.channel_ids {
            if self.state.channel(*channel_id).is_none() {
                return Err(TransportError::Protocol("unknown channel".to_string()));
            }
        }
        for user_id in &command.user_ids {
            if self.state.user(*user_id).is_none() {
                return Err(TransportError::Protocol("unknown user".to_string()));
            }
        }

        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        session.send_text_message(command)
    }

    /// Asks the server for the channel's ACL and group definitions. The
    /// response arrives through `poll` as an access-control event.
    pub fn request_access_control(&mut self, channel_id: u32) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }
        if self.state.channel(channel_id).is_none() {
            return Err(TransportError::Protocol("unknown channel".to_string()));
        }
        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        session.query_access_control(channel_id)
    }

    /// Writes a channel's ACL and group definitions back to the server.
    /// The cache is not updated optimistically; the server echoes the new
    /// state to subscribed clients.
    pub fn set_access_control(
        &mut self,
        access_control: &AccessControl,
    ) -> Result<(), TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }
        if self.state.channel(access_control.channel_id).is_none() {
            return Err(TransportError::Protocol("unknown channel".to_string()));
        }
        access_control.validate()?;
        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        session.update_access_control(access_control)
    }

    /// Applies the next pending server message, if any. Returns `Ok(false)`
    /// when the server has closed the control channel.
    pub fn poll(&mut self) -> Result<bool, TransportError> {
        if self.conn_state != ConnState::Connected {
            return Err(TransportError::Disconnected);
        }
        let session = self
            .control_session
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("control session unavailable".to_string()))?;
        match session.poll_message()? {
            Some(message) => {
                self.apply_control_message(message);
                Ok(true)
            }
            None => {
                log::info!("server closed the control channel");
                self.control_session = None;
                self.set_conn_state(ConnState::Disconnected);
                Ok(false)
            }
        }
    }

    fn set_conn_state(&mut self, next: ConnState) {
        self.conn_state = next;
        self.events.push(TransportEvent::ConnectionState(next));
    }

    fn apply_control_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::ServerSync {
                session,
                welcome_text,
            } => {
                self.session_id = Some(session);
                if let Some(text) = welcome_text.filter(|text| !text.is_empty()) {
                    self.events.push(TransportEvent::Text(TextMessage {
                        actor_id: None,
                        channel_ids: Vec::new(),
                        user_ids: Vec::new(),
                        message: text,
                    }));
                }
            }
            ControlMessage::ChannelState {
                id,
                name,
                parent_id,
            } => {
                self.state.apply_channel_state(ChannelStateUpdate {
                    id,
                    name: Some(name),
                    parent_id,
                });
                let channels = self.state.channels();
                self.events.push(TransportEvent::Channels(channels));
            }
            ControlMessage::ChannelRemove { id } => {
                self.state.apply_channel_remove(id);
                let channels = self.state.channels();
                self.events.push(TransportEvent::Channels(channels));
            }
            ControlMessage::UserState {
                id,
                name,
                channel_id,
                muted,
                deafened,
                talking,
            } => {
                if self.session_id == Some(id) {
                    self.current_channel_id = Some(channel_id);
                }
                self.state.apply_user_state(UserStateUpdate {
                    id,
                    name: Some(name),
                    channel_id: Some(channel_id),
                    muted: Some(muted),
                    deafened: Some(deafened),
                    talking: Some(talking),
                });
                let users = self.state.users();
                self.events.push(TransportEvent::Users(users));
            }
            ControlMessage::UserRemove { id } => {
                self.state.apply_user_remove(id);
                let users = self.state.users();
                self.events.push(TransportEvent::Users(users));
                if self.session_id == Some(id) {
                    log::info!("removed from server");
                    self.control_session = None;
                    self.set_conn_state(ConnState::Disconnected);
                }
            }
            ControlMessage::Text(text) => {
                self.events.push(TransportEvent::Text(text));
            }
            ControlMessage::AccessControl {
                channel_id,
                access_control,
            } => {
                self.state.apply_access_control(access_control.clone());
                self.events.push(TransportEvent::AccessControl {
                    channel_id,
                    access_control,
                });
            }
            ControlMessage::Permissions {
                channel_id,
                permissions,
            } => {
                self.state.apply_permissions(channel_id, permissions);
                self.events.push(TransportEvent::Permissions {
                    channel_id,
                    permissions,
                });
            }
            ControlMessage::Rejected { reason } => {
                log::warn!("server rejected session: {reason}");
                self.control_session = None;
                self.set_conn_state(ConnState::Error);
                self.events.push(TransportEvent::Error(reason));
            }
        }
    }
}
