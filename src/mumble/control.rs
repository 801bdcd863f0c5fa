use crate::mumble::events::TextMessage;
use crate::transport::acl::{AccessControl, AclTarget, ChannelAcl, ChannelGroup, Permissions};
use crate::transport::errors::TransportError;
use bytes::BytesMut;
use mumble_protocol_2x::control::{msgs, ControlPacket};
use mumble_protocol_2x::voice::{Clientbound, Serverbound};
#[cfg(not(feature = "coverage"))]
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
#[cfg(not(feature = "coverage"))]
use std::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    ServerSync {
        session: u32,
        welcome_text: Option<String>,
    },
    ChannelState {
        id: u32,
        name: String,
        parent_id: Option<u32>,
    },
    ChannelRemove {
        id: u32,
    },
    UserState {
        id: u32,
        name: String,
        channel_id: u32,
        muted: bool,
        deafened: bool,
        talking: bool,
    },
    UserRemove {
        id: u32,
    },
    Text(TextMessage),
    AccessControl {
        channel_id: u32,
        access_control: AccessControl,
    },
    Permissions {
        channel_id: u32,
        permissions: Permissions,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserStateCommand {
    pub session_id: u32,
    pub channel_id: Option<u32>,
    pub muted: Option<bool>,
    pub deafened: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageCommand {
    pub channel_ids: Vec<u32>,
    pub user_ids: Vec<u32>,
    pub message: String,
}

pub struct ControlHandshake {
    pub messages: Vec<ControlMessage>,
    pub session: Option<Box<dyn ControlSession>>,
}

impl std::fmt::Debug for ControlHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandshake")
            .field("messages", &self.messages)
            .field("session_present", &self.session.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub access_tokens: Vec<String>,
    pub accept_invalid_certs: bool,
}

pub trait ControlConnector {
    fn handshake(&mut self, request: HandshakeRequest) -> Result<ControlHandshake, TransportError>;
}

pub trait ControlSession {
    fn send_user_state(&mut self, command: UserStateCommand) -> Result<(), TransportError>;
    fn send_text_message(&mut self, command: TextMessageCommand) -> Result<(), TransportError>;
    fn query_access_control(&mut self, channel_id: u32) -> Result<(), TransportError>;
    fn update_access_control(
        &mut self,
        access_control: &AccessControl,
    ) -> Result<(), TransportError>;
    fn poll_message(&mut self) -> Result<Option<ControlMessage>, TransportError>;
}

pub trait ControlTransport {
    fn send(&mut self, packet: ControlPacket<Serverbound>) -> Result<(), TransportError>;
    fn recv(&mut self) -> Result<Option<ControlPacket<Clientbound>>, TransportError>;
}

#[derive(Debug, Default)]
pub struct NoopControlConnector;

impl ControlConnector for NoopControlConnector {
    fn handshake(
        &mut self,
        _request: HandshakeRequest,
    ) -> Result<ControlHandshake, TransportError> {
        Ok(ControlHandshake {
            messages: Vec::new(),
            session: None,
        })
    }
}

pub struct MumbleProtocolControlConnector<T: ControlTransport> {
    transport: Option<T>,
}

pub struct SocketControlConnector<F> {
    connect: F,
}

pub struct BlockingControlTransport<S> {
    stream: S,
    codec: mumble_protocol_2x::control::ClientControlCodec,
    read_buf: BytesMut,
}

impl<S> BlockingControlTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: mumble_protocol_2x::control::ClientControlCodec::new(),
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(not(feature = "coverage"))]
pub fn tls_connect(
    request: &HandshakeRequest,
) -> Result<openssl::ssl::SslStream<TcpStream>, TransportError> {
    let address = format!("{}:{}", request.server, request.port);
    let tcp = TcpStream::connect(address)?;
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|err| TransportError::Io(format!("tls connector init failed: {err}")))?;
    if request.accept_invalid_certs {
        builder.set_verify(SslVerifyMode::NONE);
    }
    let connector = builder.build();
    connector
        .connect(&request.server, tcp)
        .map_err(|err| TransportError::Io(format!("tls handshake failed: {err}")))
}

impl<F> SocketControlConnector<F> {
    pub fn new(connect: F) -> Self {
        Self { connect }
    }
}

impl<S: std::io::Read + std::io::Write> ControlTransport for BlockingControlTransport<S> {
    fn send(&mut self, packet: ControlPacket<Serverbound>) -> Result<(), TransportError> {
        let mut out = BytesMut::with_capacity(512);
        self.codec.encode(packet, &mut out)?;
        self.stream.write_all(&out)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<ControlPacket<Clientbound>>, TransportError> {
        loop {
            if let Some(packet) = self.codec.decode(&mut self.read_buf)? {
                return Ok(Some(packet));
            }

            let mut buffer = [0u8; 4096];
            let bytes_read = self.stream.read(&mut buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.read_buf.extend_from_slice(&buffer[..bytes_read]);
        }
    }
}

fn map_control_packet(packet: ControlPacket<Clientbound>) -> Option<ControlMessage> {
    match packet {
        ControlPacket::ServerSync(msg) => {
            let session = msg.session?;
            Some(ControlMessage::ServerSync {
                session,
                welcome_text: msg.welcome_text.clone(),
            })
        }
        ControlPacket::ChannelState(msg) => {
            let id = msg.channel_id?;
            let name = msg.name.clone()?;
            Some(ControlMessage::ChannelState {
                id,
                name,
                parent_id: msg.parent,
            })
        }
        ControlPacket::ChannelRemove(msg) => {
            let id = msg.channel_id?;
            Some(ControlMessage::ChannelRemove { id })
        }
        ControlPacket::UserState(msg) => {
            let id = msg.session?;
            let name = msg.name.clone()?;
            let channel_id = msg.channel_id?;
            let muted = msg.self_mute.unwrap_or(false);
            let deafened = msg.self_deaf.unwrap_or(false);
            Some(ControlMessage::UserState {
                id,
                name,
                channel_id,
                muted,
                deafened,
                talking: false,
            })
        }
        ControlPacket::UserRemove(msg) => {
            let id = msg.session?;
            Some(ControlMessage::UserRemove { id })
        }
        ControlPacket::TextMessage(msg) => {
            let message = msg.message.clone()?;
            Some(ControlMessage::Text(TextMessage {
                actor_id: msg.actor,
                channel_ids: msg.channel_id.clone(),
                user_ids: msg.session.clone(),
                message,
            }))
        }
        ControlPacket::ACL(msg) => {
            let channel_id = msg.channel_id?;
            Some(ControlMessage::AccessControl {
                channel_id,
                access_control: map_access_control(channel_id, &msg),
            })
        }
        ControlPacket::PermissionQuery(msg) => {
            let channel_id = msg.channel_id?;
            let permissions = Permissions::from_bits_truncate(msg.permissions.unwrap_or(0));
            Some(ControlMessage::Permissions {
                channel_id,
                permissions,
            })
        }
        ControlPacket::Reject(msg) => {
            let reason = msg
                .reason
                .clone()
                .unwrap_or_else(|| "connection rejected".to_string());
            Some(ControlMessage::Rejected { reason })
        }
        _ => None,
    }
}

/// Maps a wire ACL message into the domain model. Entries that fail domain
/// validation are skipped individually so one bad entry cannot discard the
/// channel's remaining access-control state.
fn map_access_control(channel_id: u32, msg: &msgs::ACL) -> AccessControl {
    let mut groups = Vec::new();
    for wire in &msg.groups {
        let Some(name) = wire.name.clone() else {
            log::warn!("skipping channel group without a name");
            continue;
        };
        match ChannelGroup::new(
            name,
            wire.add.clone(),
            wire.remove.clone(),
            wire.inherited_members.clone(),
        ) {
            Ok(mut group) => {
                group.inherited = wire.inherited.unwrap_or(true);
                group.inherit = wire.inherit.unwrap_or(true);
                group.inheritable = wire.inheritable.unwrap_or(true);
                groups.push(group);
            }
            Err(err) => log::warn!("skipping malformed channel group: {err}"),
        }
    }

    let mut acls = Vec::new();
    for wire in &msg.acls {
        let target = match (wire.user_id, wire.group.clone()) {
            (Some(user_id), _) => AclTarget::User(user_id),
            (None, Some(group)) => AclTarget::Group(group),
            (None, None) => {
                log::warn!("skipping acl entry without a target");
                continue;
            }
        };
        let grant = Permissions::from_bits_truncate(wire.grant.unwrap_or(0));
        let deny = Permissions::from_bits_truncate(wire.deny.unwrap_or(0));
        match ChannelAcl::new(target, grant, deny) {
            Ok(mut entry) => {
                entry.apply_here = wire.apply_here.unwrap_or(true);
                entry.apply_subs = wire.apply_subs.unwrap_or(true);
                entry.inherited = wire.inherited.unwrap_or(true);
                acls.push(entry);
            }
            Err(err) => log::warn!("skipping malformed acl entry: {err}"),
        }
    }

    AccessControl {
        channel_id,
        inherit_acls: msg.inherit_acls.unwrap_or(true),
        groups,
        acls,
    }
}

/// Builds the wire ACL write-back for a channel. Inherited groups and
/// entries belong to ancestor channels and are never sent back.
fn encode_access_control(access_control: &AccessControl) -> msgs::ACL {
    let mut message = msgs::ACL::new();
    message.channel_id = Some(access_control.channel_id);
    message.inherit_acls = Some(access_control.inherit_acls);
    message.query = Some(false);

    for group in access_control.groups.iter().filter(|g| !g.inherited) {
        let mut wire = msgs::acl::ChanGroup::new();
        wire.name = Some(group.name().to_string());
        wire.inherit = Some(group.inherit);
        wire.inheritable = Some(group.inheritable);
        wire.add = group.members().to_vec();
        wire.remove = group.excluded_members().to_vec();
        message.groups.push(wire);
    }

    for entry in access_control.acls.iter().filter(|a| !a.inherited) {
        let mut wire = msgs::acl::ChanACL::new();
        wire.apply_here = Some(entry.apply_here);
        wire.apply_subs = Some(entry.apply_subs);
        match entry.target() {
            AclTarget::User(id) => wire.user_id = Some(*id),
            AclTarget::Group(name) => wire.group = Some(name.clone()),
        }
        wire.grant = Some(entry.grant.bits());
        wire.deny = Some(entry.deny.bits());
        message.acls.push(wire);
    }

    message
}

impl<T: ControlTransport> MumbleProtocolControlConnector<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

impl<T: ControlTransport + 'static> ControlConnector for MumbleProtocolControlConnector<T> {
    fn handshake(&mut self, request: HandshakeRequest) -> Result<ControlHandshake, TransportError> {
        let mut transport = self.transport.take().ok_or_else(|| {
            TransportError::Protocol("control transport already consumed".to_string())
        })?;
        let mut auth = msgs::Authenticate::new();
        auth.username = Some(request.username);
        auth.password = request.password;
        auth.tokens = request.access_tokens;
        auth.opus = Some(true);

        let packet = ControlPacket::Authenticate(Box::new(auth));
        transport.send(packet)?;

        // Sync is complete once the server acknowledges the session with
        // ServerSync; a Reject terminates the handshake early.
        let mut messages = Vec::new();
        while let Some(packet) = transport.recv()? {
            let Some(message) = map_control_packet(packet) else {
                continue;
            };
            let done = matches!(
                message,
                ControlMessage::ServerSync { .. } | ControlMessage::Rejected { .. }
            );
            messages.push(message);
            if done {
                break;
            }
        }

        Ok(ControlHandshake {
            messages,
            session: Some(Box::new(MumbleProtocolControlSession { transport })),
        })
    }
}

impl<F, S> ControlConnector for SocketControlConnector<F>
where
    F: FnMut(&HandshakeRequest) -> Result<S, TransportError>,
    S: std::io::Read + std::io::Write + 'static,
{
    fn handshake(&mut self, request: HandshakeRequest) -> Result<ControlHandshake, TransportError> {
        let stream = (self.connect)(&request)?;
        let transport = BlockingControlTransport::new(stream);
        let mut connector = MumbleProtocolControlConnector::new(transport);
        connector.handshake(request)
    }
}

pub struct MumbleProtocolControlSession<T: ControlTransport> {
    transport: T,
}

impl<T: ControlTransport + 'static> ControlSession for MumbleProtocolControlSession<T> {
    fn send_user_state(&mut self, command: UserStateCommand) -> Result<(), TransportError> {
        let mut message = msgs::UserState::new();
        message.session = Some(command.session_id);
        message.channel_id = command.channel_id;
        message.self_mute = command.muted;
        message.self_deaf = command.deafened;
        self.transport
            .send(ControlPacket::UserState(Box::new(message)))
    }

    fn send_text_message(&mut self, command: TextMessageCommand) -> Result<(), TransportError> {
        let mut message = msgs::TextMessage::new();
        message.channel_id = command.channel_ids;
        message.session = command.user_ids;
        message.message = Some(command.message);
        self.transport
            .send(ControlPacket::TextMessage(Box::new(message)))
    }

    fn query_access_control(&mut self, channel_id: u32) -> Result<(), TransportError> {
        let mut message = msgs::ACL::new();
        message.channel_id = Some(channel_id);
        message.query = Some(true);
        self.transport.send(ControlPacket::ACL(Box::new(message)))
    }

    fn update_access_control(
        &mut self,
        access_control: &AccessControl,
    ) -> Result<(), TransportError> {
        let message = encode_access_control(access_control);
        self.transport.send(ControlPacket::ACL(Box::new(message)))
    }

    fn poll_message(&mut self) -> Result<Option<ControlMessage>, TransportError> {
        while let Some(packet) = self.transport.recv()? {
            if let Some(message) = map_control_packet(packet) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}
