//! # Packet Definitions
//!
//! Application packets as the pump sees them: a type id, an opaque payload and
//! the encoded wire form. What a packet *means* belongs to the simulation layer.
//!
//! ## Registry
//!
//! Inbound entries are resolved through a static id → [`PacketKind`] table.
//! Ids without an entry are unknown and get skipped by the batch decoder.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Leading byte of every batch frame on the wire.
pub const BATCH_MARKER: u8 = 0xFE;

/// Recognized packet types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Client -> Server: login chain and client data.
    Login = 0x01,
    /// Server -> Client: login / spawn status.
    PlayStatus = 0x02,
    /// Server -> Client: encryption handshake.
    ServerToClientHandshake = 0x03,
    /// Client -> Server: encryption handshake reply.
    ClientToServerHandshake = 0x04,
    /// Bidirectional: disconnect with message.
    Disconnect = 0x05,
    /// Server -> Client: available resource packs.
    ResourcePacksInfo = 0x06,
    /// Server -> Client: resource pack stack order.
    ResourcePackStack = 0x07,
    /// Client -> Server: resource pack negotiation.
    ResourcePackClientResponse = 0x08,
    /// Bidirectional: chat and system text.
    Text = 0x09,
    /// Server -> Client: world time.
    SetTime = 0x0A,
    /// Server -> Client: world join parameters.
    StartGame = 0x0B,
    /// Server -> Client: spawn another player.
    AddPlayer = 0x0C,
    /// Server -> Client: spawn an entity.
    AddEntity = 0x0D,
    /// Server -> Client: despawn an entity.
    RemoveEntity = 0x0E,
    /// Bidirectional: player movement.
    MovePlayer = 0x13,
    /// Server -> Client: single block change.
    UpdateBlock = 0x15,
    /// Server -> Client: world event (particles, sounds).
    LevelEvent = 0x19,
    /// Bidirectional: entity event (hurt, death, ...).
    EntityEvent = 0x1B,
    /// Bidirectional: held item change.
    MobEquipment = 0x1F,
    /// Client -> Server: entity interaction.
    Interact = 0x21,
    /// Client -> Server: dig / jump / sprint actions.
    PlayerAction = 0x24,
    /// Server -> Client: entity metadata.
    SetEntityData = 0x27,
    /// Bidirectional: arm swing and similar.
    Animate = 0x2C,
    /// Bidirectional: respawn position.
    Respawn = 0x2D,
    /// Server -> Client: chunk column.
    FullChunkData = 0x3A,
    /// Client -> Server: requested view distance.
    RequestChunkRadius = 0x45,
    /// Server -> Client: granted view distance.
    ChunkRadiusUpdated = 0x46,
}

/// Every registered kind, used to build the lookup table.
const KINDS: [PacketKind; 27] = [
    PacketKind::Login,
    PacketKind::PlayStatus,
    PacketKind::ServerToClientHandshake,
    PacketKind::ClientToServerHandshake,
    PacketKind::Disconnect,
    PacketKind::ResourcePacksInfo,
    PacketKind::ResourcePackStack,
    PacketKind::ResourcePackClientResponse,
    PacketKind::Text,
    PacketKind::SetTime,
    PacketKind::StartGame,
    PacketKind::AddPlayer,
    PacketKind::AddEntity,
    PacketKind::RemoveEntity,
    PacketKind::MovePlayer,
    PacketKind::UpdateBlock,
    PacketKind::LevelEvent,
    PacketKind::EntityEvent,
    PacketKind::MobEquipment,
    PacketKind::Interact,
    PacketKind::PlayerAction,
    PacketKind::SetEntityData,
    PacketKind::Animate,
    PacketKind::Respawn,
    PacketKind::FullChunkData,
    PacketKind::RequestChunkRadius,
    PacketKind::ChunkRadiusUpdated,
];

const fn build_registry() -> [Option<PacketKind>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < KINDS.len() {
        table[KINDS[i] as usize] = Some(KINDS[i]);
        i += 1;
    }
    table
}

/// Static id → kind table.
static REGISTRY: [Option<PacketKind>; 256] = build_registry();

/// Decoder signature stored per registered kind.
pub type DecodeFn = fn(Bytes, u32) -> Option<Packet>;

impl PacketKind {
    /// Looks up a packet type id.
    #[inline]
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        REGISTRY[id as usize]
    }

    /// Returns the wire id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns the decoder for this kind.
    ///
    /// Every registered kind decodes to the generic wire form; parsing the
    /// body is left to the [`Identity`](crate::integration::Identity). Ids
    /// absent from the registry have no decoder at all.
    #[must_use]
    pub const fn decoder(self) -> DecodeFn {
        Packet::from_wire
    }

    /// Human readable name, used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::PlayStatus => "PlayStatus",
            Self::ServerToClientHandshake => "ServerToClientHandshake",
            Self::ClientToServerHandshake => "ClientToServerHandshake",
            Self::Disconnect => "Disconnect",
            Self::ResourcePacksInfo => "ResourcePacksInfo",
            Self::ResourcePackStack => "ResourcePackStack",
            Self::ResourcePackClientResponse => "ResourcePackClientResponse",
            Self::Text => "Text",
            Self::SetTime => "SetTime",
            Self::StartGame => "StartGame",
            Self::AddPlayer => "AddPlayer",
            Self::AddEntity => "AddEntity",
            Self::RemoveEntity => "RemoveEntity",
            Self::MovePlayer => "MovePlayer",
            Self::UpdateBlock => "UpdateBlock",
            Self::LevelEvent => "LevelEvent",
            Self::EntityEvent => "EntityEvent",
            Self::MobEquipment => "MobEquipment",
            Self::Interact => "Interact",
            Self::PlayerAction => "PlayerAction",
            Self::SetEntityData => "SetEntityData",
            Self::Animate => "Animate",
            Self::Respawn => "Respawn",
            Self::FullChunkData => "FullChunkData",
            Self::RequestChunkRadius => "RequestChunkRadius",
            Self::ChunkRadiusUpdated => "ChunkRadiusUpdated",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An application packet.
///
/// Starts out unencoded; [`Packet::encode`] freezes it into its wire form
/// (`id` followed by the payload). Once encoded it never changes again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    id: u8,
    payload: Bytes,
    buffer: Bytes,
    encoded: bool,
    protocol: Option<u32>,
}

impl Packet {
    /// Creates an unencoded packet.
    #[must_use]
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
            buffer: Bytes::new(),
            encoded: false,
            protocol: None,
        }
    }

    /// Creates an unencoded packet of a registered kind.
    #[must_use]
    pub fn of_kind(kind: PacketKind, payload: impl Into<Bytes>) -> Self {
        Self::new(kind.id(), payload)
    }

    /// Pins the protocol version this packet is encoded for.
    ///
    /// Has no effect once the packet is encoded.
    #[must_use]
    pub fn with_protocol(mut self, protocol: u32) -> Self {
        if !self.encoded {
            self.protocol = Some(protocol);
        }
        self
    }

    /// Builds an encoded packet from one batch entry.
    ///
    /// Returns `None` for an empty entry, which carries no type id.
    #[must_use]
    pub fn from_wire(buffer: Bytes, protocol: u32) -> Option<Self> {
        let id = *buffer.first()?;
        Some(Self {
            id,
            payload: buffer.slice(1..),
            buffer,
            encoded: true,
            protocol: Some(protocol),
        })
    }

    /// Serializes the packet into its final form.
    ///
    /// The protocol version falls back to `default_protocol` when none was
    /// pinned. Encoding an already encoded packet is a no-op.
    pub fn encode(&mut self, default_protocol: u32) {
        if self.encoded {
            return;
        }
        let protocol = *self.protocol.get_or_insert(default_protocol);
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.id);
        buf.put_slice(&self.payload);
        self.buffer = buf.freeze();
        self.encoded = true;
        tracing::trace!(packet = self.id, protocol, len = self.buffer.len(), "packet encoded");
    }

    /// Packet type id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Registered kind, if the id is known.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::from_id(self.id)
    }

    /// Payload without the type id.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encoded wire bytes; empty until [`Packet::encode`] runs.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Whether the packet is in its final encoded form.
    #[inline]
    #[must_use]
    pub const fn is_encoded(&self) -> bool {
        self.encoded
    }

    /// Protocol version the packet is (or will be) encoded for.
    #[inline]
    #[must_use]
    pub const fn protocol(&self) -> Option<u32> {
        self.protocol
    }

    /// Display name for logs: the registered kind or the raw id.
    #[must_use]
    pub fn name(&self) -> String {
        self.kind()
            .map_or_else(|| format!("Unknown(0x{:02x})", self.id), |k| k.name().to_owned())
    }
}

/// A pre-built batch: an already compressed payload sent as its own frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFrame {
    payload: Bytes,
}

impl BatchFrame {
    /// Wraps an already compressed batch payload (without the marker byte).
    #[must_use]
    pub fn from_compressed(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Compressed payload without the marker byte.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Full wire frame: marker byte followed by the payload.
    #[must_use]
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(BATCH_MARKER);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// One item of the outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A single packet, coalesced with its neighbours on the next tick.
    Single(Packet),
    /// A pre-built batch, sent standalone.
    Batch(BatchFrame),
}

impl From<Packet> for Outbound {
    fn from(packet: Packet) -> Self {
        Self::Single(packet)
    }
}

impl From<BatchFrame> for Outbound {
    fn from(frame: BatchFrame) -> Self {
        Self::Batch(frame)
    }
}
