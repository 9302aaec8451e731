use serde_json::{json, Value};

use crate::project::project;
use crate::store::Store;

/// Gateway opcodes, matching the real wire numbering. Only DISPATCH,
/// HEARTBEAT, IDENTIFY, HELLO and HEARTBEAT_ACK are handled by this mock;
/// the rest are reserved so inbound frames from a real client map onto the
/// unhandled arm instead of a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    VoiceStateUpdate = 4,
    VoiceServerPing = 5,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn from_u8(op: u8) -> Option<Self> {
        Some(match op {
            0 => OpCode::Dispatch,
            1 => OpCode::Heartbeat,
            2 => OpCode::Identify,
            3 => OpCode::PresenceUpdate,
            4 => OpCode::VoiceStateUpdate,
            5 => OpCode::VoiceServerPing,
            6 => OpCode::Resume,
            7 => OpCode::Reconnect,
            8 => OpCode::RequestGuildMembers,
            9 => OpCode::InvalidSession,
            10 => OpCode::Hello,
            11 => OpCode::HeartbeatAck,
            _ => return None,
        })
    }
}

/// Close codes.
pub mod close_code {
    /// The client asked for something this mock does not do (payload
    /// compression on IDENTIFY).
    pub const UNSUPPORTED_FEATURE: u16 = 4000;
    pub const DECODE_ERROR: u16 = 4002;
    pub const AUTH_FAILED: u16 = 4004;
    pub const ALREADY_AUTHENTICATED: u16 = 4005;
}

/// Outbound frame. `s` is stamped by the session on DISPATCH and must stay
/// `None` everywhere else.
#[derive(Debug, Clone)]
pub struct Payload {
    pub op: OpCode,
    pub d: Value,
    pub t: Option<String>,
    pub s: Option<u64>,
}

impl Payload {
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self {
            op: OpCode::Hello,
            d: json!({
                "heartbeat_interval": heartbeat_interval_ms,
                "_trace": ["powerunit"],
            }),
            t: None,
            s: None,
        }
    }

    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck,
            d: Value::Null,
            t: None,
            s: None,
        }
    }

    pub fn dispatch(event: &str, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            t: Some(event.to_string()),
            s: None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("op".into(), Value::from(self.op as u8));
        map.insert("d".into(), self.d.clone());
        if let Some(t) = &self.t {
            map.insert("t".into(), Value::from(t.as_str()));
        }
        if let Some(s) = self.s {
            map.insert("s".into(), Value::from(s));
        }
        Value::Object(map)
    }
}

/// Inbound frame after ETF decoding. Only the fields this mock routes on;
/// the wire contract is that both `op` and `d` are present. A present but
/// non-integer `op` passes the shape check and lands on the unhandled arm,
/// same as an unknown integer.
#[derive(Debug)]
pub struct InboundFrame {
    pub op: Value,
    pub d: Value,
}

impl InboundFrame {
    /// `None` means the frame fails the shape contract (4002 territory).
    pub fn from_value(value: Value) -> Option<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            _ => return None,
        };
        let op = map.remove("op")?;
        let d = map.remove("d")?;
        Some(Self { op, d })
    }

    pub fn opcode(&self) -> Option<OpCode> {
        self.op
            .as_u64()
            .and_then(|op| u8::try_from(op).ok())
            .and_then(OpCode::from_u8)
    }
}

/// Builds the READY bootstrap snapshot. All list-valued fields are empty:
/// the mock models a lone account with no guilds, friends or presences.
pub fn ready(store: &Store, session_id: &str) -> Value {
    let user = serde_json::to_value(store.read_self()).unwrap_or(Value::Null);
    let settings = user.get("settings").cloned().unwrap_or(Value::Null);
    json!({
        "v": 8,
        "analytics_token": "powerunit.analytics",
        "connected_accounts": [],
        "consents": { "personalization": { "consented": false } },
        "country_code": "FR",
        "experiments": [],
        "friend_suggestion_count": 0,
        "geo_ordered_rtc_regions": [],
        "guild_experiments": [],
        "guild_join_requests": [],
        "guilds": [],
        "merged_members": [],
        "private_channels": [],
        "read_state": {
            "version": 50,
            "partial": false,
            "entries": [],
        },
        "relationships": [],
        "session_id": session_id,
        "tutorial": null,
        "user": project(&user, &["settings"], true),
        "user_guild_settings": {
            "version": 0,
            "partial": false,
            "entries": [],
        },
        "user_settings": settings,
        "users": [],
        "_trace": ["powerunit"],
    })
}

pub fn ready_supplemental() -> Value {
    json!({
        "guilds": [],
        "merged_members": [],
        "merged_presences": {
            "guilds": [],
            "friends": [],
        },
    })
}
