use serde::{Deserialize, Serialize};

use crate::world::coords::TileRect;
use crate::world::service::TileRecord;

/// Inbound wire envelope. `param` carries a second JSON document
/// double-encoded as a string; that is the framing browser clients send.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub req: String,
    #[serde(default)]
    pub param: String,
}

/// Rectangle request parameters. Endpoints may arrive in either order;
/// missing fields default to zero, which older clients rely on.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapParams {
    pub x_start: i64,
    pub x_end: i64,
    pub y_start: i64,
    pub y_end: i64,
}

impl MapParams {
    pub fn rect(self) -> TileRect {
        TileRect::normalized(self.x_start, self.x_end, self.y_start, self.y_end)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct MoveParams {
    pub direction: i32,
}

/// One decoded client request.
#[derive(Debug)]
pub enum ClientRequest {
    Map(MapParams),
    Move(MoveParams),
    UserInit,
    /// Well-formed envelope with a verb this server does not speak.
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {req} param: {source}")]
    Param {
        req: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn decode(text: &str) -> Result<ClientRequest, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
    match envelope.req.as_str() {
        "MAP" => {
            let params = serde_json::from_str(&envelope.param)
                .map_err(|source| ProtocolError::Param { req: "MAP", source })?;
            Ok(ClientRequest::Map(params))
        }
        "MOVE" => {
            let params = serde_json::from_str(&envelope.param)
                .map_err(|source| ProtocolError::Param { req: "MOVE", source })?;
            Ok(ClientRequest::Move(params))
        }
        "USER_INIT" => Ok(ClientRequest::UserInit),
        _ => Ok(ClientRequest::Unknown(envelope.req)),
    }
}

/// Outbound frames, tagged by `res` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "res")]
pub enum ServerFrame {
    #[serde(rename = "MAP", rename_all = "camelCase")]
    Map {
        data: [u8; 6],
        pos_x: i64,
        pos_y: i64,
    },

    #[serde(rename = "MAP_SEND_END")]
    MapSendEnd,

    #[serde(rename = "MAP_ERROR")]
    MapError,

    #[serde(rename = "USER_POS", rename_all = "camelCase")]
    UserPos { pos_x: i64, pos_y: i64 },

    #[serde(rename = "USER_INIT", rename_all = "camelCase")]
    UserInit { pos_x: i64, pos_y: i64 },
}

impl ServerFrame {
    pub fn tile(record: &TileRecord) -> ServerFrame {
        ServerFrame::Map {
            data: record.data,
            pos_x: record.pos.x,
            pos_y: record.pos.y,
        }
    }
}
