pub mod protocol;
pub mod registry;

use tracing::{debug, warn};

use crate::world::service::WorldHandle;
use protocol::{ClientRequest, MapParams, ServerFrame};

/// Per-connection cursor on the global tile lattice. Movement codes are the
/// browser arrow-key codes (37..=40); anything else leaves the cursor where
/// it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub x: i64,
    pub y: i64,
}

impl Cursor {
    pub fn apply_move(&mut self, code: i32) {
        match code {
            37 => self.x -= 1,
            38 => self.y += 1,
            39 => self.x += 1,
            40 => self.y -= 1,
            _ => {}
        }
    }
}

/// One client's protocol state: its cursor and its line to the world task.
/// Owned by the connection task, so cursor updates never race.
pub struct Session {
    id: String,
    world: WorldHandle,
    cursor: Cursor,
}

impl Session {
    pub fn new(id: String, world: WorldHandle) -> Session {
        Session {
            id,
            world,
            cursor: Cursor::default(),
        }
    }

    /// Handle one inbound text frame and return the outbound frames in send
    /// order. Malformed and unrecognized requests produce no frames; only a
    /// response that fails to encode is a hard error.
    pub async fn handle_text(&mut self, text: &str) -> Result<Vec<String>, serde_json::Error> {
        let request = match protocol::decode(text) {
            Ok(request) => request,
            Err(err) => {
                debug!(session = %self.id, error = %err, "dropping malformed request");
                return Ok(Vec::new());
            }
        };

        match request {
            ClientRequest::Map(params) => self.handle_map(params).await,
            ClientRequest::Move(params) => {
                self.cursor.apply_move(params.direction);
                debug!(
                    session = %self.id,
                    direction = params.direction,
                    x = self.cursor.x,
                    y = self.cursor.y,
                    "cursor moved"
                );
                let frame = ServerFrame::UserPos {
                    pos_x: self.cursor.x,
                    pos_y: self.cursor.y,
                };
                Ok(vec![serde_json::to_string(&frame)?])
            }
            ClientRequest::UserInit => {
                let frame = ServerFrame::UserInit {
                    pos_x: self.cursor.x,
                    pos_y: self.cursor.y,
                };
                Ok(vec![serde_json::to_string(&frame)?])
            }
            ClientRequest::Unknown(req) => {
                debug!(session = %self.id, req = %req, "unrecognized request");
                Ok(Vec::new())
            }
        }
    }

    /// Serve a MAP request: one frame per tile, then exactly one end marker.
    /// Failures surface as a single MAP_ERROR frame with no partial tiles in
    /// front of it.
    async fn handle_map(&mut self, params: MapParams) -> Result<Vec<String>, serde_json::Error> {
        let rect = params.rect();
        match self.world.query_rect(rect).await {
            Ok(records) => {
                let mut frames = Vec::with_capacity(records.len() + 1);
                for record in &records {
                    frames.push(serde_json::to_string(&ServerFrame::tile(record))?);
                }
                frames.push(serde_json::to_string(&ServerFrame::MapSendEnd)?);
                Ok(frames)
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "map query failed");
                Ok(vec![serde_json::to_string(&ServerFrame::MapError)?])
            }
        }
    }
}
