use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game_logic::MovementBase;
use crate::movement::{MoveStep, MovementMode, ProxyFlags, SavedMove, ServerMove, decode_full};
use crate::prediction::Correction;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown movement mode byte {0:#04x}")]
    UnknownMode(u8),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MoveStepData {
    pub timestamp: f64,
    pub delta_time: f32,
    pub acceleration: [f32; 3],
}

impl From<&MoveStep> for MoveStepData {
    fn from(step: &MoveStep) -> Self {
        Self {
            timestamp: step.timestamp,
            delta_time: step.delta_time,
            acceleration: step.acceleration.to_array(),
        }
    }
}

impl From<&MoveStepData> for MoveStep {
    fn from(data: &MoveStepData) -> Self {
        Self {
            timestamp: data.timestamp,
            delta_time: data.delta_time,
            acceleration: Vec3::from_array(data.acceleration),
        }
    }
}

/// One (possibly combined) client move as sent to the server.
///
/// `timestamp`, `delta_time` and `acceleration` describe the move as a
/// whole; `steps` lists the ticks it was built from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientMoveData {
    pub timestamp: f64,
    pub delta_time: f32,
    pub acceleration: [f32; 3],
    #[serde(default)]
    pub steps: Vec<MoveStepData>,
    pub compressed_flags: u8,
    #[serde(default)]
    pub extended_flags: u8,
    /// Absolute location after the move
    pub location: [f32; 3],
    pub movement_base: Option<u32>,
    #[serde(default)]
    pub base_bone_name: String,
    pub movement_mode: u8,
}

impl ClientMoveData {
    pub fn from_saved(saved: &SavedMove) -> Self {
        Self {
            timestamp: saved.timestamp,
            delta_time: saved.delta_time,
            acceleration: saved.acceleration.to_array(),
            steps: saved.steps.iter().map(MoveStepData::from).collect(),
            compressed_flags: saved.flags.bits(),
            extended_flags: saved.extended.bits(),
            location: saved.end.location.to_array(),
            movement_base: saved.end_base.map(|base| base.0),
            base_bone_name: String::new(),
            movement_mode: saved.end_mode.to_byte(),
        }
    }

    /// What the server simulates. Undefined flag bits are dropped and an
    /// unknown mode byte becomes `client_mode: None`.
    pub fn to_server_move(&self) -> ServerMove {
        let steps = if self.steps.is_empty() {
            vec![MoveStep {
                timestamp: self.timestamp,
                delta_time: self.delta_time,
                acceleration: Vec3::from_array(self.acceleration),
            }]
        } else {
            self.steps.iter().map(MoveStep::from).collect()
        };
        ServerMove {
            steps,
            intent: decode_full(self.compressed_flags, self.extended_flags),
            client_location: Vec3::from_array(self.location),
            client_mode: MovementMode::from_byte(self.movement_mode),
            client_base: self.movement_base.map(MovementBase),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CorrectionData {
    pub timestamp: f64,
    pub location: [f32; 3],
    pub velocity: [f32; 3],
    pub movement_base: Option<u32>,
    pub base_bone_name: String,
    pub movement_mode: u8,
    pub gravity_direction: [f32; 3],
}

impl From<&Correction> for CorrectionData {
    fn from(correction: &Correction) -> Self {
        Self {
            timestamp: correction.timestamp,
            location: correction.location.to_array(),
            velocity: correction.velocity.to_array(),
            movement_base: correction.base.map(|base| base.0),
            base_bone_name: correction.base_bone_name.clone(),
            movement_mode: correction.mode.to_byte(),
            gravity_direction: correction.gravity_direction.to_array(),
        }
    }
}

impl TryFrom<&CorrectionData> for Correction {
    type Error = WireError;

    fn try_from(data: &CorrectionData) -> Result<Self, Self::Error> {
        let mode = MovementMode::from_byte(data.movement_mode)
            .ok_or(WireError::UnknownMode(data.movement_mode))?;
        Ok(Self {
            timestamp: data.timestamp,
            location: Vec3::from_array(data.location),
            velocity: Vec3::from_array(data.velocity),
            base: data.movement_base.map(MovementBase),
            base_bone_name: data.base_bone_name.clone(),
            mode,
            gravity_direction: Vec3::from_array(data.gravity_direction),
        })
    }
}

/// Cosmetic state of a remote character for observers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ProxyUpdateData {
    pub location: [f32; 3],
    pub movement_mode: u8,
    pub dash: bool,
    pub short_mantle: bool,
    pub tall_mantle: bool,
}

impl ProxyUpdateData {
    pub fn flags(&self) -> ProxyFlags {
        ProxyFlags {
            dash: self.dash,
            short_mantle: self.short_mantle,
            tall_mantle: self.tall_mantle,
        }
    }
}

// Messages from the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Move(ClientMoveData),
    Ping { timestamp: f64 },
}

// Messages from the server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Ack { timestamp: f64 },
    Correction(CorrectionData),
    ProxyUpdate(ProxyUpdateData),
    Pong { timestamp: f64 },
}

/// One JSON message per datagram.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode_client_message(payload: &[u8]) -> Result<ClientMessage, WireError> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn decode_server_message(payload: &[u8]) -> Result<ServerMessage, WireError> {
    Ok(serde_json::from_slice(payload)?)
}
