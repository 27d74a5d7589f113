use crate::{
    error::{CurtainError, Result},
    types::{AdvancedState, ChargeState, MotionStatus, PrimaryState, StateFlags},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Decoded length of a primary state frame in bytes
pub const PRIMARY_FRAME_LEN: usize = 8;

/// Minimum length of an advanced status page in bytes
pub const ADVANCED_FRAME_MIN_LEN: usize = 4;

/// Highest position value the device accepts
pub const MAX_POSITION: u8 = 100;

/// Request the primary state frame
///
/// Extracted from BLE traffic captures of the official SwitchBot app.
/// The device answers on the notify characteristic with an 8-byte
/// primary state frame.
pub const FETCH_STATE_COMMAND: [u8; 2] = [0x57, 0x02];

/// Request page 2 of the advanced status table
///
/// The device answers with a short page carrying the charging source.
pub const FETCH_ADVANCED_COMMAND: [u8; 5] = [0x57, 0x0F, 0x46, 0x04, 0x02];

/// Halt the motor immediately
pub const STOP_COMMAND: [u8; 6] = [0x57, 0x0F, 0x45, 0x01, 0x00, 0xFF];

/// Prefix of a move command; the target position byte follows
pub const MOVE_TO_PREFIX: [u8; 6] = [0x57, 0x0F, 0x45, 0x01, 0x05, 0xFF];

/// Commands that can be written to the curtain's command characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request the primary state frame
    FetchState,
    /// Request the advanced status page
    FetchAdvanced,
    /// Halt the motor
    Stop,
    /// Travel to a position in device orientation, 0 to 100
    MoveTo(u8),
}

impl Command {
    /// Encodes the command into its wire representation.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        match self {
            Self::FetchState => buf.put_slice(&FETCH_STATE_COMMAND),
            Self::FetchAdvanced => buf.put_slice(&FETCH_ADVANCED_COMMAND),
            Self::Stop => buf.put_slice(&STOP_COMMAND),
            Self::MoveTo(position) => {
                buf.put_slice(&MOVE_TO_PREFIX);
                buf.put_u8(*position);
            }
        }
        buf.freeze()
    }
}

/// Frame families distinguishable by their length before padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// 7 or 8 byte primary state frame
    Primary,
    /// 4 to 6 byte advanced status page
    Advanced,
    /// Anything else, dropped without decoding
    Unrecognized,
}

/// Classifies a raw notification by its length as received, before any
/// padding is applied.
#[must_use]
pub fn classify(raw: &[u8]) -> FrameKind {
    match raw.len() {
        7..=8 => FrameKind::Primary,
        4..=6 => FrameKind::Advanced,
        _ => FrameKind::Unrecognized,
    }
}

/// Decodes a primary state frame.
///
/// Frames shorter than 8 bytes are zero padded on the right before
/// decoding. Frames longer than 8 bytes are rejected.
pub fn decode_primary(raw: &[u8]) -> Result<PrimaryState> {
    if raw.len() > PRIMARY_FRAME_LEN {
        return Err(CurtainError::MalformedFrame(format!(
            "primary frame too long: {} bytes",
            raw.len()
        )));
    }

    let mut padded = [0u8; PRIMARY_FRAME_LEN];
    padded[..raw.len()].copy_from_slice(raw);
    let mut buf = &padded[..];

    let response_status = buf.get_u8();
    let battery_percentage = buf.get_u8();
    let firmware_version = buf.get_u8();
    let device_chain_length = buf.get_u8();
    let state_1 = buf.get_u8();
    let state_2 = decode_state_flags(buf.get_u8())?;
    let position = buf.get_u8();
    let number_of_timers = buf.get_u8();

    Ok(PrimaryState {
        response_status,
        battery_percentage,
        firmware_version,
        device_chain_length,
        state_1,
        state_2,
        position,
        number_of_timers,
    })
}

/// Decodes the flag nibble of byte 5 in a primary state frame.
///
/// Bit 3 carries the solar panel flag, bit 2 the calibration flag and
/// bits 1 to 0 the motion index. The high nibble is ignored.
pub fn decode_state_flags(byte: u8) -> Result<StateFlags> {
    let motion_bits = byte & 0x03;
    let motion_status = MotionStatus::from_index(motion_bits).ok_or_else(|| {
        CurtainError::MalformedFrame(format!("invalid motion index: {motion_bits}"))
    })?;

    Ok(StateFlags {
        is_solar_panel_connected: byte & 0x08 != 0,
        is_calibrated: byte & 0x04 != 0,
        motion_status,
    })
}

/// Decodes an advanced status page.
///
/// Only the first four bytes carry data; anything beyond is ignored.
pub fn decode_advanced(raw: &[u8]) -> Result<AdvancedState> {
    if raw.len() < ADVANCED_FRAME_MIN_LEN {
        return Err(CurtainError::MalformedFrame(format!(
            "advanced page too short: {} bytes",
            raw.len()
        )));
    }

    let mut buf = raw;
    let response_status = buf.get_u8();
    let battery_percentage = buf.get_u8();
    let firmware_version = buf.get_u8();
    let charge_byte = buf.get_u8();
    let state_of_charge = ChargeState::from_index(charge_byte).ok_or_else(|| {
        CurtainError::MalformedFrame(format!("invalid charge state index: {charge_byte}"))
    })?;

    Ok(AdvancedState {
        response_status,
        battery_percentage,
        firmware_version,
        state_of_charge,
    })
}
