use bitflags::bitflags;

use crate::movement::MovementIntent;

bitflags! {
    /// Per-move intent bits packed for the wire. The low nibble belongs to the
    /// base integrator (jump, crouch and two reserved bits), the high nibble
    /// to the custom abilities. Reserved and spare bits are never set.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompressedFlags: u8 {
        const JUMP = 0x01;
        const CROUCH = 0x02;
        const SPRINT = 0x10;
        const DASH = 0x20;
        const SLIDE = 0x40;
    }
}

bitflags! {
    /// Intent bits and mirrored simulation state that do not fit in the
    /// compressed byte but must travel with a move so it replays identically.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ExtendedFlags: u8 {
        const PRONE = 0x01;
        const CLIMB = 0x02;
        const PREV_CROUCH = 0x04;
        const HAD_ROOT_MOTION = 0x08;
        const TRANSITION_FINISHED = 0x10;
        const WALL_RUN_RIGHT = 0x20;
    }
}

pub const RESERVED_1: u8 = 0x04;
pub const RESERVED_2: u8 = 0x08;
pub const CUSTOM_3: u8 = 0x80;

pub fn encode(intent: &MovementIntent) -> u8 {
    let mut flags = CompressedFlags::empty();
    flags.set(CompressedFlags::JUMP, intent.jump);
    flags.set(CompressedFlags::CROUCH, intent.crouch);
    flags.set(CompressedFlags::SPRINT, intent.sprint);
    flags.set(CompressedFlags::DASH, intent.dash);
    flags.set(CompressedFlags::SLIDE, intent.slide);
    flags.bits()
}

/// Unpack the compressed byte. Unknown bits are dropped, every other
/// intent field is left at its default.
pub fn decode(byte: u8) -> MovementIntent {
    let flags = CompressedFlags::from_bits_truncate(byte);
    MovementIntent {
        jump: flags.contains(CompressedFlags::JUMP),
        crouch: flags.contains(CompressedFlags::CROUCH),
        sprint: flags.contains(CompressedFlags::SPRINT),
        dash: flags.contains(CompressedFlags::DASH),
        slide: flags.contains(CompressedFlags::SLIDE),
        ..Default::default()
    }
}

pub fn encode_extended(intent: &MovementIntent) -> u8 {
    let mut flags = ExtendedFlags::empty();
    flags.set(ExtendedFlags::PRONE, intent.prone);
    flags.set(ExtendedFlags::CLIMB, intent.climb);
    flags.set(ExtendedFlags::PREV_CROUCH, intent.prev_crouch);
    flags.set(ExtendedFlags::HAD_ROOT_MOTION, intent.had_root_motion);
    flags.set(ExtendedFlags::TRANSITION_FINISHED, intent.transition_finished);
    flags.set(ExtendedFlags::WALL_RUN_RIGHT, intent.wall_run_right);
    flags.bits()
}

/// Rebuild the full intent from both wire bytes.
pub fn decode_full(compressed: u8, extended: u8) -> MovementIntent {
    let flags = ExtendedFlags::from_bits_truncate(extended);
    MovementIntent {
        prone: flags.contains(ExtendedFlags::PRONE),
        climb: flags.contains(ExtendedFlags::CLIMB),
        prev_crouch: flags.contains(ExtendedFlags::PREV_CROUCH),
        had_root_motion: flags.contains(ExtendedFlags::HAD_ROOT_MOTION),
        transition_finished: flags.contains(ExtendedFlags::TRANSITION_FINISHED),
        wall_run_right: flags.contains(ExtendedFlags::WALL_RUN_RIGHT),
        ..decode(compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_byte_round_trips_defined_bits() {
        let defined = CompressedFlags::all().bits();
        for byte in 0..=u8::MAX {
            let intent = decode(byte);
            assert_eq!(encode(&intent), byte & defined);
            assert_eq!(decode(encode(&intent)), intent);
        }
    }

    #[test]
    fn test_reserved_bits_never_encoded() {
        let intent = MovementIntent {
            jump: true,
            crouch: true,
            sprint: true,
            slide: true,
            dash: true,
            prone: true,
            climb: true,
            ..Default::default()
        };
        let byte = encode(&intent);
        assert_eq!(byte, 0x73);
        assert_eq!(byte & (RESERVED_1 | RESERVED_2 | CUSTOM_3), 0);
    }

    #[test]
    fn test_extended_round_trip() {
        for extended in 0..=u8::MAX {
            let intent = decode_full(0x13, extended);
            assert!(intent.jump && intent.crouch && intent.sprint);
            assert_eq!(encode_extended(&intent), extended & ExtendedFlags::all().bits());
        }
    }
}
