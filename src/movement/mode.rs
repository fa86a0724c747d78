use crate::game_logic::MovementSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CustomMode {
    Slide,
    Prone,
    WallRun,
    Hang,
    Climb,
}

impl CustomMode {
    pub const ALL: [CustomMode; 5] = [
        CustomMode::Slide,
        CustomMode::Prone,
        CustomMode::WallRun,
        CustomMode::Hang,
        CustomMode::Climb,
    ];

    /// Position in the integrator dispatch table.
    pub fn index(self) -> usize {
        match self {
            CustomMode::Slide => 0,
            CustomMode::Prone => 1,
            CustomMode::WallRun => 2,
            CustomMode::Hang => 3,
            CustomMode::Climb => 4,
        }
    }

    fn submode_nibble(self) -> u8 {
        self.index() as u8 + 1
    }
}

/// The single active (primary mode, custom submode) pair. A custom primary
/// mode without a submode cannot be represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MovementMode {
    #[default]
    None,
    Walking,
    Falling,
    Swimming,
    Flying,
    Custom(CustomMode),
}

impl MovementMode {
    /// Wire byte: primary mode in the low nibble, submode in the high nibble.
    pub fn to_byte(self) -> u8 {
        match self {
            MovementMode::None => 0,
            MovementMode::Walking => 1,
            MovementMode::Falling => 3,
            MovementMode::Swimming => 4,
            MovementMode::Flying => 5,
            MovementMode::Custom(custom) => 6 | (custom.submode_nibble() << 4),
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        let primary = byte & 0x0F;
        let submode = byte >> 4;
        let mode = match (primary, submode) {
            (0, 0) => MovementMode::None,
            (1, 0) => MovementMode::Walking,
            (3, 0) => MovementMode::Falling,
            (4, 0) => MovementMode::Swimming,
            (5, 0) => MovementMode::Flying,
            (6, n @ 1..=5) => MovementMode::Custom(CustomMode::ALL[n as usize - 1]),
            _ => return None,
        };
        Some(mode)
    }

    pub fn custom(self) -> Option<CustomMode> {
        match self {
            MovementMode::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    pub fn is_custom(self, custom: CustomMode) -> bool {
        self == MovementMode::Custom(custom)
    }

    /// Walking and the ground-bound custom modes.
    pub fn is_moving_on_ground(self) -> bool {
        matches!(
            self,
            MovementMode::Walking
                | MovementMode::Custom(CustomMode::Slide)
                | MovementMode::Custom(CustomMode::Prone)
        )
    }

    pub fn max_speed(self, crouched: bool, sprinting: bool, settings: &MovementSettings) -> f32 {
        match self {
            MovementMode::Walking if crouched => settings.max_walk_speed_crouched,
            MovementMode::Walking if sprinting => settings.max_sprint_speed,
            MovementMode::Walking | MovementMode::Falling => settings.max_walk_speed,
            MovementMode::Flying | MovementMode::Swimming => settings.max_fly_speed,
            MovementMode::None => 0.0,
            MovementMode::Custom(CustomMode::Slide) => settings.max_slide_speed,
            MovementMode::Custom(CustomMode::Prone) => settings.max_prone_speed,
            MovementMode::Custom(CustomMode::WallRun) => settings.max_wall_run_speed,
            MovementMode::Custom(CustomMode::Climb) => settings.max_climb_speed,
            MovementMode::Custom(CustomMode::Hang) => 0.0,
        }
    }

    pub fn max_braking_deceleration(self, settings: &MovementSettings) -> f32 {
        match self {
            MovementMode::Walking => settings.braking_deceleration_walking,
            MovementMode::Falling => settings.braking_deceleration_falling,
            MovementMode::Flying | MovementMode::Swimming => settings.braking_deceleration_flying,
            MovementMode::Custom(CustomMode::Slide) => settings.braking_deceleration_sliding,
            MovementMode::Custom(CustomMode::Prone) => settings.braking_deceleration_proning,
            MovementMode::Custom(CustomMode::Climb) => settings.braking_deceleration_climbing,
            MovementMode::Custom(CustomMode::WallRun)
            | MovementMode::Custom(CustomMode::Hang)
            | MovementMode::None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_byte_round_trip() {
        let mut modes = vec![
            MovementMode::None,
            MovementMode::Walking,
            MovementMode::Falling,
            MovementMode::Swimming,
            MovementMode::Flying,
        ];
        modes.extend(CustomMode::ALL.map(MovementMode::Custom));
        for mode in modes {
            assert_eq!(MovementMode::from_byte(mode.to_byte()), Some(mode));
        }
        assert_eq!(MovementMode::Custom(CustomMode::Slide).to_byte(), 0x16);
        assert_eq!(MovementMode::Custom(CustomMode::Climb).to_byte(), 0x56);
    }

    #[test]
    fn test_unknown_mode_bytes_rejected() {
        // Custom without submode, submode on a base mode, unused primary
        assert_eq!(MovementMode::from_byte(0x06), None);
        assert_eq!(MovementMode::from_byte(0x11), None);
        assert_eq!(MovementMode::from_byte(0x02), None);
        assert_eq!(MovementMode::from_byte(0x66), None);
    }

    #[test]
    fn test_max_speed_per_mode() {
        let settings = MovementSettings::default();
        assert_eq!(MovementMode::Walking.max_speed(false, true, &settings), 750.0);
        assert_eq!(MovementMode::Walking.max_speed(true, true, &settings), 300.0);
        assert_eq!(MovementMode::Walking.max_speed(false, false, &settings), 600.0);
        assert_eq!(MovementMode::Custom(CustomMode::Hang).max_speed(false, false, &settings), 0.0);
        assert_eq!(MovementMode::Custom(CustomMode::Prone).max_braking_deceleration(&settings), 2500.0);
    }

    #[test]
    fn test_ground_modes() {
        assert!(MovementMode::Walking.is_moving_on_ground());
        assert!(MovementMode::Custom(CustomMode::Slide).is_moving_on_ground());
        assert!(MovementMode::Custom(CustomMode::Prone).is_moving_on_ground());
        assert!(!MovementMode::Custom(CustomMode::WallRun).is_moving_on_ground());
        assert!(!MovementMode::Falling.is_moving_on_ground());
    }
}
