use serde::{Deserialize, Serialize};

/// Directional stance of a symbol: the state variable of the position state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Short,
    #[default]
    Flat,
    Long,
}

impl Position {
    /// -1 / 0 / +1 encoding used in position and profit columns.
    pub fn as_i8(self) -> i8 {
        match self {
            Position::Short => -1,
            Position::Flat => 0,
            Position::Long => 1,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            -1 => Some(Position::Short),
            0 => Some(Position::Flat),
            1 => Some(Position::Long),
            _ => None,
        }
    }

    pub fn sign(self) -> f64 {
        f64::from(self.as_i8())
    }

    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }
}
