use crate::instruction::Hand;

bitflags::bitflags! {
    /// Mirroring flags applied to a two-handed sign: the realizer derives the
    /// non-dominant hand's articulation by flipping the flagged axes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct SymFlags: u8 {
        /// Mirror across the left-right axis.
        const LR = 1 << 0;
        /// Mirror across the up-down axis.
        const UD = 1 << 1;
        /// Mirror across the out-in axis.
        const OI = 1 << 2;
    }
}

/// Tempo multipliers picked up from nested `fast`/`slow`/`tense` attributes.
pub const FAST_TEMPO: f32 = 1.5;
pub const SLOW_TEMPO: f32 = 0.5;
pub const TENSE_TEMPO: f32 = 0.75;

/// Per-sign configuration threaded through the manual synthesizer and the
/// motion composer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignContext {
    pub dominant: Hand,
    pub both_hands: bool,
    pub sym: SymFlags,
    pub out_of_phase: bool,
    /// Effective speed multiplier; slot durations divide by it.
    pub speed: f32,
}

impl Default for SignContext {
    fn default() -> Self {
        Self {
            dominant: Hand::Right,
            both_hands: false,
            sym: SymFlags::empty(),
            out_of_phase: false,
            speed: 1.0,
        }
    }
}

impl SignContext {
    pub fn non_dominant(&self) -> Hand {
        self.dominant.other()
    }

    /// Hand stamped onto instructions that do not name one themselves.
    pub fn ambient_hand(&self) -> Hand {
        if self.both_hands {
            Hand::Both
        } else {
            self.dominant
        }
    }

    /// Copy scoped to a single hand with symmetry cleared, as required by
    /// split constructs.
    pub fn scoped_to(&self, hand: Hand) -> Self {
        Self {
            dominant: hand,
            both_hands: false,
            sym: SymFlags::empty(),
            out_of_phase: false,
            speed: self.speed,
        }
    }

    pub fn with_tempo(&self, tempo: f32) -> Self {
        Self {
            speed: self.speed * tempo,
            ..*self
        }
    }
}

/// Flips the flagged components of a direction or axis vector.
pub fn apply_symmetry(v: [f32; 3], sym: SymFlags) -> [f32; 3] {
    let mut out = v;
    if sym.contains(SymFlags::LR) {
        out[0] = -out[0];
    }
    if sym.contains(SymFlags::UD) {
        out[1] = -out[1];
    }
    if sym.contains(SymFlags::OI) {
        out[2] = -out[2];
    }
    out
}
