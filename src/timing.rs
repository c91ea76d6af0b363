use crate::error::{SignweaveError, SignweaveResult};

/// Timing-slot table threaded explicitly through the sequencer, synthesizer,
/// composer and scheduler. All values are seconds; slot durations are divided
/// by the effective sign speed at the point of use, closing phases and the
/// inter-sign overlap are fixed.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// Hand/arm positioning slot; also the attack slot of a posture.
    pub loc_slot: f32,
    /// Return-to-posture slot spliced between repeat iterations.
    pub posture_slot: f32,
    /// Natural span of a directed motion.
    pub directed_slot: f32,
    /// Natural span of a circular motion.
    pub circular_slot: f32,
    /// Natural span of a wrist motion.
    pub wrist_slot: f32,
    /// Natural span of a fingerplay motion.
    pub fingerplay_slot: f32,
    /// Natural span of an in-motion handshape change.
    pub change_posture_slot: f32,
    /// Sign-closing phase between the last peak and relax.
    pub peak_relax: f32,
    /// Sign-closing phase between relax and the sign end.
    pub relax_end: f32,
    /// Dead time appended by a repeat construct's `rest` attribute.
    pub rest_slot: f32,
    /// Non-manual attack slot.
    pub nmf_attack: f32,
    /// Non-manual hold slot (lengthened by `repetition`).
    pub nmf_hold: f32,
    /// Non-manual release slot.
    pub nmf_relax: f32,
    /// Overlap between consecutive signs' trailing phases.
    pub sign_overlap: f32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            loc_slot: 0.5,
            posture_slot: 0.4,
            directed_slot: 0.5,
            circular_slot: 0.7,
            wrist_slot: 0.4,
            fingerplay_slot: 0.6,
            change_posture_slot: 0.4,
            peak_relax: 0.4,
            relax_end: 0.6,
            rest_slot: 0.3,
            nmf_attack: 0.3,
            nmf_hold: 0.3,
            nmf_relax: 0.3,
            sign_overlap: 0.2,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> SignweaveResult<()> {
        let slots = [
            ("loc_slot", self.loc_slot),
            ("posture_slot", self.posture_slot),
            ("directed_slot", self.directed_slot),
            ("circular_slot", self.circular_slot),
            ("wrist_slot", self.wrist_slot),
            ("fingerplay_slot", self.fingerplay_slot),
            ("change_posture_slot", self.change_posture_slot),
            ("peak_relax", self.peak_relax),
            ("relax_end", self.relax_end),
            ("rest_slot", self.rest_slot),
            ("nmf_attack", self.nmf_attack),
            ("nmf_hold", self.nmf_hold),
            ("nmf_relax", self.nmf_relax),
        ];
        for (name, v) in slots {
            if !v.is_finite() || v <= 0.0 {
                return Err(SignweaveError::validation(format!(
                    "timing slot '{name}' must be finite and > 0"
                )));
            }
        }
        if !self.sign_overlap.is_finite() || self.sign_overlap < 0.0 {
            return Err(SignweaveError::validation(
                "sign_overlap must be finite and >= 0",
            ));
        }
        Ok(())
    }
}
