//! Output data model: the flat, timed behavior-instruction stream consumed by
//! an avatar realizer. Instructions are order-independent; the realizer
//! schedules by `start`. Absent timing fields serialize as absent, never as
//! zero.

fn is_false(v: &bool) -> bool {
    !v
}

/// The four named timing phases of an instruction. Four-phase instructions
/// carry all of them once a sign is closed; simple timed instructions carry
/// only `start`/`end`. Invariant where present: start <= attack_peak <= relax
/// <= end.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_peak: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relax: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f32>,
}

impl SyncPoints {
    pub fn at(start: f32) -> Self {
        Self {
            start: Some(start),
            ..Self::default()
        }
    }

    pub fn span(start: f32, end: f32) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn reaching(start: f32, attack_peak: f32) -> Self {
        Self {
            start: Some(start),
            attack_peak: Some(attack_peak),
            ..Self::default()
        }
    }

    pub fn is_monotonic(&self) -> bool {
        let mut prev = f32::NEG_INFINITY;
        for v in [self.start, self.attack_peak, self.relax, self.end]
            .into_iter()
            .flatten()
        {
            if v < prev {
                return false;
            }
            prev = v;
        }
        true
    }

    /// Latest resolved phase, used as the instruction's effective end.
    pub fn latest(&self) -> Option<f32> {
        [self.start, self.attack_peak, self.relax, self.end]
            .into_iter()
            .flatten()
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
    }

    pub fn shift(&mut self, dt: f32) {
        for v in [
            &mut self.start,
            &mut self.attack_peak,
            &mut self.relax,
            &mut self.end,
        ] {
            if let Some(t) = v {
                *t += dt;
            }
        }
    }

    /// Proportionally remaps every resolved phase from the `old` span onto the
    /// `new` span. Relative internal ordering is preserved; a degenerate old
    /// span maps everything to the new start.
    pub fn remap(&mut self, old: (f32, f32), new: (f32, f32)) {
        let old_len = old.1 - old.0;
        for v in [
            &mut self.start,
            &mut self.attack_peak,
            &mut self.relax,
            &mut self.end,
        ] {
            if let Some(t) = v {
                let u = if old_len.abs() <= f32::EPSILON {
                    0.0
                } else {
                    (*t - old.0) / old_len
                };
                *t = new.0 + u * (new.1 - new.0);
            }
        }
    }

    /// Reflects the phases around `pivot`, reassigning the mirrored values in
    /// reverse to the same resolved slots so ascending order is kept. Used
    /// for the middle segment of a to-fro-to repeat.
    pub fn mirror(&mut self, pivot: f32) {
        let mut slots: Vec<&mut Option<f32>> = [
            &mut self.start,
            &mut self.attack_peak,
            &mut self.relax,
            &mut self.end,
        ]
        .into_iter()
        .filter(|v| v.is_some())
        .collect();
        let mirrored: Vec<f32> = slots
            .iter()
            .rev()
            .map(|v| 2.0 * pivot - v.unwrap_or_default())
            .collect();
        for (slot, v) in slots.iter_mut().zip(mirrored) {
            **slot = Some(v);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Right,
    Left,
    Both,
}

impl Hand {
    pub fn other(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Both => Self::Both,
        }
    }

    /// Whether an instruction stamped with `self` drives the physical hand
    /// `h` (`Both` drives either).
    pub fn covers(self, h: Hand) -> bool {
        self == h || self == Self::Both
    }
}

/// A contact point on the body or on the other hand, used by locations and
/// hand constellations.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPoint {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digits: Option<String>,
}

/// Payload of a `gesture` instruction. Untagged: the populated fields
/// identify the kind on the wire, as the realizer expects.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum GestureKind {
    #[serde(rename_all = "camelCase")]
    Handshape {
        handshape: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        second_handshape: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thumbpos: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mainbend: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FingerOrientation {
        extfidir: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        second_extfidir: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PalmOrientation {
        palmor: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        second_palmor: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Location {
        location: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        second_location: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        side: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        contact: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    HandConstellation {
        src_contact: ContactPoint,
        dst_contact: ContactPoint,
    },
    #[serde(rename_all = "camelCase")]
    DirectedMotion {
        motion: MotionTag,
        direction: [f32; 3],
        distance: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        curve: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        curve_size: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        zigzag: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        zigzag_size: Option<f32>,
    },
    #[serde(rename_all = "camelCase")]
    CircularMotion {
        motion: MotionTag,
        axis: [f32; 3],
        start_angle: f32,
        end_angle: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        zigzag: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    WristMotion {
        motion: MotionTag,
        mode: String,
        intensity: f32,
    },
    #[serde(rename_all = "camelCase")]
    Fingerplay {
        motion: MotionTag,
        #[serde(skip_serializing_if = "Option::is_none")]
        digits: Option<String>,
        intensity: f32,
    },
    #[serde(rename_all = "camelCase")]
    Shoulder { raise: f32, hunch: f32 },
    #[serde(rename_all = "camelCase")]
    Body { movement: String, amount: f32 },
}

/// Wire discriminant of motion gestures, so a realizer can select the motion
/// family without probing fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MotionTag {
    Directed,
    Circular,
    Wrist,
    Fingerplay,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Gesture {
    pub hand: Hand,
    #[serde(rename = "lrSym", skip_serializing_if = "is_false")]
    pub lr_sym: bool,
    #[serde(rename = "udSym", skip_serializing_if = "is_false")]
    pub ud_sym: bool,
    #[serde(rename = "oiSym", skip_serializing_if = "is_false")]
    pub oi_sym: bool,
    #[serde(flatten)]
    pub sync: SyncPoints,
    #[serde(flatten)]
    pub kind: GestureKind,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadMove {
    pub lexeme: String,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub repetition: u32,
    pub amount: f32,
    #[serde(flatten)]
    pub sync: SyncPoints,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeShift {
    pub influence: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_direction: Option<String>,
    #[serde(flatten)]
    pub sync: SyncPoints,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLexeme {
    pub lexeme: String,
    pub amount: f32,
    #[serde(flatten)]
    pub sync: SyncPoints,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechFragment {
    pub text: String,
    pub phoneme_durations: Vec<f32>,
    #[serde(flatten)]
    pub sync: SyncPoints,
}

/// Leading gloss-label pseudo-instruction prepended to a sign's stream when
/// the document supplies a gloss.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossLabel {
    pub gloss: String,
    pub start: f32,
    pub end: f32,
}

/// The sole output unit of the transducer, discriminated by `type` on the
/// wire.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "type")]
pub enum BehaviorInstruction {
    #[serde(rename = "gesture")]
    Gesture(Gesture),
    #[serde(rename = "head")]
    Head(HeadMove),
    #[serde(rename = "gaze")]
    Gaze(GazeShift),
    #[serde(rename = "faceLexeme")]
    FaceLexeme(FaceLexeme),
    #[serde(rename = "speech")]
    Speech(SpeechFragment),
    #[serde(rename = "gloss")]
    Gloss(GlossLabel),
}

impl BehaviorInstruction {
    pub fn sync(&self) -> Option<&SyncPoints> {
        match self {
            Self::Gesture(g) => Some(&g.sync),
            Self::Head(h) => Some(&h.sync),
            Self::Gaze(g) => Some(&g.sync),
            Self::FaceLexeme(f) => Some(&f.sync),
            Self::Speech(s) => Some(&s.sync),
            Self::Gloss(_) => None,
        }
    }

    pub fn sync_mut(&mut self) -> Option<&mut SyncPoints> {
        match self {
            Self::Gesture(g) => Some(&mut g.sync),
            Self::Head(h) => Some(&mut h.sync),
            Self::Gaze(g) => Some(&mut g.sync),
            Self::FaceLexeme(f) => Some(&mut f.sync),
            Self::Speech(s) => Some(&mut s.sync),
            Self::Gloss(_) => None,
        }
    }

    pub fn start(&self) -> Option<f32> {
        match self {
            Self::Gloss(g) => Some(g.start),
            other => other.sync().and_then(|s| s.start),
        }
    }

    pub fn hand(&self) -> Option<Hand> {
        match self {
            Self::Gesture(g) => Some(g.hand),
            _ => None,
        }
    }
}
