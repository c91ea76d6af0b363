//! Static lookups from short non-manual notation codes to instruction
//! templates. Templates are plain data; callers clone and stamp timing, the
//! tables are never mutated.

use crate::instruction::Hand;

/// One templated instruction before timing and amount scaling are applied.
/// A template with an explicit `duration` realizes as a simple timed
/// instruction (`start`/`end`); the rest realize with the four-phase
/// non-manual slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NmfTemplate {
    FaceLexeme {
        lexeme: &'static str,
        amount: f32,
        duration: Option<f32>,
    },
    Head {
        lexeme: &'static str,
        repeated: bool,
        amount: f32,
    },
    Gaze {
        target: &'static str,
        offset: Option<&'static str>,
    },
    Shoulder {
        hand: Hand,
        raise: f32,
        hunch: f32,
    },
    Body {
        lexeme: &'static str,
        amount: f32,
    },
}

pub fn shoulder_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::Shoulder;
    match code {
        "UL" => Some(&[Shoulder { hand: Hand::Left, raise: 1.0, hunch: 0.0 }]),
        "UR" => Some(&[Shoulder { hand: Hand::Right, raise: 1.0, hunch: 0.0 }]),
        "UB" => Some(&[Shoulder { hand: Hand::Both, raise: 1.0, hunch: 0.0 }]),
        "HL" => Some(&[Shoulder { hand: Hand::Left, raise: 0.0, hunch: 1.0 }]),
        "HR" => Some(&[Shoulder { hand: Hand::Right, raise: 0.0, hunch: 1.0 }]),
        "HB" => Some(&[Shoulder { hand: Hand::Both, raise: 0.0, hunch: 1.0 }]),
        "SL" => Some(&[Shoulder { hand: Hand::Left, raise: 0.8, hunch: 0.8 }]),
        "SR" => Some(&[Shoulder { hand: Hand::Right, raise: 0.8, hunch: 0.8 }]),
        "SB" => Some(&[Shoulder { hand: Hand::Both, raise: 0.8, hunch: 0.8 }]),
        _ => None,
    }
}

pub fn body_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::Body;
    match code {
        "RL" => Some(&[Body { lexeme: "ROTATE_LEFT", amount: 1.0 }]),
        "RR" => Some(&[Body { lexeme: "ROTATE_RIGHT", amount: 1.0 }]),
        "TL" => Some(&[Body { lexeme: "TILT_LEFT", amount: 1.0 }]),
        "TR" => Some(&[Body { lexeme: "TILT_RIGHT", amount: 1.0 }]),
        "TF" => Some(&[Body { lexeme: "TILT_FORWARD", amount: 1.0 }]),
        "TB" => Some(&[Body { lexeme: "TILT_BACKWARD", amount: 1.0 }]),
        "RD" => Some(&[Body { lexeme: "ROUND", amount: 1.0 }]),
        "HE" => Some(&[Body { lexeme: "HEAVE", amount: 1.0 }]),
        "ST" => Some(&[Body { lexeme: "STRAIGHT", amount: 1.0 }]),
        "SI" => Some(&[Body { lexeme: "SIGH", amount: 1.0 }]),
        _ => None,
    }
}

pub fn head_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::Head;
    match code {
        "NO" => Some(&[Head { lexeme: "NOD", repeated: true, amount: 1.0 }]),
        "SH" => Some(&[Head { lexeme: "SHAKE", repeated: true, amount: 1.0 }]),
        "SR" => Some(&[Head { lexeme: "TURN_RIGHT", repeated: false, amount: 1.0 }]),
        "SL" => Some(&[Head { lexeme: "TURN_LEFT", repeated: false, amount: 1.0 }]),
        "TR" => Some(&[Head { lexeme: "TILT_RIGHT", repeated: false, amount: 1.0 }]),
        "TL" => Some(&[Head { lexeme: "TILT_LEFT", repeated: false, amount: 1.0 }]),
        "NF" => Some(&[Head { lexeme: "TILT_FORWARD", repeated: false, amount: 1.0 }]),
        "NB" => Some(&[Head { lexeme: "TILT_BACKWARD", repeated: false, amount: 1.0 }]),
        "PF" => Some(&[Head { lexeme: "PUSH_FORWARD", repeated: false, amount: 1.0 }]),
        "PB" => Some(&[Head { lexeme: "PUSH_BACKWARD", repeated: false, amount: 1.0 }]),
        "LI" => Some(&[Head { lexeme: "NOD", repeated: false, amount: 0.5 }]),
        _ => None,
    }
}

pub fn gaze_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::Gaze;
    match code {
        "AD" => Some(&[Gaze { target: "CAMERA", offset: None }]),
        "FR" => Some(&[Gaze { target: "FRONT_FAR", offset: None }]),
        "HD" => Some(&[Gaze { target: "DOMINANT_HAND", offset: None }]),
        "OH" => Some(&[Gaze { target: "NON_DOMINANT_HAND", offset: None }]),
        "UP" => Some(&[Gaze { target: "FRONT", offset: Some("UP") }]),
        "DN" => Some(&[Gaze { target: "FRONT", offset: Some("DOWN") }]),
        "LE" => Some(&[Gaze { target: "FRONT", offset: Some("LEFT") }]),
        "RI" => Some(&[Gaze { target: "FRONT", offset: Some("RIGHT") }]),
        "RO" => Some(&[Gaze { target: "FRONT", offset: Some("UP_ROLL") }]),
        "NO" => Some(&[Gaze { target: "FRONT", offset: None }]),
        _ => None,
    }
}

pub fn brow_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::FaceLexeme;
    match code {
        "RB" => Some(&[FaceLexeme { lexeme: "RAISE_BROWS", amount: 1.0, duration: None }]),
        "RL" => Some(&[FaceLexeme { lexeme: "RAISE_LEFT_BROW", amount: 1.0, duration: None }]),
        "RR" => Some(&[FaceLexeme { lexeme: "RAISE_RIGHT_BROW", amount: 1.0, duration: None }]),
        "FU" => Some(&[FaceLexeme { lexeme: "BROW_LOWERER", amount: 1.0, duration: None }]),
        _ => None,
    }
}

pub fn eyelid_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::FaceLexeme;
    match code {
        "WB" => Some(&[FaceLexeme { lexeme: "UPPER_LID_RAISER", amount: 1.0, duration: None }]),
        "WL" => Some(&[FaceLexeme { lexeme: "UPPER_LID_RAISER_LEFT", amount: 1.0, duration: None }]),
        "WR" => Some(&[FaceLexeme { lexeme: "UPPER_LID_RAISER_RIGHT", amount: 1.0, duration: None }]),
        "SB" => Some(&[FaceLexeme { lexeme: "LID_TIGHTENER", amount: 1.0, duration: None }]),
        "SL" => Some(&[FaceLexeme { lexeme: "LID_TIGHTENER_LEFT", amount: 1.0, duration: None }]),
        "SR" => Some(&[FaceLexeme { lexeme: "LID_TIGHTENER_RIGHT", amount: 1.0, duration: None }]),
        "CB" => Some(&[FaceLexeme { lexeme: "EYES_CLOSED", amount: 1.0, duration: None }]),
        "CL" => Some(&[FaceLexeme { lexeme: "WINK_LEFT", amount: 1.0, duration: None }]),
        "CR" => Some(&[FaceLexeme { lexeme: "WINK_RIGHT", amount: 1.0, duration: None }]),
        // blink is a short self-timed action
        "BB" => Some(&[FaceLexeme {
            lexeme: "BLINK",
            amount: 1.0,
            duration: Some(0.4),
        }]),
        _ => None,
    }
}

pub fn nose_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::FaceLexeme;
    match code {
        "WR" => Some(&[FaceLexeme { lexeme: "NOSE_WRINKLER", amount: 1.0, duration: None }]),
        "WI" => Some(&[FaceLexeme { lexeme: "NOSTRIL_DILATOR", amount: 1.0, duration: None }]),
        "TW" => Some(&[FaceLexeme {
            lexeme: "NOSE_WRINKLER",
            amount: 0.6,
            duration: Some(0.3),
        }]),
        _ => None,
    }
}

pub fn mouth_gesture_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::FaceLexeme;
    match code {
        "L01" => Some(&[FaceLexeme { lexeme: "LIP_CORNER_PULLER", amount: 1.0, duration: None }]),
        "L02" => Some(&[FaceLexeme { lexeme: "LIP_CORNER_DEPRESSOR", amount: 1.0, duration: None }]),
        "L03" => Some(&[FaceLexeme { lexeme: "LIP_STRETCHER", amount: 1.0, duration: None }]),
        "L04" => Some(&[FaceLexeme { lexeme: "LIP_PUCKERER", amount: 1.0, duration: None }]),
        "L05" => Some(&[FaceLexeme { lexeme: "LIP_PRESSOR", amount: 1.0, duration: None }]),
        "C01" => Some(&[FaceLexeme { lexeme: "CHEEK_BLOW", amount: 1.0, duration: None }]),
        "C02" => Some(&[FaceLexeme { lexeme: "CHEEK_SUCK", amount: 1.0, duration: None }]),
        "D01" => Some(&[FaceLexeme { lexeme: "JAW_DROP", amount: 1.0, duration: None }]),
        "D02" => Some(&[FaceLexeme { lexeme: "JAW_SIDEWAYS_LEFT", amount: 1.0, duration: None }]),
        "D03" => Some(&[FaceLexeme { lexeme: "JAW_SIDEWAYS_RIGHT", amount: 1.0, duration: None }]),
        "T01" => Some(&[FaceLexeme { lexeme: "TONGUE_SHOW", amount: 1.0, duration: None }]),
        "T02" => Some(&[FaceLexeme { lexeme: "TONGUE_BULGE_LEFT", amount: 1.0, duration: None }]),
        _ => None,
    }
}

pub fn extra_templates(code: &str) -> Option<&'static [NmfTemplate]> {
    use NmfTemplate::FaceLexeme;
    match code {
        "SW" => Some(&[FaceLexeme { lexeme: "SWALLOW", amount: 0.8, duration: None }]),
        "BR" => Some(&[FaceLexeme { lexeme: "DEEP_BREATH", amount: 0.8, duration: None }]),
        _ => None,
    }
}

/// Per-phoneme mouthing duration in seconds, before speed scaling.
pub fn phoneme_duration(ph: char) -> f32 {
    match ph.to_ascii_lowercase() {
        'a' | 'e' | 'i' | 'o' | 'u' => 0.16,
        'm' | 'n' | 'l' | 'r' | 's' | 'f' | 'v' | 'w' | 'j' | 'z' | 'h' => 0.12,
        _ => 0.14,
    }
}
