//! Thin helpers over the markup parser: attribute access with documented
//! defaults, tempo modifiers, and direction-code conversion. Attribute parse
//! failures are recoverable and substitute the default with a diagnostic.

use tracing::debug;

use crate::{
    context::{FAST_TEMPO, SLOW_TEMPO, TENSE_TEMPO},
    error::{SignweaveError, SignweaveResult},
};

pub fn parse_document(text: &str) -> SignweaveResult<roxmltree::Document<'_>> {
    roxmltree::Document::parse(text).map_err(|e| SignweaveError::parse(e.to_string()))
}

pub fn attr<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|s| !s.is_empty())
}

pub fn attr_string(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    attr(node, name).map(str::to_string)
}

pub fn attr_f32(node: roxmltree::Node<'_, '_>, name: &str, default: f32) -> f32 {
    match attr(node, name) {
        None => default,
        Some(raw) => match raw.parse::<f32>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                debug!(attribute = name, value = raw, default, "unparseable numeric attribute");
                default
            }
        },
    }
}

pub fn attr_u32(node: roxmltree::Node<'_, '_>, name: &str, default: u32) -> u32 {
    match attr(node, name) {
        None => default,
        Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
            debug!(attribute = name, value = raw, default, "unparseable integer attribute");
            default
        }),
    }
}

pub fn attr_bool(node: roxmltree::Node<'_, '_>, name: &str) -> bool {
    matches!(
        attr(node, name).map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "1" | "yes")
    )
}

/// Product of the tempo modifiers declared on an element. `fast`/`slow` may
/// also carry an explicit multiplier value.
pub fn tempo_modifier(node: roxmltree::Node<'_, '_>) -> f32 {
    let mut tempo = 1.0;
    if attr_bool(node, "fast") {
        tempo *= FAST_TEMPO;
    }
    if attr_bool(node, "slow") {
        tempo *= SLOW_TEMPO;
    }
    if attr_bool(node, "tense") {
        tempo *= TENSE_TEMPO;
    }
    let explicit = attr_f32(node, "speed", 1.0);
    if explicit > 0.0 {
        tempo *= explicit;
    }
    tempo
}

fn axis_component(c: char) -> Option<[f32; 3]> {
    match c {
        'r' => Some([1.0, 0.0, 0.0]),
        'l' => Some([-1.0, 0.0, 0.0]),
        'u' => Some([0.0, 1.0, 0.0]),
        'd' => Some([0.0, -1.0, 0.0]),
        'o' => Some([0.0, 0.0, 1.0]),
        'i' => Some([0.0, 0.0, -1.0]),
        _ => None,
    }
}

/// Converts a direction code (`u`, `d`, `l`, `r`, `i`, `o` and their two- or
/// three-letter combinations) into a unit vector. Unknown characters make the
/// whole code unknown.
pub fn direction_vector(code: &str) -> Option<[f32; 3]> {
    let code = code.trim().to_ascii_lowercase();
    if code.is_empty() {
        return None;
    }
    let mut acc = [0.0f32; 3];
    for c in code.chars() {
        let comp = axis_component(c)?;
        for (a, b) in acc.iter_mut().zip(comp) {
            *a += b;
        }
    }
    normalize(acc)
}

/// Angle of a direction code in the frontal (right/up) plane, degrees,
/// counter-clockwise from `r`. Codes with no frontal component resolve to
/// nothing.
pub fn direction_angle(code: &str) -> Option<f32> {
    let v = direction_vector(code)?;
    if v[0].abs() <= f32::EPSILON && v[1].abs() <= f32::EPSILON {
        return None;
    }
    Some(v[1].atan2(v[0]).to_degrees())
}

pub fn normalize(v: [f32; 3]) -> Option<[f32; 3]> {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return None;
    }
    Some([v[0] / len, v[1] / len, v[2] / len])
}
