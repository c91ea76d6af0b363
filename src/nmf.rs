//! Tiered non-manual scheduler: shoulder, body, head, eye-gaze, facial
//! expression, mouthing and extra articulation, each tier independently
//! sequential with an optional parallel grouping element.

use tracing::{debug, warn};

use crate::{
    instruction::{
        BehaviorInstruction, FaceLexeme, GazeShift, Gesture, GestureKind, HeadMove,
        SpeechFragment, SyncPoints,
    },
    notation::{attr, attr_f32, attr_u32},
    tables::{self, NmfTemplate},
    timing::TimingConfig,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tier {
    Shoulder,
    Body,
    Head,
    EyeGaze,
    FacialExpr,
    Mouthing,
    Extra,
}

const TIERS: [Tier; 7] = [
    Tier::Shoulder,
    Tier::Body,
    Tier::Head,
    Tier::EyeGaze,
    Tier::FacialExpr,
    Tier::Mouthing,
    Tier::Extra,
];

impl Tier {
    fn tag(self) -> &'static str {
        match self {
            Self::Shoulder => "shoulder_tier",
            Self::Body => "body_tier",
            Self::Head => "head_tier",
            Self::EyeGaze => "eyegaze_tier",
            Self::FacialExpr => "facialexpr_tier",
            Self::Mouthing => "mouthing_tier",
            Self::Extra => "extra_tier",
        }
    }

    fn par_tag(self) -> &'static str {
        match self {
            Self::Shoulder => "shoulder_par",
            Self::Body => "body_par",
            Self::Head => "head_par",
            Self::EyeGaze => "eyegaze_par",
            Self::FacialExpr => "facialexpr_par",
            Self::Mouthing => "mouthing_par",
            Self::Extra => "extra_par",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NmfOutcome {
    pub instructions: Vec<BehaviorInstruction>,
    pub end: f32,
}

/// Schedules one sign's non-manual subtree. Articulation begins one hand/arm
/// positioning slot after the sign start; each of the seven tiers is
/// processed at most once.
pub fn schedule(
    node: roxmltree::Node<'_, '_>,
    sign_start: f32,
    speed: f32,
    cfg: &TimingConfig,
) -> NmfOutcome {
    let speed = speed.max(f32::EPSILON);
    let base = sign_start + cfg.loc_slot;
    let mut out = Vec::new();
    let mut end = sign_start;
    let mut done: Vec<Tier> = Vec::new();

    for child in node.children().filter(|c| c.is_element()) {
        let tag = child.tag_name().name();
        let Some(tier) = TIERS.iter().copied().find(|t| t.tag() == tag) else {
            warn!(tag, "unknown non-manual tier");
            continue;
        };
        if done.contains(&tier) {
            warn!(tag, "duplicate non-manual tier, keeping the first");
            continue;
        }
        done.push(tier);
        if let Some(tier_end) = schedule_tier(child, tier, base, speed, cfg, &mut out) {
            end = end.max(tier_end);
        }
    }

    NmfOutcome {
        instructions: out,
        end,
    }
}

/// Returns the latest end among the tier's emitted instructions; a tier that
/// emits nothing contributes nothing to the scheduler's span.
fn schedule_tier(
    node: roxmltree::Node<'_, '_>,
    tier: Tier,
    base: f32,
    speed: f32,
    cfg: &TimingConfig,
    out: &mut Vec<BehaviorInstruction>,
) -> Option<f32> {
    let before = out.len();
    let mut cursor = base;
    for child in node.children().filter(|c| c.is_element()) {
        if child.tag_name().name() == tier.par_tag() {
            // grouped actions share a start; the cursor advances to the
            // latest end among them
            let mut group_end = cursor;
            for action in child.children().filter(|c| c.is_element()) {
                let end = resolve_action(action, tier, cursor, speed, cfg, out);
                group_end = group_end.max(end);
            }
            cursor = group_end;
        } else {
            cursor = resolve_action(child, tier, cursor, speed, cfg, out);
        }
    }
    out[before..]
        .iter()
        .filter_map(|i| i.sync().and_then(|s| s.latest()))
        .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))))
}

fn lookup(tier: Tier, action_tag: &str, code: &str) -> Option<&'static [NmfTemplate]> {
    match tier {
        Tier::Shoulder => tables::shoulder_templates(code),
        Tier::Body => tables::body_templates(code),
        Tier::Head => tables::head_templates(code),
        Tier::EyeGaze => tables::gaze_templates(code),
        Tier::FacialExpr => match action_tag {
            "eye_brows" => tables::brow_templates(code),
            "eye_lids" => tables::eyelid_templates(code),
            "nose" => tables::nose_templates(code),
            _ => None,
        },
        Tier::Mouthing => tables::mouth_gesture_templates(code),
        Tier::Extra => tables::extra_templates(code),
    }
}

/// Resolves one action element into instructions starting at `cursor` and
/// returns the action's end. Unknown codes resolve to nothing and leave the
/// cursor unchanged.
fn resolve_action(
    node: roxmltree::Node<'_, '_>,
    tier: Tier,
    cursor: f32,
    speed: f32,
    cfg: &TimingConfig,
    out: &mut Vec<BehaviorInstruction>,
) -> f32 {
    let tag = node.tag_name().name();

    // mouth pictures carry their phoneme string in the document, not a table
    if tier == Tier::Mouthing && tag == "mouth_picture" {
        return resolve_mouth_picture(node, cursor, speed, out);
    }
    if tier == Tier::Mouthing && tag == "mouth_meta" {
        debug!("mouth_meta actions are not articulated");
        return cursor;
    }

    let code_attr = if tier == Tier::EyeGaze { "direction" } else { "movement" };
    let Some(code) = attr(node, code_attr) else {
        debug!(tag, "non-manual action without a {code_attr} code");
        return cursor;
    };
    let Some(templates) = lookup(tier, tag, code) else {
        debug!(tag, code, "unknown non-manual code");
        return cursor;
    };

    let amount_scale = attr_f32(node, "amount", 1.0);
    let repetition = attr_u32(node, "repetition", 0);

    let four_phase = |hold_scale: u32| {
        let attack = cursor + cfg.nmf_attack / speed;
        let relax = attack + cfg.nmf_hold * (1.0 + hold_scale as f32) / speed;
        SyncPoints {
            start: Some(cursor),
            attack_peak: Some(attack),
            relax: Some(relax),
            end: Some(relax + cfg.nmf_relax / speed),
        }
    };

    let mut action_end = cursor;
    for template in templates {
        let instr = match *template {
            NmfTemplate::FaceLexeme {
                lexeme,
                amount,
                duration,
            } => {
                let sync = match duration {
                    Some(d) => SyncPoints::span(cursor, cursor + d / speed),
                    None => four_phase(repetition),
                };
                BehaviorInstruction::FaceLexeme(FaceLexeme {
                    lexeme: lexeme.to_string(),
                    amount: amount * amount_scale,
                    sync,
                })
            }
            NmfTemplate::Head {
                lexeme,
                repeated,
                amount,
            } => BehaviorInstruction::Head(HeadMove {
                lexeme: lexeme.to_string(),
                repetition: if repeated { repetition.max(1) } else { 0 },
                amount: amount * amount_scale,
                sync: four_phase(repetition),
            }),
            NmfTemplate::Gaze { target, offset } => BehaviorInstruction::Gaze(GazeShift {
                influence: "EYES".to_string(),
                target: target.to_string(),
                offset_direction: offset.map(str::to_string),
                sync: four_phase(repetition),
            }),
            NmfTemplate::Shoulder { hand, raise, hunch } => {
                BehaviorInstruction::Gesture(Gesture {
                    hand,
                    lr_sym: false,
                    ud_sym: false,
                    oi_sym: false,
                    sync: four_phase(repetition),
                    kind: GestureKind::Shoulder {
                        raise: raise * amount_scale,
                        hunch: hunch * amount_scale,
                    },
                })
            }
            NmfTemplate::Body { lexeme, amount } => BehaviorInstruction::Gesture(Gesture {
                hand: crate::instruction::Hand::Both,
                lr_sym: false,
                ud_sym: false,
                oi_sym: false,
                sync: four_phase(repetition),
                kind: GestureKind::Body {
                    movement: lexeme.to_string(),
                    amount: amount * amount_scale,
                },
            }),
        };
        if let Some(latest) = instr.sync().and_then(|s| s.latest()) {
            action_end = action_end.max(latest);
        }
        out.push(instr);
    }
    action_end
}

fn resolve_mouth_picture(
    node: roxmltree::Node<'_, '_>,
    cursor: f32,
    speed: f32,
    out: &mut Vec<BehaviorInstruction>,
) -> f32 {
    let Some(picture) = attr(node, "picture") else {
        debug!("mouth_picture without a picture attribute");
        return cursor;
    };
    let durations: Vec<f32> = picture
        .chars()
        .map(|c| tables::phoneme_duration(c) / speed)
        .collect();
    let total: f32 = durations.iter().sum();
    let end = cursor + total;
    out.push(BehaviorInstruction::Speech(SpeechFragment {
        text: picture.to_string(),
        phoneme_durations: durations,
        sync: SyncPoints::span(cursor, end),
    }));
    end
}
