//! Manual channel synthesizer: turns one sign's manual subtree into timed
//! instructions, interleaving posture and motion parsing and appending the
//! closing peak-relax / relax-end phases.

use tracing::{debug, warn};

use crate::{
    context::{SignContext, SymFlags},
    instruction::{BehaviorInstruction, Gesture, GestureKind, Hand, SyncPoints},
    motion,
    notation::{attr_bool, tempo_modifier},
    posture::{self, Channel, PostureState},
    timing::TimingConfig,
};

/// Default body location inserted for a hand that articulates before any
/// explicit location is given.
const DEFAULT_LOCATION: &str = "chest";

/// Gap above which a hand's first articulation counts as materially earlier
/// than its first explicit location.
const DEFAULT_LOCATION_GAP: f32 = 0.05;

/// Maximum sub-sign recursion depth.
const MAX_DEPTH: u32 = 16;

#[derive(Clone, Debug)]
pub struct ManualOutcome {
    pub data: Vec<BehaviorInstruction>,
    pub end: f32,
    pub peak_relax_duration: f32,
    pub relax_end_duration: f32,
    pub state: PostureState,
}

impl ManualOutcome {
    fn empty(start: f32, state: PostureState) -> Self {
        Self {
            data: Vec::new(),
            end: start,
            peak_relax_duration: 0.0,
            relax_end_duration: 0.0,
            state,
        }
    }
}

/// Reads the sign configuration off a `sign_manual` element.
pub fn sign_context(node: roxmltree::Node<'_, '_>) -> SignContext {
    let mut sym = SymFlags::empty();
    if attr_bool(node, "lr_symm") {
        sym |= SymFlags::LR;
    }
    if attr_bool(node, "ud_symm") {
        sym |= SymFlags::UD;
    }
    if attr_bool(node, "oi_symm") {
        sym |= SymFlags::OI;
    }
    let dominant = if attr_bool(node, "nondominant") {
        Hand::Left
    } else {
        Hand::Right
    };
    SignContext {
        dominant,
        both_hands: attr_bool(node, "both_hands"),
        sym,
        out_of_phase: attr_bool(node, "outofphase"),
        speed: tempo_modifier(node),
    }
}

/// Synthesizes one `sign_manual` subtree starting at `start`.
pub fn synthesize(
    node: roxmltree::Node<'_, '_>,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
) -> ManualOutcome {
    synthesize_at_depth(node, state, start, cfg, 0)
}

fn synthesize_at_depth(
    node: roxmltree::Node<'_, '_>,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
    depth: u32,
) -> ManualOutcome {
    if depth > MAX_DEPTH {
        warn!(depth, "sub-sign nesting too deep, dropping subtree");
        return ManualOutcome::empty(start, state.clone());
    }

    let sub_signs: Vec<_> = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "sign_manual")
        .collect();
    if !sub_signs.is_empty() {
        return synthesize_nested(&sub_signs, state, start, cfg, depth);
    }

    let ctx = sign_context(node);
    synthesize_flat(node, &ctx, state, start, cfg)
}

/// Nested mode: consecutive sub-signs stitched with the same trailing-phase
/// overlap rule as the top-level sequencer.
fn synthesize_nested(
    sub_signs: &[roxmltree::Node<'_, '_>],
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
    depth: u32,
) -> ManualOutcome {
    let mut out = Vec::new();
    let mut st = state.clone();
    let mut prev_end = start;
    let mut prev_peak_relax = 0.0;
    let mut prev_relax_end = 0.0;
    let mut first = true;

    for sub in sub_signs {
        let overlap = if first { 0.0 } else { cfg.sign_overlap };
        first = false;
        let sub_start = prev_end - prev_relax_end - prev_peak_relax + overlap;
        let outcome = synthesize_at_depth(*sub, &st, sub_start, cfg, depth + 1);
        out.extend(outcome.data);
        st = outcome.state;
        prev_end = outcome.end;
        prev_peak_relax = outcome.peak_relax_duration;
        prev_relax_end = outcome.relax_end_duration;
    }

    ManualOutcome {
        data: out,
        end: prev_end,
        peak_relax_duration: prev_peak_relax,
        relax_end_duration: prev_relax_end,
        state: st,
    }
}

fn synthesize_flat(
    node: roxmltree::Node<'_, '_>,
    ctx: &SignContext,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
) -> ManualOutcome {
    let speed = ctx.speed.max(f32::EPSILON);
    let mut out: Vec<BehaviorInstruction> = Vec::new();
    let mut st = state.clone();
    let mut cursor = start;
    let mut posture_seen = false;
    let mut motion_seen = false;

    for child in node.children().filter(|c| c.is_element()) {
        let tag = child.tag_name().name();
        if posture::is_posture_tag(tag) {
            if motion_seen {
                // trailing poses do not articulate; parity with the notation
                // standard's trailing-pose semantics
                debug!(tag, "posture after the first motion, skipping");
                continue;
            }
            let Some(op) = posture::parse_posture(child) else {
                continue;
            };
            let instrs = posture::eval(&op, ctx, cursor, cfg);
            st = st.update(&instrs);
            posture_seen = true;
            out.extend(instrs);
        } else if motion::is_motion_tag(tag) {
            let Some(op) = motion::parse_motion(child) else {
                continue;
            };
            if !motion_seen && posture_seen {
                // one positioning slot to reach the opening postures
                cursor += cfg.loc_slot / speed;
            }
            motion_seen = true;
            let outcome = motion::eval(&op, ctx, &st, cursor, cfg);
            st = st.update(&outcome.instructions);
            cursor = outcome.end;
            out.extend(outcome.instructions);
        } else {
            warn!(tag, "unknown manual element");
        }
    }

    if out.is_empty() {
        return ManualOutcome::empty(start, st);
    }

    insert_default_locations(&mut out, ctx, start, cfg);
    st = st.update(&out);

    // body end: the clock, or the latest stamped phase if postures never
    // advanced it
    let body_end = out
        .iter()
        .filter_map(|i| i.sync().and_then(|s| s.latest()))
        .fold(cursor, f32::max);

    let relax_time = body_end + cfg.peak_relax;
    let end_time = relax_time + cfg.relax_end;
    for instr in &mut out {
        close_instruction(instr, relax_time, end_time);
    }

    ManualOutcome {
        data: out,
        end: end_time,
        peak_relax_duration: cfg.peak_relax,
        relax_end_duration: cfg.relax_end,
        state: st,
    }
}

/// Inserts a synthetic default location for any hand whose first
/// articulation starts materially earlier than its first explicit body
/// location. Prepended so it can never override a later hand constellation.
fn insert_default_locations(
    out: &mut Vec<BehaviorInstruction>,
    ctx: &SignContext,
    start: f32,
    cfg: &TimingConfig,
) {
    let speed = ctx.speed.max(f32::EPSILON);
    let mut defaults = Vec::new();

    for hand in [Hand::Right, Hand::Left] {
        let mut first_use: Option<f32> = None;
        let mut first_location: Option<f32> = None;
        for instr in out.iter() {
            let BehaviorInstruction::Gesture(g) = instr else {
                continue;
            };
            if !g.hand.covers(hand) {
                continue;
            }
            let Some(s) = g.sync.start else { continue };
            if posture::channel_of(instr) == Some(Channel::Location) {
                first_location = Some(first_location.map_or(s, |v: f32| v.min(s)));
            } else {
                first_use = Some(first_use.map_or(s, |v: f32| v.min(s)));
            }
        }
        let (Some(used), Some(located)) = (first_use, first_location) else {
            continue;
        };
        if used + DEFAULT_LOCATION_GAP < located {
            defaults.push(BehaviorInstruction::Gesture(Gesture {
                hand,
                lr_sym: ctx.sym.contains(SymFlags::LR),
                ud_sym: ctx.sym.contains(SymFlags::UD),
                oi_sym: ctx.sym.contains(SymFlags::OI),
                sync: SyncPoints::reaching(start, start + cfg.loc_slot / speed),
                kind: GestureKind::Location {
                    location: DEFAULT_LOCATION.to_string(),
                    second_location: None,
                    side: None,
                    contact: None,
                },
            }));
        }
    }

    if !defaults.is_empty() {
        defaults.append(out);
        *out = defaults;
    }
}

/// Resolves the still-open phases of an instruction at sign close. Four-phase
/// instructions take the closing relax/end; wrist and fingerplay motions
/// instead derive attack/relax inward from their own span.
fn close_instruction(instr: &mut BehaviorInstruction, relax_time: f32, end_time: f32) {
    let BehaviorInstruction::Gesture(g) = instr else {
        return;
    };
    match g.kind {
        GestureKind::WristMotion { .. } | GestureKind::Fingerplay { .. } => {
            let (Some(s), Some(e)) = (g.sync.start, g.sync.end) else {
                return;
            };
            let inset = (0.15 * (e - s)).min(0.15);
            if g.sync.attack_peak.is_none() {
                g.sync.attack_peak = Some(s + inset);
            }
            if g.sync.relax.is_none() {
                g.sync.relax = Some(e - inset);
            }
        }
        _ => {
            if g.sync.relax.is_none() {
                g.sync.relax = Some(relax_time);
            }
            if g.sync.end.is_none() {
                g.sync.end = Some(end_time);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(s).unwrap()
    }

    fn run(xml: &str) -> ManualOutcome {
        let d = doc(xml);
        synthesize(
            d.root_element(),
            &PostureState::neutral(),
            0.0,
            &TimingConfig::default(),
        )
    }

    #[test]
    fn lone_handshape_gets_the_documented_timing() {
        let cfg = TimingConfig::default();
        let out = run(r#"<sign_manual><handconfig handshape="fist"/></sign_manual>"#);
        assert_eq!(out.data.len(), 1);
        let sync = out.data[0].sync().unwrap();
        assert_eq!(sync.start, Some(0.0));
        assert_eq!(sync.attack_peak, Some(cfg.loc_slot));
        assert_eq!(sync.relax, Some(cfg.loc_slot + cfg.peak_relax));
        assert_eq!(sync.end, Some(cfg.loc_slot + cfg.peak_relax + cfg.relax_end));
        assert_eq!(out.end, cfg.loc_slot + cfg.peak_relax + cfg.relax_end);
        assert_eq!(out.peak_relax_duration, cfg.peak_relax);
        assert_eq!(out.relax_end_duration, cfg.relax_end);
    }

    #[test]
    fn postures_share_a_start_and_motion_advances_the_clock() {
        let cfg = TimingConfig::default();
        let out = run(
            r#"<sign_manual>
                <handconfig handshape="fist"/>
                <palmor palmor="d"/>
                <location_bodyarm location="chest"/>
                <directedmotion direction="u"/>
            </sign_manual>"#,
        );
        let starts: Vec<f32> = out
            .data
            .iter()
            .map(|i| i.sync().unwrap().start.unwrap())
            .collect();
        // three postures at the sign start, motion one slot later
        assert_eq!(&starts[..3], &[0.0, 0.0, 0.0]);
        assert!((starts[3] - cfg.loc_slot).abs() < 1e-5);
    }

    #[test]
    fn trailing_postures_are_ignored() {
        let out = run(
            r#"<sign_manual>
                <location_bodyarm location="chest"/>
                <directedmotion direction="u"/>
                <handconfig handshape="fist"/>
            </sign_manual>"#,
        );
        assert_eq!(out.data.len(), 2);
    }

    #[test]
    fn all_emitted_timings_are_monotonic() {
        let out = run(
            r#"<sign_manual both_hands="true" lr_symm="true">
                <handconfig handshape="flat"/>
                <par_motion>
                    <directedmotion direction="u"/>
                    <wristmotion motion="swinging"/>
                </par_motion>
            </sign_manual>"#,
        );
        for instr in &out.data {
            assert!(instr.sync().unwrap().is_monotonic(), "{instr:?}");
        }
    }

    #[test]
    fn late_location_triggers_the_default_chest_insertion() {
        // the explicit location only arrives inside the target construct,
        // well after the hand first articulates
        let out = run(
            r#"<sign_manual>
                <handconfig handshape="fist"/>
                <tgt_motion>
                    <directedmotion direction="u"/>
                    <location_bodyarm location="shoulders"/>
                </tgt_motion>
            </sign_manual>"#,
        );
        let BehaviorInstruction::Gesture(g) = &out.data[0] else {
            panic!()
        };
        assert!(matches!(
            &g.kind,
            GestureKind::Location { location, .. } if location == DEFAULT_LOCATION
        ));
        assert_eq!(g.hand, Hand::Right);
        assert_eq!(g.sync.start, Some(0.0));

        // an explicit location at the sign start suppresses the default
        let explicit = run(
            r#"<sign_manual>
                <location_bodyarm location="shoulders"/>
                <directedmotion direction="u"/>
            </sign_manual>"#,
        );
        let location_count = explicit
            .data
            .iter()
            .filter(|i| posture::channel_of(i) == Some(Channel::Location))
            .count();
        assert_eq!(location_count, 1);

        // no explicit location at all: the hand keeps its carried posture
        let none = run(r#"<sign_manual><handconfig handshape="fist"/></sign_manual>"#);
        assert_eq!(none.data.len(), 1);
    }

    #[test]
    fn one_handed_sign_never_drives_the_other_hand() {
        let out = run(
            r#"<sign_manual>
                <handconfig handshape="fist"/>
                <directedmotion direction="u"/>
            </sign_manual>"#,
        );
        for instr in &out.data {
            assert_ne!(instr.hand(), Some(Hand::Left));
            assert_ne!(instr.hand(), Some(Hand::Both));
        }
    }

    #[test]
    fn wrist_motion_closing_uses_the_span_inset() {
        let cfg = TimingConfig::default();
        let out = run(
            r#"<sign_manual>
                <wristmotion motion="nodding"/>
            </sign_manual>"#,
        );
        let sync = out.data[0].sync().unwrap();
        let (s, e) = (sync.start.unwrap(), sync.end.unwrap());
        let inset = (0.15 * (e - s)).min(0.15);
        assert!((sync.attack_peak.unwrap() - (s + inset)).abs() < 1e-5);
        assert!((sync.relax.unwrap() - (e - inset)).abs() < 1e-5);
        // the wrist span itself is untouched by the closing phases
        assert!((e - cfg.wrist_slot).abs() < 1e-5);
    }

    #[test]
    fn nested_sub_signs_overlap_their_trailing_phases() {
        let cfg = TimingConfig::default();
        let out = run(
            r#"<sign_manual>
                <sign_manual><handconfig handshape="fist"/></sign_manual>
                <sign_manual><handconfig handshape="flat"/></sign_manual>
            </sign_manual>"#,
        );
        let first_end = cfg.loc_slot + cfg.peak_relax + cfg.relax_end;
        let expected_second_start =
            first_end - cfg.relax_end - cfg.peak_relax + cfg.sign_overlap;
        let second_start = out.data[1].sync().unwrap().start.unwrap();
        assert!((second_start - expected_second_start).abs() < 1e-5);
    }

    #[test]
    fn empty_manual_subtree_is_a_no_op() {
        let out = run(r#"<sign_manual/>"#);
        assert!(out.data.is_empty());
        assert_eq!(out.end, 0.0);
        assert_eq!(out.peak_relax_duration, 0.0);
    }

    #[test]
    fn symmetry_flags_ride_on_dominant_instructions() {
        let out = run(
            r#"<sign_manual both_hands="true" lr_symm="true">
                <handconfig handshape="flat"/>
            </sign_manual>"#,
        );
        let BehaviorInstruction::Gesture(g) = &out.data[0] else {
            panic!()
        };
        assert_eq!(g.hand, Hand::Both);
        assert!(g.lr_sym);
        assert!(!g.ud_sym);
    }

    #[test]
    fn speed_scales_the_posture_slot() {
        let cfg = TimingConfig::default();
        let out = run(
            r#"<sign_manual fast="true">
                <handconfig handshape="fist"/>
            </sign_manual>"#,
        );
        let sync = out.data[0].sync().unwrap();
        let expected = cfg.loc_slot / crate::context::FAST_TEMPO;
        assert!((sync.attack_peak.unwrap() - expected).abs() < 1e-5);
    }
}
