//! Recursive motion composer: parses motion elements into a closed operator
//! tree and evaluates it into timed leaf instructions.

use tracing::{debug, warn};

use crate::{
    context::{SignContext, SymFlags, apply_symmetry},
    instruction::{BehaviorInstruction, Gesture, GestureKind, Hand, MotionTag, SyncPoints},
    notation::{attr, attr_bool, attr_f32, attr_string, direction_angle, direction_vector, normalize, tempo_modifier},
    posture::{self, Channel, PostureOp, PostureState},
    timing::TimingConfig,
};

/// Maximum nesting of composed motion operators. Deeper documents degrade to
/// a no-op for the offending construct.
const MAX_DEPTH: u32 = 24;

/// Directed-motion distance tiers, metres.
const DISTANCE_SMALL: f32 = 0.06;
const DISTANCE_DEFAULT: f32 = 0.12;
const DISTANCE_BIG: f32 = 0.24;

/// Net displacement below this magnitude counts as returning to the start.
const DISPLACEMENT_EPSILON: f32 = 1e-3;
/// Angular sweeps within this of 360 degrees count as a full turn.
const FULL_TURN_EPSILON: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeTier {
    Small,
    Default,
    Big,
}

impl SizeTier {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("small") => Self::Small,
            Some("big") => Self::Big,
            _ => Self::Default,
        }
    }

    fn distance(self) -> f32 {
        match self {
            Self::Small => DISTANCE_SMALL,
            Self::Default => DISTANCE_DEFAULT,
            Self::Big => DISTANCE_BIG,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    FromStart,
    FromStartSeveral,
    ManyRandom,
    ToFroTo,
    Reverse,
    Continue,
    ContinueSeveral,
    Swap,
}

impl RepeatMode {
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw? {
            "fromstart" => Some(Self::FromStart),
            "fromstart_several" => Some(Self::FromStartSeveral),
            "manyrandom" => Some(Self::ManyRandom),
            "tofroto" => Some(Self::ToFroTo),
            "reverse" => Some(Self::Reverse),
            "continue" => Some(Self::Continue),
            "continue_several" => Some(Self::ContinueSeveral),
            "swap" => Some(Self::Swap),
            other => {
                debug!(repetition = other, "unknown repetition mode");
                None
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectedSpec {
    pub direction: [f32; 3],
    pub second_direction: Option<[f32; 3]>,
    pub size: SizeTier,
    pub curve: Option<String>,
    pub curve_size: Option<f32>,
    pub zigzag: Option<String>,
    pub zigzag_size: Option<f32>,
    pub tempo: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircularSpec {
    pub axis: [f32; 3],
    pub start_angle: f32,
    pub end_angle: f32,
    pub zigzag: Option<String>,
    pub tempo: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WristSpec {
    pub mode: String,
    pub intensity: f32,
    pub tempo: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FingerplaySpec {
    pub digits: Option<String>,
    pub intensity: f32,
    pub tempo: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangePostureSpec {
    pub handshape: String,
    pub thumbpos: Option<String>,
    pub tempo: f32,
}

/// Closed set of motion operators. Unknown elements never become operators;
/// they are skipped at parse time with a diagnostic.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionOp {
    Directed(DirectedSpec),
    Circular(CircularSpec),
    Wrist(WristSpec),
    Fingerplay(FingerplaySpec),
    ChangePosture(ChangePostureSpec),
    NoMotion,
    Seq {
        children: Vec<MotionOp>,
        tempo: f32,
    },
    Par {
        children: Vec<MotionOp>,
        tempo: f32,
    },
    Split {
        dominant: Box<MotionOp>,
        non_dominant: Box<MotionOp>,
        tempo: f32,
    },
    Tgt {
        motion: Box<MotionOp>,
        postures: Vec<PostureOp>,
        tempo: f32,
    },
    Rpt {
        inner: Box<MotionOp>,
        mode: Option<RepeatMode>,
        rest: bool,
        tempo: f32,
    },
}

pub fn is_motion_tag(tag: &str) -> bool {
    matches!(
        tag,
        "directedmotion"
            | "circularmotion"
            | "wristmotion"
            | "fingerplay"
            | "changeposture"
            | "nomotion"
            | "seq_motion"
            | "par_motion"
            | "split_motion"
            | "tgt_motion"
            | "rpt_motion"
    )
}

fn motion_children(node: roxmltree::Node<'_, '_>) -> Vec<MotionOp> {
    node.children()
        .filter(|c| c.is_element())
        .filter_map(|c| {
            if is_motion_tag(c.tag_name().name()) {
                parse_motion(c)
            } else {
                debug!(tag = c.tag_name().name(), "non-motion child inside motion operator");
                None
            }
        })
        .collect()
}

/// Parses one motion element into an operator. Structurally incomplete
/// constructs (a split without two children, a target without a motion)
/// resolve to nothing.
pub fn parse_motion(node: roxmltree::Node<'_, '_>) -> Option<MotionOp> {
    let tempo = tempo_modifier(node);
    match node.tag_name().name() {
        "directedmotion" => {
            let direction = direction_vector(attr(node, "direction")?)?;
            Some(MotionOp::Directed(DirectedSpec {
                direction,
                second_direction: attr(node, "second_direction").and_then(direction_vector),
                size: SizeTier::parse(attr(node, "size")),
                curve: attr_string(node, "curve"),
                curve_size: attr(node, "curve_size").map(|_| attr_f32(node, "curve_size", 1.0)),
                zigzag: attr_string(node, "zigzag_style"),
                zigzag_size: attr(node, "zigzag_size").map(|_| attr_f32(node, "zigzag_size", 1.0)),
                tempo,
            }))
        }
        "circularmotion" => {
            let axis_code = attr(node, "axis").unwrap_or("o");
            let axis = direction_vector(axis_code).unwrap_or([0.0, 0.0, 1.0]);
            let invert = axis_code.contains('i');
            let mut start_angle = attr(node, "start").and_then(direction_angle).unwrap_or(0.0);
            let mut end_angle = attr(node, "end")
                .and_then(direction_angle)
                .unwrap_or(start_angle + 360.0);
            if attr_bool(node, "clockplus") {
                end_angle += 360.0;
            }
            if attr_bool(node, "second_clockplus") {
                end_angle += 360.0;
            }
            if invert {
                start_angle = -start_angle;
                end_angle = -end_angle;
            }
            Some(MotionOp::Circular(CircularSpec {
                axis,
                start_angle,
                end_angle,
                zigzag: attr_string(node, "zigzag_style"),
                tempo,
            }))
        }
        "wristmotion" => Some(MotionOp::Wrist(WristSpec {
            mode: attr_string(node, "motion")?,
            intensity: attr_f32(node, "size", 1.0),
            tempo,
        })),
        "fingerplay" => Some(MotionOp::Fingerplay(FingerplaySpec {
            digits: attr_string(node, "digits"),
            intensity: attr_f32(node, "intensity", 1.0),
            tempo,
        })),
        "changeposture" => Some(MotionOp::ChangePosture(ChangePostureSpec {
            handshape: attr_string(node, "handshape")?,
            thumbpos: attr_string(node, "thumbpos"),
            tempo,
        })),
        "nomotion" => Some(MotionOp::NoMotion),
        "seq_motion" => Some(MotionOp::Seq {
            children: motion_children(node),
            tempo,
        }),
        "par_motion" => Some(MotionOp::Par {
            children: motion_children(node),
            tempo,
        }),
        "split_motion" => {
            let mut children = motion_children(node).into_iter();
            let dominant = Box::new(children.next()?);
            let non_dominant = Box::new(children.next()?);
            Some(MotionOp::Split {
                dominant,
                non_dominant,
                tempo,
            })
        }
        "tgt_motion" => {
            let motion = node
                .children()
                .filter(|c| c.is_element() && is_motion_tag(c.tag_name().name()))
                .find_map(parse_motion)?;
            let postures = node
                .children()
                .filter(|c| c.is_element() && posture::is_posture_tag(c.tag_name().name()))
                .filter_map(posture::parse_posture)
                .collect();
            Some(MotionOp::Tgt {
                motion: Box::new(motion),
                postures,
                tempo,
            })
        }
        "rpt_motion" => {
            let mut children = motion_children(node).into_iter();
            let inner = Box::new(children.next()?);
            Some(MotionOp::Rpt {
                inner,
                mode: RepeatMode::parse(attr(node, "repetition")),
                rest: attr_bool(node, "rest"),
                tempo,
            })
        }
        other => {
            debug!(tag = other, "unknown motion element");
            None
        }
    }
}

/// Result of evaluating one motion operator: leaf instructions with resolved
/// starts/attacks and the operator's end time.
#[derive(Clone, Debug, Default)]
pub struct MotionOutcome {
    pub instructions: Vec<BehaviorInstruction>,
    pub end: f32,
}

pub fn eval(
    op: &MotionOp,
    ctx: &SignContext,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
) -> MotionOutcome {
    eval_at_depth(op, ctx, state, start, cfg, 0)
}

fn gesture(ctx: &SignContext, kind: GestureKind, sync: SyncPoints) -> BehaviorInstruction {
    BehaviorInstruction::Gesture(Gesture {
        hand: ctx.ambient_hand(),
        lr_sym: ctx.sym.contains(SymFlags::LR),
        ud_sym: ctx.sym.contains(SymFlags::UD),
        oi_sym: ctx.sym.contains(SymFlags::OI),
        sync,
        kind,
    })
}

fn shift_all(instrs: &mut [BehaviorInstruction], dt: f32) {
    for instr in instrs {
        if let Some(sync) = instr.sync_mut() {
            sync.shift(dt);
        }
    }
}

fn remap_all(instrs: &mut [BehaviorInstruction], old: (f32, f32), new: (f32, f32)) {
    for instr in instrs {
        if let Some(sync) = instr.sync_mut() {
            sync.remap(old, new);
        }
    }
}

fn eval_at_depth(
    op: &MotionOp,
    ctx: &SignContext,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
    depth: u32,
) -> MotionOutcome {
    if depth > MAX_DEPTH {
        warn!(depth, "motion nesting too deep, dropping construct");
        return MotionOutcome {
            instructions: Vec::new(),
            end: start,
        };
    }

    match op {
        MotionOp::Directed(spec) => eval_directed(spec, ctx, start, cfg),
        MotionOp::Circular(spec) => eval_circular(spec, ctx, start, cfg),
        MotionOp::Wrist(spec) => {
            let speed = (ctx.speed * spec.tempo).max(f32::EPSILON);
            let end = start + cfg.wrist_slot / speed;
            MotionOutcome {
                instructions: vec![gesture(
                    ctx,
                    GestureKind::WristMotion {
                        motion: MotionTag::Wrist,
                        mode: spec.mode.clone(),
                        intensity: spec.intensity,
                    },
                    SyncPoints::span(start, end),
                )],
                end,
            }
        }
        MotionOp::Fingerplay(spec) => {
            let speed = (ctx.speed * spec.tempo).max(f32::EPSILON);
            let end = start + cfg.fingerplay_slot / speed;
            MotionOutcome {
                instructions: vec![gesture(
                    ctx,
                    GestureKind::Fingerplay {
                        motion: MotionTag::Fingerplay,
                        digits: spec.digits.clone(),
                        intensity: spec.intensity,
                    },
                    SyncPoints::span(start, end),
                )],
                end,
            }
        }
        MotionOp::ChangePosture(spec) => {
            let speed = (ctx.speed * spec.tempo).max(f32::EPSILON);
            let end = start + cfg.change_posture_slot / speed;
            MotionOutcome {
                instructions: vec![gesture(
                    ctx,
                    GestureKind::Handshape {
                        handshape: spec.handshape.clone(),
                        second_handshape: None,
                        thumbpos: spec.thumbpos.clone(),
                        mainbend: None,
                    },
                    SyncPoints::reaching(start, end),
                )],
                end,
            }
        }
        MotionOp::NoMotion => MotionOutcome {
            instructions: Vec::new(),
            end: start,
        },
        MotionOp::Seq { children, tempo } => {
            let ctx = ctx.with_tempo(*tempo);
            let mut st = state.clone();
            let mut out = Vec::new();
            let mut cursor = start;
            for child in children {
                let child_out = eval_at_depth(child, &ctx, &st, cursor, cfg, depth + 1);
                st = st.update(&child_out.instructions);
                cursor = child_out.end;
                out.extend(child_out.instructions);
            }
            MotionOutcome {
                instructions: out,
                end: cursor,
            }
        }
        MotionOp::Par { children, tempo } => {
            let ctx = ctx.with_tempo(*tempo);
            let mut branches: Vec<MotionOutcome> = children
                .iter()
                .map(|child| eval_at_depth(child, &ctx, state, start, cfg, depth + 1))
                .collect();
            let common_end = branches
                .iter()
                .map(|b| b.end)
                .fold(start, f32::max);
            let mut out = Vec::new();
            for branch in &mut branches {
                if branch.end > start {
                    remap_all(&mut branch.instructions, (start, branch.end), (start, common_end));
                }
                out.append(&mut branch.instructions);
            }
            MotionOutcome {
                instructions: out,
                end: common_end,
            }
        }
        MotionOp::Split {
            dominant,
            non_dominant,
            tempo,
        } => {
            let ctx = ctx.with_tempo(*tempo);
            let dom = eval_at_depth(
                dominant,
                &ctx.scoped_to(ctx.dominant),
                state,
                start,
                cfg,
                depth + 1,
            );
            let nd = eval_at_depth(
                non_dominant,
                &ctx.scoped_to(ctx.non_dominant()),
                state,
                start,
                cfg,
                depth + 1,
            );
            let end = dom.end.max(nd.end);
            let mut out = dom.instructions;
            out.extend(nd.instructions);
            MotionOutcome {
                instructions: out,
                end,
            }
        }
        MotionOp::Tgt {
            motion,
            postures,
            tempo,
        } => eval_tgt(motion, postures, &ctx.with_tempo(*tempo), state, start, cfg, depth),
        MotionOp::Rpt {
            inner,
            mode,
            rest,
            tempo,
        } => eval_rpt(
            inner,
            *mode,
            *rest,
            &ctx.with_tempo(*tempo),
            state,
            start,
            cfg,
            depth,
        ),
    }
}

fn eval_directed(
    spec: &DirectedSpec,
    ctx: &SignContext,
    start: f32,
    cfg: &TimingConfig,
) -> MotionOutcome {
    let speed = (ctx.speed * spec.tempo).max(f32::EPSILON);
    let attack = start + cfg.directed_slot / speed;

    // secondary direction blends the displacement 50/50
    let mut direction = spec.direction;
    let mut distance = spec.size.distance();
    if let Some(second) = spec.second_direction {
        let blended = [
            (direction[0] + second[0]) * 0.5,
            (direction[1] + second[1]) * 0.5,
            (direction[2] + second[2]) * 0.5,
        ];
        let len = (blended[0] * blended[0] + blended[1] * blended[1] + blended[2] * blended[2])
            .sqrt();
        distance *= len;
        direction = normalize(blended).unwrap_or(direction);
    }

    MotionOutcome {
        instructions: vec![gesture(
            ctx,
            GestureKind::DirectedMotion {
                motion: MotionTag::Directed,
                direction,
                distance,
                curve: spec.curve.clone(),
                curve_size: spec.curve_size,
                zigzag: spec.zigzag.clone(),
                zigzag_size: spec.zigzag_size,
            },
            SyncPoints::reaching(start, attack),
        )],
        end: attack,
    }
}

fn eval_circular(
    spec: &CircularSpec,
    ctx: &SignContext,
    start: f32,
    cfg: &TimingConfig,
) -> MotionOutcome {
    let speed = (ctx.speed * spec.tempo).max(f32::EPSILON);
    let end = start + cfg.circular_slot / speed;

    let mut out = vec![gesture(
        ctx,
        GestureKind::CircularMotion {
            motion: MotionTag::Circular,
            axis: spec.axis,
            start_angle: spec.start_angle,
            end_angle: spec.end_angle,
            zigzag: spec.zigzag.clone(),
        },
        SyncPoints::reaching(start, end),
    )];

    // out-of-phase dual-hand circles get an explicit second leaf, half a turn
    // ahead on the mirrored axis
    if ctx.both_hands && ctx.out_of_phase {
        let mirrored_axis = apply_symmetry(spec.axis, ctx.sym);
        let mut second = Gesture {
            hand: ctx.non_dominant(),
            lr_sym: false,
            ud_sym: false,
            oi_sym: false,
            sync: SyncPoints::reaching(start, end),
            kind: GestureKind::CircularMotion {
                motion: MotionTag::Circular,
                axis: mirrored_axis,
                start_angle: spec.start_angle + 180.0,
                end_angle: spec.end_angle + 180.0,
                zigzag: spec.zigzag.clone(),
            },
        };
        if let GestureKind::CircularMotion {
            start_angle,
            end_angle,
            ..
        } = &mut second.kind
        {
            if ctx.sym.contains(SymFlags::LR) {
                *start_angle = -*start_angle;
                *end_angle = -*end_angle;
            }
        }
        out.push(BehaviorInstruction::Gesture(second));
    }

    MotionOutcome {
        instructions: out,
        end,
    }
}

fn eval_tgt(
    motion: &MotionOp,
    postures: &[PostureOp],
    ctx: &SignContext,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
    depth: u32,
) -> MotionOutcome {
    let motion_out = eval_at_depth(motion, ctx, state, start, cfg, depth + 1);
    let end = motion_out.end;
    let mut instructions = motion_out.instructions;

    let mut posture_instrs = Vec::new();
    for op in postures {
        posture_instrs.extend(posture::eval(op, ctx, start, cfg));
    }
    let posture_span = start + cfg.loc_slot / ctx.speed.max(f32::EPSILON);
    remap_all(&mut posture_instrs, (start, posture_span), (start, end));

    // an explicit target pose supersedes the translation of the final
    // directed motion; the instruction stays so curve/zigzag shaping applies
    let sets_target_pose = posture_instrs.iter().any(|i| {
        matches!(
            posture::channel_of(i),
            Some(Channel::Location | Channel::Constellation)
        )
    });
    if sets_target_pose {
        if let Some(BehaviorInstruction::Gesture(g)) = instructions
            .iter_mut()
            .rev()
            .find(|i| matches!(i, BehaviorInstruction::Gesture(g) if matches!(g.kind, GestureKind::DirectedMotion { .. })))
        {
            if let GestureKind::DirectedMotion { distance, .. } = &mut g.kind {
                *distance = 0.0;
            }
        }
    }

    instructions.extend(posture_instrs);
    MotionOutcome { instructions, end }
}

/// Whether a repeat's forward block structurally requires a return-to-start
/// phase: any posture in the block, a non-zero net displacement, or a circle
/// that sweeps less than a full turn.
fn backward_required(instrs: &[BehaviorInstruction]) -> bool {
    let mut net: [[f32; 3]; 2] = [[0.0; 3]; 2];
    for instr in instrs {
        if posture::channel_of(instr).is_some() {
            return true;
        }
        let BehaviorInstruction::Gesture(g) = instr else {
            return true;
        };
        match &g.kind {
            GestureKind::DirectedMotion {
                direction, distance, ..
            } => {
                for hand_idx in [Hand::Right, Hand::Left]
                    .into_iter()
                    .enumerate()
                    .filter(|(_, h)| g.hand.covers(*h))
                    .map(|(i, _)| i)
                {
                    for (axis, d) in net[hand_idx].iter_mut().zip(direction) {
                        *axis += d * distance;
                    }
                }
            }
            GestureKind::CircularMotion {
                start_angle,
                end_angle,
                ..
            } => {
                if (end_angle - start_angle).abs() < 360.0 - FULL_TURN_EPSILON {
                    return true;
                }
            }
            GestureKind::WristMotion { .. } | GestureKind::Fingerplay { .. } => {}
            _ => return true,
        }
    }
    net.iter().any(|v| {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt() > DISPLACEMENT_EPSILON
    })
}

/// Synthesizes the instructions that restore the pre-repeat posture channels
/// touched by the forward block, stamped at the loop boundary.
fn backward_block(
    forward: &[BehaviorInstruction],
    pre_state: &PostureState,
    ctx: &SignContext,
    boundary: f32,
    cfg: &TimingConfig,
) -> Vec<BehaviorInstruction> {
    let speed = ctx.speed.max(f32::EPSILON);
    let mut out = Vec::new();
    let mut restored: Vec<(Hand, Channel)> = Vec::new();

    for instr in forward {
        // a displacing directed motion touches the location channel
        let channel = match posture::channel_of(instr) {
            Some(c) => c,
            None => match instr {
                BehaviorInstruction::Gesture(g)
                    if matches!(
                        &g.kind,
                        GestureKind::DirectedMotion { distance, .. }
                            if *distance > DISPLACEMENT_EPSILON
                    ) =>
                {
                    Channel::Location
                }
                _ => continue,
            },
        };
        let Some(hand) = instr.hand() else { continue };
        for h in [Hand::Right, Hand::Left] {
            if !hand.covers(h) || restored.contains(&(h, channel)) {
                continue;
            }
            restored.push((h, channel));
            let prior = if channel == Channel::Constellation {
                pre_state.constellation.as_ref()
            } else {
                pre_state.hand(h).slot(channel)
            };
            if let Some(prior) = prior {
                let mut g = prior.clone();
                g.hand = if hand == Hand::Both { Hand::Both } else { h };
                g.sync = SyncPoints::reaching(boundary, boundary + cfg.posture_slot / speed);
                out.push(BehaviorInstruction::Gesture(g));
            }
            if hand == Hand::Both {
                // one restore instruction addresses both hands
                restored.push((h.other(), channel));
                break;
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn eval_rpt(
    inner: &MotionOp,
    mode: Option<RepeatMode>,
    rest: bool,
    ctx: &SignContext,
    state: &PostureState,
    start: f32,
    cfg: &TimingConfig,
    depth: u32,
) -> MotionOutcome {
    let forward = eval_at_depth(inner, ctx, state, start, cfg, depth + 1);
    let forward_duration = (forward.end - start).max(0.0);
    let speed = ctx.speed.max(f32::EPSILON);

    let needs_backward = backward_required(&forward.instructions);
    let loop_duration = forward_duration
        + if needs_backward {
            cfg.posture_slot / speed
        } else {
            0.0
        };

    let mut out = forward.instructions.clone();
    let mut end = forward.end;

    match mode {
        Some(RepeatMode::FromStart | RepeatMode::FromStartSeveral | RepeatMode::ManyRandom) => {
            let loops = if matches!(mode, Some(RepeatMode::FromStart)) {
                1
            } else {
                2
            };
            for i in 1..=loops {
                let boundary = start + forward_duration + (i - 1) as f32 * loop_duration;
                if needs_backward {
                    out.extend(backward_block(
                        &forward.instructions,
                        state,
                        ctx,
                        boundary,
                        cfg,
                    ));
                }
                let mut replay = forward.instructions.clone();
                shift_all(&mut replay, i as f32 * loop_duration);
                out.extend(replay);
            }
            end = start + forward_duration + loops as f32 * loop_duration;
        }
        Some(RepeatMode::ToFroTo) => {
            let pivot = forward.end;
            let mut middle = forward.instructions.clone();
            for instr in &mut middle {
                if let BehaviorInstruction::Gesture(g) = instr {
                    if let GestureKind::DirectedMotion { direction, .. } = &mut g.kind {
                        for d in direction.iter_mut() {
                            *d = -*d;
                        }
                    }
                }
                if let Some(sync) = instr.sync_mut() {
                    sync.mirror(pivot);
                }
            }
            out.extend(middle);
            let mut last = forward.instructions.clone();
            shift_all(&mut last, 2.0 * forward_duration);
            out.extend(last);
            end = start + 3.0 * forward_duration;
        }
        Some(RepeatMode::Reverse) => {
            if needs_backward {
                out.extend(backward_block(
                    &forward.instructions,
                    state,
                    ctx,
                    forward.end,
                    cfg,
                ));
                end = forward.end + cfg.posture_slot / speed;
            }
        }
        Some(RepeatMode::Continue | RepeatMode::ContinueSeveral) => {
            let loops = if matches!(mode, Some(RepeatMode::Continue)) {
                1
            } else {
                2
            };
            for i in 1..=loops {
                let mut replay = forward.instructions.clone();
                shift_all(&mut replay, i as f32 * forward_duration);
                out.extend(replay);
            }
            end = start + (loops + 1) as f32 * forward_duration;
        }
        Some(RepeatMode::Swap) | None => {
            // under-specified in the notation standard: a single forward pass
            debug!("repeat without an effective mode, single forward block");
        }
    }

    if rest {
        end += cfg.rest_slot;
    }

    MotionOutcome {
        instructions: out,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SignContext;

    fn doc(s: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(s).unwrap()
    }

    fn eval_str(xml: &str, ctx: &SignContext) -> MotionOutcome {
        let d = doc(xml);
        let op = parse_motion(d.root_element()).expect("motion parses");
        eval(&op, ctx, &PostureState::neutral(), 0.0, &TimingConfig::default())
    }

    fn directed_params(instr: &BehaviorInstruction) -> ([f32; 3], f32) {
        let BehaviorInstruction::Gesture(g) = instr else {
            panic!("expected gesture");
        };
        let GestureKind::DirectedMotion {
            direction, distance, ..
        } = &g.kind
        else {
            panic!("expected directed motion");
        };
        (*direction, *distance)
    }

    #[test]
    fn directed_distance_is_tiered_by_size() {
        let ctx = SignContext::default();
        let (_, small) = directed_params(
            &eval_str(r#"<directedmotion direction="u" size="small"/>"#, &ctx).instructions[0],
        );
        let (_, default) =
            directed_params(&eval_str(r#"<directedmotion direction="u"/>"#, &ctx).instructions[0]);
        let (_, big) = directed_params(
            &eval_str(r#"<directedmotion direction="u" size="big"/>"#, &ctx).instructions[0],
        );
        assert!(small < default && default < big);
        assert_eq!(default, DISTANCE_DEFAULT);
    }

    #[test]
    fn secondary_direction_blends_displacement() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<directedmotion direction="u" second_direction="r"/>"#,
            &ctx,
        );
        let (dir, distance) = directed_params(&out.instructions[0]);
        // 45 degrees between u and r, displacement shrinks by cos(45)
        assert!((dir[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((dir[1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((distance - DISTANCE_DEFAULT * std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn speed_divides_motion_spans() {
        let slow = SignContext::default();
        let fast = SignContext {
            speed: 2.0,
            ..SignContext::default()
        };
        let a = eval_str(r#"<directedmotion direction="u"/>"#, &slow);
        let b = eval_str(r#"<directedmotion direction="u"/>"#, &fast);
        assert!((a.end - 2.0 * b.end).abs() < 1e-5);
    }

    #[test]
    fn circular_angles_come_from_direction_codes() {
        let ctx = SignContext::default();
        let out = eval_str(r#"<circularmotion axis="o" start="u" end="d"/>"#, &ctx);
        let BehaviorInstruction::Gesture(g) = &out.instructions[0] else {
            panic!()
        };
        let GestureKind::CircularMotion {
            start_angle,
            end_angle,
            ..
        } = g.kind
        else {
            panic!()
        };
        assert!((start_angle - 90.0).abs() < 1e-3);
        assert!((end_angle + 90.0).abs() < 1e-3);
    }

    #[test]
    fn clockplus_adds_full_turns() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<circularmotion axis="o" start="u" clockplus="true" second_clockplus="true"/>"#,
            &ctx,
        );
        let BehaviorInstruction::Gesture(g) = &out.instructions[0] else {
            panic!()
        };
        let GestureKind::CircularMotion {
            start_angle,
            end_angle,
            ..
        } = g.kind
        else {
            panic!()
        };
        assert!((end_angle - start_angle - 1080.0).abs() < 1e-3);
    }

    #[test]
    fn circular_span_is_the_fixed_slot_regardless_of_sweep() {
        let cfg = TimingConfig::default();
        let ctx = SignContext::default();
        // half turn, full turn and a clockplus double turn all take one slot
        for xml in [
            r#"<circularmotion axis="o" start="u" end="d"/>"#,
            r#"<circularmotion axis="o" start="u"/>"#,
            r#"<circularmotion axis="o" start="u" clockplus="true"/>"#,
        ] {
            let out = eval_str(xml, &ctx);
            assert_eq!(out.end, cfg.circular_slot);
            assert_eq!(
                out.instructions[0].sync().unwrap().attack_peak,
                Some(cfg.circular_slot)
            );
        }
    }

    #[test]
    fn inward_axis_inverts_angles() {
        let ctx = SignContext::default();
        let out = eval_str(r#"<circularmotion axis="i" start="u" end="r"/>"#, &ctx);
        let BehaviorInstruction::Gesture(g) = &out.instructions[0] else {
            panic!()
        };
        let GestureKind::CircularMotion { start_angle, .. } = g.kind else {
            panic!()
        };
        assert!((start_angle + 90.0).abs() < 1e-3);
    }

    #[test]
    fn out_of_phase_circle_emits_a_second_leaf() {
        let ctx = SignContext {
            both_hands: true,
            out_of_phase: true,
            sym: SymFlags::LR,
            ..SignContext::default()
        };
        let out = eval_str(r#"<circularmotion axis="o" start="u"/>"#, &ctx);
        assert_eq!(out.instructions.len(), 2);
        assert_eq!(out.instructions[1].hand(), Some(Hand::Left));
        let in_phase = SignContext {
            both_hands: true,
            ..SignContext::default()
        };
        assert_eq!(
            eval_str(r#"<circularmotion axis="o" start="u"/>"#, &in_phase)
                .instructions
                .len(),
            1
        );
    }

    #[test]
    fn seq_threads_child_ends() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<seq_motion>
                <directedmotion direction="u"/>
                <directedmotion direction="d"/>
            </seq_motion>"#,
            &ctx,
        );
        assert_eq!(out.instructions.len(), 2);
        let first_end = out.instructions[0].sync().unwrap().attack_peak.unwrap();
        let second_start = out.instructions[1].sync().unwrap().start.unwrap();
        assert!((first_end - second_start).abs() < 1e-5);
    }

    #[test]
    fn par_remaps_children_onto_the_slowest_end() {
        let ctx = SignContext::default();
        // slow child runs 2.5x longer than the fast one
        let out = eval_str(
            r#"<par_motion>
                <directedmotion direction="u" fast="true"/>
                <seq_motion>
                    <directedmotion direction="d"/>
                    <wristmotion motion="nodding"/>
                </seq_motion>
            </par_motion>"#,
            &ctx,
        );
        let common_end = out.end;
        for instr in &out.instructions {
            let latest = instr.sync().unwrap().latest().unwrap();
            assert!(latest <= common_end + 1e-4);
            assert!(instr.sync().unwrap().is_monotonic());
        }
        // the fast child's single instruction must have been stretched
        let stretched = out.instructions[0].sync().unwrap();
        assert!((stretched.latest().unwrap() - common_end).abs() < 1e-4);
    }

    #[test]
    fn split_addresses_each_hand_and_takes_the_max_end() {
        let ctx = SignContext {
            both_hands: true,
            sym: SymFlags::LR,
            ..SignContext::default()
        };
        let out = eval_str(
            r#"<split_motion>
                <directedmotion direction="u"/>
                <wristmotion motion="twisting" slow="true"/>
            </split_motion>"#,
            &ctx,
        );
        assert_eq!(out.instructions[0].hand(), Some(Hand::Right));
        assert_eq!(out.instructions[1].hand(), Some(Hand::Left));
        let BehaviorInstruction::Gesture(g) = &out.instructions[0] else {
            panic!()
        };
        assert!(!g.lr_sym, "split children carry no symmetry");
        let wrist_end = out.instructions[1].sync().unwrap().end.unwrap();
        assert!((out.end - wrist_end).abs() < 1e-5);
    }

    #[test]
    fn tgt_zeroes_the_last_directed_distance_when_a_location_is_targeted() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<tgt_motion>
                <directedmotion direction="u" curve="l"/>
                <location_bodyarm location="shoulders"/>
            </tgt_motion>"#,
            &ctx,
        );
        let (_, distance) = directed_params(&out.instructions[0]);
        assert_eq!(distance, 0.0);
        // posture remapped onto the motion's span
        let posture_sync = out.instructions[1].sync().unwrap();
        assert!(posture_sync.latest().unwrap() <= out.end + 1e-5);
    }

    #[test]
    fn tgt_with_orientation_only_keeps_the_distance() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<tgt_motion>
                <directedmotion direction="u"/>
                <palmor palmor="d"/>
            </tgt_motion>"#,
            &ctx,
        );
        let (_, distance) = directed_params(&out.instructions[0]);
        assert!(distance > 0.0);
    }

    #[test]
    fn tgt_without_motion_child_is_unparseable() {
        let d = doc(r#"<tgt_motion><palmor palmor="d"/></tgt_motion>"#);
        assert!(parse_motion(d.root_element()).is_none());
    }

    #[test]
    fn fromstart_repeat_has_forward_backward_forward_structure() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<rpt_motion repetition="fromstart">
                <directedmotion direction="u"/>
            </rpt_motion>"#,
            &ctx,
        );
        // forward leaf, one restore per touched channel? no postures touched,
        // but net displacement forces a backward phase: location restore is
        // absent (neutral state has no location), so we still see the two
        // forward leaves and a widened end.
        assert_eq!(out.instructions.len(), 2);
        let first = out.instructions[0].sync().unwrap().start.unwrap();
        let second = out.instructions[1].sync().unwrap().start.unwrap();
        assert!(second > first);
        let cfg = TimingConfig::default();
        let fwd = cfg.directed_slot;
        assert!((out.end - (2.0 * fwd + cfg.posture_slot)).abs() < 1e-4);
    }

    #[test]
    fn repeat_of_balanced_motion_needs_no_backward_phase() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<rpt_motion repetition="fromstart">
                <seq_motion>
                    <directedmotion direction="u"/>
                    <directedmotion direction="d"/>
                </seq_motion>
            </rpt_motion>"#,
            &ctx,
        );
        let cfg = TimingConfig::default();
        // two directed slots forward, replayed once, no posture splice
        assert!((out.end - 4.0 * cfg.directed_slot).abs() < 1e-4);
        assert_eq!(out.instructions.len(), 4);
    }

    #[test]
    fn tofroto_mirrors_the_middle_segment() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<rpt_motion repetition="tofroto">
                <directedmotion direction="u"/>
            </rpt_motion>"#,
            &ctx,
        );
        assert_eq!(out.instructions.len(), 3);
        let (mid_dir, _) = directed_params(&out.instructions[1]);
        assert!((mid_dir[1] + 1.0).abs() < 1e-5, "middle direction inverted");
        let starts: Vec<f32> = out
            .instructions
            .iter()
            .map(|i| i.sync().unwrap().start.unwrap())
            .collect();
        assert!(starts[0] < starts[1] && starts[1] < starts[2]);
        let cfg = TimingConfig::default();
        assert!((out.end - 3.0 * cfg.directed_slot).abs() < 1e-4);
    }

    #[test]
    fn continue_replays_without_backward_phase() {
        let ctx = SignContext::default();
        let out = eval_str(
            r#"<rpt_motion repetition="continue_several">
                <directedmotion direction="u"/>
            </rpt_motion>"#,
            &ctx,
        );
        assert_eq!(out.instructions.len(), 3);
        let cfg = TimingConfig::default();
        assert!((out.end - 3.0 * cfg.directed_slot).abs() < 1e-4);
    }

    #[test]
    fn rest_appends_dead_time() {
        let ctx = SignContext::default();
        let plain = eval_str(
            r#"<rpt_motion><directedmotion direction="u"/></rpt_motion>"#,
            &ctx,
        );
        let rested = eval_str(
            r#"<rpt_motion rest="true"><directedmotion direction="u"/></rpt_motion>"#,
            &ctx,
        );
        let cfg = TimingConfig::default();
        assert!((rested.end - plain.end - cfg.rest_slot).abs() < 1e-5);
    }

    #[test]
    fn repeat_restores_touched_posture_channels() {
        let ctx = SignContext::default();
        let d = doc(
            r#"<rpt_motion repetition="fromstart">
                <tgt_motion>
                    <directedmotion direction="u"/>
                    <handconfig handshape="fist"/>
                </tgt_motion>
            </rpt_motion>"#,
        );
        let op = parse_motion(d.root_element()).unwrap();
        let state = PostureState::neutral();
        let out = eval(&op, &ctx, &state, 0.0, &TimingConfig::default());
        // a handshape restore to the neutral "flat" must be spliced in
        let restores: Vec<_> = out
            .instructions
            .iter()
            .filter(|i| {
                matches!(
                    i,
                    BehaviorInstruction::Gesture(g) if matches!(
                        &g.kind,
                        GestureKind::Handshape { handshape, .. } if handshape == "flat"
                    )
                )
            })
            .collect();
        assert_eq!(restores.len(), 1);
    }

    #[test]
    fn deep_nesting_degrades_to_a_no_op() {
        let mut xml = String::new();
        for _ in 0..40 {
            xml.push_str("<par_motion>");
        }
        xml.push_str(r#"<directedmotion direction="u"/>"#);
        for _ in 0..40 {
            xml.push_str("</par_motion>");
        }
        let ctx = SignContext::default();
        let out = eval_str(&xml, &ctx);
        assert!(out.instructions.is_empty());
        assert_eq!(out.end, 0.0);
    }
}
