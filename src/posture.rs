//! Posture operators (handshape, orientations, locations, hand
//! constellations) and the per-sign posture state tracker.

use tracing::debug;

use crate::{
    context::SignContext,
    instruction::{BehaviorInstruction, ContactPoint, Gesture, GestureKind, Hand, SyncPoints},
    notation::{attr_string, tempo_modifier},
    timing::TimingConfig,
};

/// Closed set of posture operators parsed from posture-type elements.
#[derive(Clone, Debug, PartialEq)]
pub enum PostureOp {
    Handshape {
        shape: String,
        second: Option<String>,
        thumbpos: Option<String>,
        mainbend: Option<String>,
        tempo: f32,
    },
    FingerOrientation {
        dir: String,
        second: Option<String>,
        tempo: f32,
    },
    PalmOrientation {
        palmor: String,
        second: Option<String>,
        tempo: f32,
    },
    Location {
        location: String,
        second: Option<String>,
        side: Option<String>,
        contact: Option<String>,
        tempo: f32,
    },
    Constellation {
        src: ContactPoint,
        dst: ContactPoint,
        hand: Option<Hand>,
        tempo: f32,
    },
    /// Dominant / non-dominant pair of a split posture element.
    Split {
        dominant: Box<PostureOp>,
        non_dominant: Box<PostureOp>,
    },
}

pub fn is_posture_tag(tag: &str) -> bool {
    matches!(
        tag,
        "handconfig"
            | "extfidir"
            | "palmor"
            | "location_bodyarm"
            | "handconstellation"
            | "split_handconfig"
            | "split_location"
    )
}

fn contact_point(node: roxmltree::Node<'_, '_>) -> Option<ContactPoint> {
    Some(ContactPoint {
        location: attr_string(node, "location")?,
        side: attr_string(node, "side"),
        digits: attr_string(node, "digits"),
    })
}

fn hand_attr(node: roxmltree::Node<'_, '_>) -> Option<Hand> {
    match attr_string(node, "hand").as_deref() {
        Some("right") => Some(Hand::Right),
        Some("left") => Some(Hand::Left),
        Some("both") => Some(Hand::Both),
        _ => None,
    }
}

/// Parses one posture element into an operator. Unknown or structurally
/// incomplete elements resolve to nothing and are skipped by the caller.
pub fn parse_posture(node: roxmltree::Node<'_, '_>) -> Option<PostureOp> {
    let tempo = tempo_modifier(node);
    match node.tag_name().name() {
        "handconfig" => Some(PostureOp::Handshape {
            shape: attr_string(node, "handshape")?,
            second: attr_string(node, "second_handshape"),
            thumbpos: attr_string(node, "thumbpos"),
            mainbend: attr_string(node, "mainbend"),
            tempo,
        }),
        "extfidir" => Some(PostureOp::FingerOrientation {
            dir: attr_string(node, "dir")?,
            second: attr_string(node, "second_dir"),
            tempo,
        }),
        "palmor" => Some(PostureOp::PalmOrientation {
            palmor: attr_string(node, "palmor")?,
            second: attr_string(node, "second_palmor"),
            tempo,
        }),
        "location_bodyarm" => Some(PostureOp::Location {
            location: attr_string(node, "location")?,
            second: attr_string(node, "second_location"),
            side: attr_string(node, "side"),
            contact: attr_string(node, "contact"),
            tempo,
        }),
        "handconstellation" => {
            let mut points = node
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "location_hand")
                .filter_map(contact_point);
            let src = points.next()?;
            let dst = points.next()?;
            Some(PostureOp::Constellation {
                src,
                dst,
                hand: hand_attr(node),
                tempo,
            })
        }
        "split_handconfig" | "split_location" => {
            let mut halves = node
                .children()
                .filter(|c| c.is_element())
                .filter_map(parse_posture);
            let dominant = Box::new(halves.next()?);
            let non_dominant = Box::new(halves.next()?);
            Some(PostureOp::Split {
                dominant,
                non_dominant,
            })
        }
        other => {
            debug!(tag = other, "unknown posture element");
            None
        }
    }
}

/// Stamps a posture operator into gesture instructions at `start`. Postures
/// do not advance the clock; their attack peak sits one positioning slot
/// (speed-scaled) after the start, and relax/end stay open until the sign is
/// closed.
pub fn eval(
    op: &PostureOp,
    ctx: &SignContext,
    start: f32,
    cfg: &TimingConfig,
) -> Vec<BehaviorInstruction> {
    eval_for_hand(op, ctx, ctx.ambient_hand(), start, cfg)
}

fn eval_for_hand(
    op: &PostureOp,
    ctx: &SignContext,
    hand: Hand,
    start: f32,
    cfg: &TimingConfig,
) -> Vec<BehaviorInstruction> {
    let stamp = |tempo: f32, kind: GestureKind, hand: Hand| {
        let speed = (ctx.speed * tempo).max(f32::EPSILON);
        BehaviorInstruction::Gesture(Gesture {
            hand,
            lr_sym: ctx.sym.contains(crate::context::SymFlags::LR),
            ud_sym: ctx.sym.contains(crate::context::SymFlags::UD),
            oi_sym: ctx.sym.contains(crate::context::SymFlags::OI),
            sync: SyncPoints::reaching(start, start + cfg.loc_slot / speed),
            kind,
        })
    };

    match op {
        PostureOp::Handshape {
            shape,
            second,
            thumbpos,
            mainbend,
            tempo,
        } => vec![stamp(
            *tempo,
            GestureKind::Handshape {
                handshape: shape.clone(),
                second_handshape: second.clone(),
                thumbpos: thumbpos.clone(),
                mainbend: mainbend.clone(),
            },
            hand,
        )],
        PostureOp::FingerOrientation { dir, second, tempo } => vec![stamp(
            *tempo,
            GestureKind::FingerOrientation {
                extfidir: dir.clone(),
                second_extfidir: second.clone(),
            },
            hand,
        )],
        PostureOp::PalmOrientation {
            palmor,
            second,
            tempo,
        } => vec![stamp(
            *tempo,
            GestureKind::PalmOrientation {
                palmor: palmor.clone(),
                second_palmor: second.clone(),
            },
            hand,
        )],
        PostureOp::Location {
            location,
            second,
            side,
            contact,
            tempo,
        } => vec![stamp(
            *tempo,
            GestureKind::Location {
                location: location.clone(),
                second_location: second.clone(),
                side: side.clone(),
                contact: contact.clone(),
            },
            hand,
        )],
        PostureOp::Constellation {
            src,
            dst,
            hand: scoped,
            tempo,
        } => vec![stamp(
            *tempo,
            GestureKind::HandConstellation {
                src_contact: src.clone(),
                dst_contact: dst.clone(),
            },
            scoped.unwrap_or(hand),
        )],
        PostureOp::Split {
            dominant,
            non_dominant,
        } => {
            let dom_ctx = ctx.scoped_to(ctx.dominant);
            let nd_ctx = ctx.scoped_to(ctx.non_dominant());
            let mut out = eval_for_hand(dominant, &dom_ctx, ctx.dominant, start, cfg);
            out.extend(eval_for_hand(
                non_dominant,
                &nd_ctx,
                ctx.non_dominant(),
                start,
                cfg,
            ));
            out
        }
    }
}

/// The five posture channels a gesture instruction can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Location,
    FingerOrientation,
    PalmOrientation,
    Handshape,
    Constellation,
}

/// Classifies an instruction into the channel it writes, if any. Motion
/// gestures and non-gesture instructions write no channel.
pub fn channel_of(instr: &BehaviorInstruction) -> Option<Channel> {
    let BehaviorInstruction::Gesture(g) = instr else {
        return None;
    };
    match &g.kind {
        GestureKind::Location { .. } => Some(Channel::Location),
        GestureKind::FingerOrientation { .. } => Some(Channel::FingerOrientation),
        GestureKind::PalmOrientation { .. } => Some(Channel::PalmOrientation),
        GestureKind::Handshape { .. } => Some(Channel::Handshape),
        GestureKind::HandConstellation { .. } => Some(Channel::Constellation),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandChannels {
    pub location: Option<Gesture>,
    pub finger_orientation: Option<Gesture>,
    pub palm_orientation: Option<Gesture>,
    pub handshape: Option<Gesture>,
}

impl HandChannels {
    fn slot_mut(&mut self, channel: Channel) -> Option<&mut Option<Gesture>> {
        match channel {
            Channel::Location => Some(&mut self.location),
            Channel::FingerOrientation => Some(&mut self.finger_orientation),
            Channel::PalmOrientation => Some(&mut self.palm_orientation),
            Channel::Handshape => Some(&mut self.handshape),
            Channel::Constellation => None,
        }
    }

    pub fn slot(&self, channel: Channel) -> Option<&Gesture> {
        match channel {
            Channel::Location => self.location.as_ref(),
            Channel::FingerOrientation => self.finger_orientation.as_ref(),
            Channel::PalmOrientation => self.palm_orientation.as_ref(),
            Channel::Handshape => self.handshape.as_ref(),
            Channel::Constellation => None,
        }
    }
}

/// Immutable per-sign posture snapshot: one channel set per hand plus the
/// shared hand-constellation slot. Each stored instruction is stamped by its
/// own `start`; merging keeps the latest writer by document time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostureState {
    pub right: HandChannels,
    pub left: HandChannels,
    pub constellation: Option<Gesture>,
}

fn neutral_gesture(hand: Hand, kind: GestureKind) -> Gesture {
    Gesture {
        hand,
        lr_sym: false,
        ud_sym: false,
        oi_sym: false,
        // unstamped: any incoming instruction wins the merge
        sync: SyncPoints::default(),
        kind,
    }
}

impl PostureState {
    /// Built-in defaults used when no previous sign supplies an end state.
    pub fn neutral() -> Self {
        let channels = |hand: Hand| HandChannels {
            location: None,
            finger_orientation: Some(neutral_gesture(
                hand,
                GestureKind::FingerOrientation {
                    extfidir: "u".to_string(),
                    second_extfidir: None,
                },
            )),
            palm_orientation: Some(neutral_gesture(
                hand,
                GestureKind::PalmOrientation {
                    palmor: "d".to_string(),
                    second_palmor: None,
                },
            )),
            handshape: Some(neutral_gesture(
                hand,
                GestureKind::Handshape {
                    handshape: "flat".to_string(),
                    second_handshape: None,
                    thumbpos: None,
                    mainbend: None,
                },
            )),
        };
        Self {
            right: channels(Hand::Right),
            left: channels(Hand::Left),
            constellation: None,
        }
    }

    pub fn hand(&self, hand: Hand) -> &HandChannels {
        match hand {
            Hand::Left => &self.left,
            _ => &self.right,
        }
    }

    /// Pure merge: returns a new snapshot where each incoming posture
    /// instruction replaces the stored one for its (hand, channel) pair only
    /// if its `start` is not older. Applying the same list twice is a no-op
    /// the second time.
    #[must_use]
    pub fn update(&self, instrs: &[BehaviorInstruction]) -> Self {
        let mut next = self.clone();
        for instr in instrs {
            let Some(channel) = channel_of(instr) else {
                continue;
            };
            let BehaviorInstruction::Gesture(g) = instr else {
                continue;
            };
            if channel == Channel::Constellation {
                if newer(&next.constellation, g) {
                    next.constellation = Some(g.clone());
                }
                continue;
            }
            for hand in [Hand::Right, Hand::Left] {
                if !g.hand.covers(hand) {
                    continue;
                }
                let channels = match hand {
                    Hand::Left => &mut next.left,
                    _ => &mut next.right,
                };
                if let Some(slot) = channels.slot_mut(channel) {
                    if newer(slot, g) {
                        *slot = Some(g.clone());
                    }
                }
            }
        }
        next
    }
}

fn newer(stored: &Option<Gesture>, candidate: &Gesture) -> bool {
    let stored_start = stored
        .as_ref()
        .and_then(|g| g.sync.start)
        .unwrap_or(f32::NEG_INFINITY);
    candidate.sync.start.unwrap_or(f32::NEG_INFINITY) >= stored_start
}
