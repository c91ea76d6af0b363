use signweave::{
    BehaviorInstruction, GestureKind, Hand, MotionTag, TimingConfig, Transducer, transduce,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn gestures(out: &[BehaviorInstruction]) -> Vec<&signweave::Gesture> {
    out.iter()
        .filter_map(|i| match i {
            BehaviorInstruction::Gesture(g) => Some(g),
            _ => None,
        })
        .collect()
}

#[test]
fn lone_handshape_sign_times_out_the_full_phase_envelope() {
    init_tracing();
    let cfg = TimingConfig::default();
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual><handconfig handshape="fist"/></sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    assert_eq!(out.data.len(), 1);
    let g = &gestures(&out.data)[0];
    assert_eq!(g.sync.start, Some(0.0));
    assert_eq!(g.sync.attack_peak, Some(cfg.loc_slot));
    assert_eq!(g.sync.relax, Some(cfg.loc_slot + cfg.peak_relax));
    assert_eq!(
        g.sync.end,
        Some(cfg.loc_slot + cfg.peak_relax + cfg.relax_end)
    );
    assert_eq!(out.duration, cfg.loc_slot + cfg.peak_relax + cfg.relax_end);
    assert_eq!(out.peak_relax_duration, cfg.peak_relax);
    assert_eq!(out.relax_end_duration, cfg.relax_end);
}

#[test]
fn symmetric_two_handed_signs_stamp_flags_instead_of_duplicating() {
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual both_hands="true" lr_symm="true">
                    <handconfig handshape="flat"/>
                    <directedmotion direction="l"/>
                </sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    let gs = gestures(&out.data);
    assert_eq!(gs.len(), 2);
    for g in &gs {
        assert_eq!(g.hand, Hand::Both);
        assert!(g.lr_sym);
        assert!(!g.ud_sym);
    }
}

#[test]
fn parallel_branches_share_a_common_end() {
    let cfg = TimingConfig::default();
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual>
                    <par_motion>
                        <directedmotion direction="o"/>
                        <wristmotion motion="nodding"/>
                    </par_motion>
                </sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    let gs = gestures(&out.data);
    assert_eq!(gs.len(), 2);
    // the longest branch sets the block length; the shorter one is stretched
    let common = cfg.directed_slot.max(cfg.wrist_slot);
    for g in &gs {
        let end = match &g.kind {
            GestureKind::DirectedMotion { .. } => g.sync.attack_peak,
            GestureKind::WristMotion { .. } => g.sync.end,
            other => panic!("unexpected gesture kind {other:?}"),
        };
        assert!((end.unwrap() - common).abs() < 1e-5);
    }
}

#[test]
fn fromstart_repeat_splices_a_restoring_backward_block() {
    let cfg = TimingConfig::default();
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual>
                    <handconfig handshape="fist"/>
                    <location_bodyarm location="chest"/>
                    <rpt_motion repetition="fromstart">
                        <directedmotion direction="u"/>
                    </rpt_motion>
                </sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    let gs = gestures(&out.data);
    // opening postures, forward pass, location restore, forward replay
    assert_eq!(gs.len(), 5);

    let motion_start = cfg.loc_slot;
    let forward_end = motion_start + cfg.directed_slot;
    let restore_end = forward_end + cfg.posture_slot;

    let directed: Vec<_> = gs
        .iter()
        .filter(|g| matches!(g.kind, GestureKind::DirectedMotion { .. }))
        .collect();
    assert_eq!(directed.len(), 2);
    assert_eq!(directed[0].sync.start, Some(motion_start));
    assert_eq!(directed[0].sync.attack_peak, Some(forward_end));
    assert_eq!(directed[1].sync.start, Some(restore_end));

    let restore = gs
        .iter()
        .find(|g| {
            matches!(g.kind, GestureKind::Location { .. })
                && g.sync.start == Some(forward_end)
        })
        .unwrap();
    assert_eq!(restore.sync.attack_peak, Some(restore_end));
}

#[test]
fn nonmanual_tiers_lead_the_sign_by_one_location_slot() {
    let cfg = TimingConfig::default();
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_nonmanual>
                    <head_tier><head_movement movement="NO"/></head_tier>
                </sign_nonmanual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    assert_eq!(out.data.len(), 1);
    let BehaviorInstruction::Head(head) = &out.data[0] else {
        panic!("expected a head instruction");
    };
    assert_eq!(head.sync.start, Some(cfg.loc_slot));
    assert_eq!(Some(out.duration), head.sync.latest());
}

#[test]
fn every_instruction_of_a_rich_utterance_is_monotonic_and_bounded() {
    init_tracing();
    let doc = r#"<sigml>
        <hns_sign gloss="SHOP">
            <sign_manual both_hands="true" outofphase="true">
                <handconfig handshape="cee"/>
                <circularmotion axis="o" direction="u" clockplus="true"/>
            </sign_manual>
            <sign_nonmanual>
                <head_tier><head_movement movement="NO"/></head_tier>
                <mouthing_tier><mouth_picture picture="SHOp"/></mouthing_tier>
            </sign_nonmanual>
        </hns_sign>
        <hns_sign>
            <sign_manual fast="true">
                <split_motion>
                    <directedmotion direction="ol" curve="u"/>
                    <wristmotion motion="twisting"/>
                </split_motion>
                <rpt_motion repetition="tofroto">
                    <directedmotion direction="d"/>
                </rpt_motion>
            </sign_manual>
        </hns_sign>
    </sigml>"#;
    let out = transduce(doc, Some(1.0));
    assert!(out.data.len() > 5);
    assert!(out.duration > 1.0);
    for instr in &out.data {
        let Some(sync) = instr.sync() else { continue };
        assert!(sync.is_monotonic(), "out of order: {instr:?}");
        assert!(sync.start.unwrap() >= 1.0 - 1e-5);
        assert!(sync.latest().unwrap() <= out.duration + 1e-5);
    }
}

#[test]
fn fingerplay_keeps_its_wire_motion_tag() {
    let out = transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual><fingerplay digits="123"/></sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    let gs = gestures(&out.data);
    assert!(matches!(
        gs[0].kind,
        GestureKind::Fingerplay {
            motion: MotionTag::Fingerplay,
            ..
        }
    ));
}

#[test]
fn serialized_stream_is_deterministic_and_null_free() {
    let doc = r#"<sigml>
        <hns_sign gloss="HOUSE">
            <sign_manual>
                <handconfig handshape="flat"/>
                <directedmotion direction="uo" size="big"/>
            </sign_manual>
            <sign_nonmanual>
                <facialexpr_tier><eye_brows movement="RB"/></facialexpr_tier>
            </sign_nonmanual>
        </hns_sign>
    </sigml>"#;
    let t = Transducer::new(TimingConfig::default()).unwrap();
    let a = serde_json::to_string(&t.transduce(doc, Some(0.5))).unwrap();
    let b = serde_json::to_string(&t.transduce(doc, Some(0.5))).unwrap();
    assert_eq!(a, b);
    assert!(a.contains(r#""type":"gesture""#));
    assert!(a.contains(r#""type":"gloss""#));
    assert!(a.contains(r#""type":"faceLexeme""#));
    assert!(!a.contains("null"));
}

#[test]
fn custom_timing_scales_the_whole_envelope() {
    let mut cfg = TimingConfig::default();
    cfg.loc_slot = 1.0;
    cfg.peak_relax = 0.1;
    cfg.relax_end = 0.1;
    let t = Transducer::new(cfg).unwrap();
    let out = t.transduce(
        r#"<sigml>
            <hns_sign>
                <sign_manual><handconfig handshape="fist"/></sign_manual>
            </hns_sign>
        </sigml>"#,
        None,
    );
    assert_eq!(out.duration, 1.2);
}
