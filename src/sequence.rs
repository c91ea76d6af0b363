//! Top-level sign sequencer: iterates the signs of a notation document,
//! stitches consecutive timelines by overlapping their trailing phases, and
//! accumulates the flat instruction stream.

use tracing::{debug, warn};

use crate::{
    error::SignweaveResult,
    instruction::{BehaviorInstruction, GlossLabel},
    manual, nmf, notation,
    posture::PostureState,
    timing::TimingConfig,
};

/// The transducer's sole output: a flat instruction stream, the overall
/// duration, and the last sign's trailing-phase durations (used by callers
/// that stitch further content on).
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransducerOutput {
    pub data: Vec<BehaviorInstruction>,
    pub duration: f32,
    pub relax_end_duration: f32,
    pub peak_relax_duration: f32,
}

/// Pure, synchronous notation-to-instruction transducer. Independent
/// instances may run concurrently; nothing is shared between invocations.
#[derive(Clone, Debug)]
pub struct Transducer {
    cfg: TimingConfig,
}

impl Default for Transducer {
    fn default() -> Self {
        Self {
            cfg: TimingConfig::default(),
        }
    }
}

impl Transducer {
    pub fn new(cfg: TimingConfig) -> SignweaveResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TimingConfig {
        &self.cfg
    }

    /// Transduces one document. Malformed markup degrades to the empty
    /// zero-duration result; no failure mode raises.
    #[tracing::instrument(skip(self, document))]
    pub fn transduce(&self, document: &str, offset: Option<f32>) -> TransducerOutput {
        let offset = offset.filter(|v| v.is_finite()).unwrap_or(0.0);

        let doc = match notation::parse_document(document) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(%err, "unparseable notation document");
                return TransducerOutput::default();
            }
        };

        let cfg = &self.cfg;
        let mut out = TransducerOutput::default();
        let mut state = PostureState::neutral();
        let mut prev_end = offset;
        let mut prev_peak_relax = 0.0;
        let mut prev_relax_end = 0.0;
        let mut first = true;

        for sign in doc.root_element().children().filter(|c| {
            c.is_element()
                && matches!(c.tag_name().name(), "hns_sign" | "hamgestural_sign")
        }) {
            let overlap = if first { 0.0 } else { cfg.sign_overlap };
            first = false;
            let start = prev_end - prev_relax_end - prev_peak_relax + overlap;

            let mut sign_data: Vec<BehaviorInstruction> = Vec::new();
            let mut manual_end = start;
            let mut peak_relax = 0.0;
            let mut relax_end = 0.0;
            let mut nmf_end = start;
            // the manual element's tempo governs the whole sign, wherever it
            // sits in document order
            let speed = sign
                .children()
                .find(|c| c.is_element() && c.tag_name().name() == "sign_manual")
                .map_or(1.0, |m| manual::sign_context(m).speed);

            for part in sign.children().filter(|c| c.is_element()) {
                match part.tag_name().name() {
                    "sign_manual" => {
                        let outcome = manual::synthesize(part, &state, start, cfg);
                        sign_data.extend(outcome.data);
                        state = outcome.state;
                        manual_end = outcome.end;
                        peak_relax = outcome.peak_relax_duration;
                        relax_end = outcome.relax_end_duration;
                    }
                    "sign_nonmanual" => {
                        let outcome = nmf::schedule(part, start, speed, cfg);
                        sign_data.extend(outcome.instructions);
                        nmf_end = outcome.end;
                    }
                    other => {
                        debug!(tag = other, "unknown sign child");
                    }
                }
            }

            let sign_end = manual_end.max(nmf_end);
            if let Some(gloss) = notation::attr(sign, "gloss") {
                sign_data.insert(
                    0,
                    BehaviorInstruction::Gloss(GlossLabel {
                        gloss: gloss.to_string(),
                        start,
                        end: sign_end,
                    }),
                );
            }

            out.data.extend(sign_data);
            out.duration = out.duration.max(sign_end);
            prev_end = sign_end;
            prev_peak_relax = peak_relax;
            prev_relax_end = relax_end;
        }

        out.peak_relax_duration = prev_peak_relax;
        out.relax_end_duration = prev_relax_end;
        out
    }
}

/// Convenience entry with the default timing table.
pub fn transduce(document: &str, offset: Option<f32>) -> TransducerOutput {
    Transducer::default().transduce(document, offset)
}
