//! Signweave turns sign-language notation documents into flat, timed
//! behavior-instruction streams.
//!
//! The public API is deliberately small:
//!
//! - Build a [`Transducer`] (optionally from a custom [`TimingConfig`])
//! - Feed it notation markup with [`Transducer::transduce`]
//! - Consume the resulting [`TransducerOutput`] instruction stream
//!
//! Transduction is pure and synchronous; no failure mode panics, and
//! malformed input degrades to an empty result rather than an error.
#![forbid(unsafe_code)]

pub(crate) mod context;
pub(crate) mod error;
/// Output instruction model.
pub mod instruction;
pub(crate) mod manual;
pub(crate) mod motion;
pub(crate) mod nmf;
pub(crate) mod notation;
pub(crate) mod posture;
pub(crate) mod sequence;
pub(crate) mod tables;
/// Timing slot configuration.
pub mod timing;

pub use crate::context::{SignContext, SymFlags};
pub use crate::error::{SignweaveError, SignweaveResult};
pub use crate::instruction::{
    BehaviorInstruction, ContactPoint, FaceLexeme, GazeShift, Gesture, GestureKind, GlossLabel,
    Hand, HeadMove, MotionTag, SpeechFragment, SyncPoints,
};
pub use crate::posture::PostureState;
pub use crate::sequence::{Transducer, TransducerOutput, transduce};
pub use crate::timing::TimingConfig;
