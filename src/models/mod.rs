mod sample;
mod session;

pub use sample::{Sample, SleepStage};
pub use session::{
    BiometricMode, CuePlayEvent, HardwareProvenance, OutputMode, Session, SessionStatus,
    StageTimings,
};
