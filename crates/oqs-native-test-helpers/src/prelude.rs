//! Convenience re-exports for tests.

pub use crate::host::{HostProbe, ScriptedHost};
pub use crate::must::{must, must_some, must_with};
pub use crate::opener::{GatedOpener, OpenCall, RecordingOpener, stand_in_library};
pub use crate::toy::{
    FAILING_KEM, NativeCallCounts, TOY_KEM, TOY_KEM_LENGTHS, TOY_SIG, native_calls,
    reset_native_calls, toy_functions,
};
