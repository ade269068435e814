//! The live-instance side of the probes.

use std::sync::{Arc, Mutex, PoisonError};

use crate::recorder::EffectRecorder;
use crate::ProbeError;

/// One argument passed to a surveyed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Int(i64),
    Bool(bool),
    /// A callback over the handle type. When run it applies
    /// `<marker> = true` to the handle it receives; callbacks that must
    /// complete (transactions, batches) also execute that handle.
    Callback { marker: String },
}

/// A method invocation by surface name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: String,
    pub args: Vec<Arg>,
}

impl Call {
    pub fn new(method: impl Into<String>, args: Vec<Arg>) -> Self {
        Call {
            method: method.into(),
            args,
        }
    }
}

/// Isolation depths observed by callbacks, in invocation order.
///
/// The target pushes the depth of every handle it passes into a
/// [`Arg::Callback`]; `None` means the target could not tell.
#[derive(Debug, Clone, Default)]
pub struct CallbackLog {
    depths: Arc<Mutex<Vec<Option<u8>>>>,
}

impl CallbackLog {
    pub fn record(&self, depth: Option<u8>) {
        self.depths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(depth);
    }

    /// Depth seen by the first callback invocation.
    pub fn first(&self) -> Option<u8> {
        self.depths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.depths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fresh live instance with its own recorder.
pub struct Connection<H, R> {
    /// The branch-safe entry handle. Probes never pollute it directly.
    pub root: H,
    pub recorder: R,
    pub callbacks: CallbackLog,
}

/// A live instance of the surveyed library, driven by method name.
pub trait Target {
    type Handle: Clone;
    type Recorder: EffectRecorder;

    /// Open a fresh instance. Every probe calls this once.
    fn connect(&self) -> Result<Connection<Self::Handle, Self::Recorder>, ProbeError>;

    /// A handle whose chain calls mutate it in place.
    fn mutable_base(
        &self,
        conn: &Connection<Self::Handle, Self::Recorder>,
    ) -> Result<Self::Handle, ProbeError>;

    /// Invoke `call` on `handle`. Returns the handle the method returned,
    /// or `None` if it returns something else.
    fn invoke(
        &self,
        conn: &Connection<Self::Handle, Self::Recorder>,
        handle: &Self::Handle,
        call: &Call,
    ) -> Result<Option<Self::Handle>, ProbeError>;

    /// Apply an unrelated filter carrying `marker`.
    fn tag(&self, handle: &Self::Handle, marker: &str) -> Result<Self::Handle, ProbeError>;

    /// Run the terminal effect on `handle`.
    fn execute(&self, handle: &Self::Handle) -> Result<(), ProbeError>;

    /// Internal isolation depth of `handle`, when the target exposes one.
    fn isolation_depth(&self, _handle: &Self::Handle) -> Option<u8> {
        None
    }

    /// False if the method does not exist on the installed version.
    fn supports(&self, _method: &str) -> bool {
        true
    }
}
