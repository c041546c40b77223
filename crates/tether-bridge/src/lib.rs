//! `tether-bridge` — host-side bridge for a sandboxed Wasm interpreter.
//!
//! The interpreter is a compiled WebAssembly module that owns its own linear
//! memory and evaluates source text handed to it by the host. This crate is
//! the boundary layer between that module and the host environment:
//!
//! - [`MemoryLens`] — bounds-checked typed access to the module's memory
//! - [`Marshaller`] / [`TransferBuffer`] — (pointer, length) value exchange
//!   with explicit, single-use ownership transfer
//! - [`ColorRef`] / [`PointRef`] — non-owning wrappers over module-owned
//!   struct values, addressed by opaque handle
//! - [`Gfx`] / [`Console`] — the capability surface the module may call
//! - [`Bridge`] — lifecycle, plus the `evaluate`/`resume`/`reset`
//!   cooperative execution protocol
//!
//! One `Bridge` manages exactly one module instance; all caches (typed
//! entry points, the scratch-slot address) are fields of the bridge, so
//! multiple bridges coexist safely.

use thiserror::Error;

mod bridge;
mod control;
mod handle;
mod marshal;
mod memory;
mod surface;
mod validate;

pub use bridge::Bridge;
pub use control::{EvalOutcome, ExecState};
pub use handle::{layout, Color, ColorRef, Point, PointRef};
pub use marshal::{ElemKind, Marshaller, TransferBuffer};
pub use memory::MemoryLens;
pub use surface::{link_host_surface, Console, Gfx, HostState};
pub use validate::check_required_exports;

/// Errors crossing the module boundary.
///
/// Everything here except `Load` is a contract violation: the module (or the
/// caller) broke the boundary protocol, memory safety can no longer be
/// assumed, and the bridge makes no attempt at partial recovery. There are
/// no retries anywhere.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A (pointer, length) span extends past the current memory size.
    #[error("memory access out of bounds: {ptr}+{len} exceeds {size} bytes")]
    OutOfBounds { ptr: u32, len: u32, size: usize },

    /// Text crossing the boundary was not valid UTF-8.
    #[error("invalid utf-8 in module memory at {ptr}+{len}")]
    InvalidUtf8 { ptr: u32, len: u32 },

    /// A handle wrapper was constructed from the null handle.
    #[error("null handle for {kind}")]
    NullHandle { kind: &'static str },

    /// An execution-control operation was invoked in a disallowed state.
    #[error("{op} is not valid while the controller is {state:?}")]
    InvalidState { op: &'static str, state: ExecState },

    /// The module binary lacks a required export.
    #[error("module is missing required export `{0}`")]
    MissingExport(&'static str),

    /// A required export exists but has the wrong type or signature.
    #[error("export `{name}` has the wrong shape: {detail}")]
    ExportShape { name: &'static str, detail: String },

    /// The module binary could not be loaded, linked, or instantiated.
    #[error("failed to load module: {0}")]
    Load(String),

    /// A call into the module trapped or broke the call protocol.
    #[error("module call failed: {0}")]
    Call(String),
}

impl BridgeError {
    pub(crate) fn load(err: impl ToString) -> Self {
        BridgeError::Load(err.to_string())
    }

    pub(crate) fn call(err: impl ToString) -> Self {
        BridgeError::Call(err.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
