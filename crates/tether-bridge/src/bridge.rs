//! Bridge lifecycle and the public execution surface.
//!
//! One `Bridge` owns one instantiated module: the wasmi store (with the
//! capability implementations inside), the memory lens, the marshaller,
//! the typed entry points, and the cached scratch-slot address. Nothing
//! here is global — two bridges never share state.

use wasmi::{AsContext, Engine, Extern, Instance, Linker, Module, Store, TypedFunc};

use crate::control::{EvalOutcome, ExecGate, ExecState};
use crate::handle::{Color, ColorRef, Point, PointRef};
use crate::marshal::{ElemKind, Marshaller, TransferBuffer};
use crate::memory::MemoryLens;
use crate::surface::{link_host_surface, Console, Gfx, HostState};
use crate::{validate, BridgeError, BridgeResult};

/// `eval` return status: the evaluation ran to completion and the result
/// pair is in the scratch slot.
const STATUS_COMPLETE: u32 = 0;
/// `eval` return status: the module yielded. `resume` continues it.
const STATUS_SUSPENDED: u32 = 1;
/// `resume` return status: still suspended, call `resume` again.
const RESUME_PENDING: u32 = 0;
/// `resume` return status: done, the result pair is in the scratch slot.
const RESUME_DONE: u32 = 1;

/// Typed entry points captured at instantiation.
struct EntryPoints {
    eval: TypedFunc<(u32, u32, u32), u32>,
    resume: TypedFunc<u32, u32>,
    reset: TypedFunc<(), ()>,
    color_free: TypedFunc<u32, ()>,
    point_free: TypedFunc<u32, ()>,
}

/// Host-side bridge to one interpreter module instance.
pub struct Bridge {
    store: Store<HostState>,
    lens: MemoryLens,
    marshaller: Marshaller,
    entry: EntryPoints,
    /// Scratch-slot address, queried from the module once at startup.
    /// Holds the (pointer, length) pair of a variable-length return from a
    /// host-initiated call; overwritten on every use, never shared between
    /// in-flight calls (the execution gate forbids overlap).
    ret_area: u32,
    gate: ExecGate,
    last_result: Option<String>,
}

impl Bridge {
    /// Instantiate `wasm_bytes` against the host capability surface.
    ///
    /// Validates the export contract, links the imports, runs the start
    /// function, captures memory and entry points, and queries the scratch
    /// slot address once. Must complete before any other operation; the
    /// returned value is the only way to reach the instance, so concurrent
    /// initialization cannot arise.
    pub fn initialize(
        wasm_bytes: &[u8],
        gfx: Box<dyn Gfx>,
        console: Box<dyn Console>,
    ) -> BridgeResult<Self> {
        validate::check_required_exports(wasm_bytes)?;

        let engine = Engine::default();
        let module = Module::new(&engine, wasm_bytes).map_err(BridgeError::load)?;
        let mut linker = Linker::<HostState>::new(&engine);
        link_host_surface(&mut linker)?;

        let mut store = Store::new(&engine, HostState::new(gfx, console));
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(BridgeError::load)?
            .start(&mut store)
            .map_err(BridgeError::load)?;

        let memory = instance
            .get_export(&store, "memory")
            .and_then(Extern::into_memory)
            .ok_or(BridgeError::MissingExport("memory"))?;
        let lens = MemoryLens::new(memory);

        let alloc = typed_export(&instance, &store, "alloc")?;
        let dealloc = typed_export(&instance, &store, "dealloc")?;
        let entry = EntryPoints {
            eval: typed_export(&instance, &store, "eval")?,
            resume: typed_export(&instance, &store, "resume")?,
            reset: typed_export(&instance, &store, "reset")?,
            color_free: typed_export(&instance, &store, "color_free")?,
            point_free: typed_export(&instance, &store, "point_free")?,
        };

        let ret_area_fn: TypedFunc<(), u32> = typed_export(&instance, &store, "ret_area")?;
        let ret_area = ret_area_fn.call(&mut store, ()).map_err(BridgeError::call)?;

        log::debug!(
            "module instantiated: memory {} bytes, scratch slot at {ret_area:#x}",
            lens.size(&store)
        );

        Ok(Self {
            store,
            lens,
            marshaller: Marshaller::new(lens, alloc, dealloc),
            entry,
            ret_area,
            gate: ExecGate::new(),
            last_result: None,
        })
    }

    /// Current controller state.
    pub fn state(&self) -> ExecState {
        self.gate.state()
    }

    /// Result text of the most recently completed evaluation.
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// Submit source text for evaluation. Valid only from `Idle`.
    ///
    /// Ownership of the marshalled source passes to the module. On
    /// completion the result text is copied out of the scratch slot and
    /// its span released; on suspension the module keeps its state and
    /// [`Bridge::resume`] continues it. If the call fails, the controller
    /// stays `Running` and only [`Bridge::reset`] recovers.
    pub fn evaluate(&mut self, source: &str) -> BridgeResult<EvalOutcome> {
        self.gate.begin_evaluate()?;

        let buf = self.marshaller.write_text(&mut self.store, source)?;
        let (ptr, len) = buf.into_raw_parts();
        let status = self
            .entry
            .eval
            .call(&mut self.store, (self.ret_area, ptr, len))
            .map_err(BridgeError::call)?;

        match status {
            STATUS_SUSPENDED => {
                log::debug!("evaluation suspended");
                self.gate.settle_suspended();
                Ok(EvalOutcome::Suspended)
            }
            STATUS_COMPLETE => {
                let text = self.take_return_text()?;
                self.gate.settle_idle();
                self.last_result = Some(text.clone());
                Ok(EvalOutcome::Complete(text))
            }
            other => Err(BridgeError::Call(format!(
                "eval returned unknown status {other}"
            ))),
        }
    }

    /// Advance a suspended evaluation one step. Valid only from
    /// `Suspended`.
    ///
    /// Returns `true` when the computation has completed (the final result
    /// text is then available via [`Bridge::last_result`]), `false` while
    /// it remains suspended.
    pub fn resume(&mut self) -> BridgeResult<bool> {
        self.gate.begin_resume()?;

        let status = self
            .entry
            .resume
            .call(&mut self.store, self.ret_area)
            .map_err(BridgeError::call)?;

        match status {
            RESUME_DONE => {
                let text = self.take_return_text()?;
                self.gate.settle_idle();
                self.last_result = Some(text);
                Ok(true)
            }
            RESUME_PENDING => {
                self.gate.settle_suspended();
                Ok(false)
            }
            other => Err(BridgeError::Call(format!(
                "resume returned unknown status {other}"
            ))),
        }
    }

    /// Unconditionally discard any in-progress computation and return to
    /// `Idle`. Valid from every state, including after a failed call.
    pub fn reset(&mut self) -> BridgeResult<()> {
        self.entry
            .reset
            .call(&mut self.store, ())
            .map_err(BridgeError::call)?;
        self.gate.reset();
        self.last_result = None;
        log::debug!("controller reset to idle");
        Ok(())
    }

    /// Read and release the (pointer, length) result pair from the
    /// scratch slot.
    fn take_return_text(&mut self) -> BridgeResult<String> {
        let ptr = self.lens.read_u32(&self.store, self.ret_area)?;
        let len = self.lens.read_u32(&self.store, self.ret_area + 4)?;
        self.marshaller.read_text(
            &mut self.store,
            TransferBuffer::from_raw_parts(ptr, len, ElemKind::Byte),
        )
    }

    // ── Handle construction and disposal ─────────────────────────────

    /// Wrap a raw Color handle received from the module.
    pub fn color(&self, raw: u32) -> BridgeResult<ColorRef> {
        ColorRef::from_raw(raw)
    }

    /// Wrap a raw Point handle received from the module.
    pub fn point(&self, raw: u32) -> BridgeResult<PointRef> {
        PointRef::from_raw(raw)
    }

    /// Read a Color value through its handle.
    pub fn read_color(&self, color: &ColorRef) -> BridgeResult<Color> {
        color.load(&self.lens, &self.store)
    }

    /// Write a Color value through its handle.
    pub fn write_color(&mut self, color: &ColorRef, value: Color) -> BridgeResult<()> {
        color.store(&self.lens, &mut self.store, value)
    }

    /// Mutate a Color in place through its handle.
    pub fn update_color(
        &mut self,
        color: &ColorRef,
        f: impl FnOnce(&mut Color),
    ) -> BridgeResult<()> {
        let mut value = self.read_color(color)?;
        f(&mut value);
        self.write_color(color, value)
    }

    /// Read a Point value through its handle.
    pub fn read_point(&self, point: &PointRef) -> BridgeResult<Point> {
        point.load(&self.lens, &self.store)
    }

    /// Write a Point value through its handle.
    pub fn write_point(&mut self, point: &PointRef, value: Point) -> BridgeResult<()> {
        point.store(&self.lens, &mut self.store, value)
    }

    /// Mutate a Point in place through its handle.
    pub fn update_point(
        &mut self,
        point: &PointRef,
        f: impl FnOnce(&mut Point),
    ) -> BridgeResult<()> {
        let mut value = self.read_point(point)?;
        f(&mut value);
        self.write_point(point, value)
    }

    /// Release a module-owned Color. Consumes the wrapper.
    pub fn release_color(&mut self, color: ColorRef) -> BridgeResult<()> {
        color.release(&mut self.store, self.entry.color_free)
    }

    /// Release a module-owned Point. Consumes the wrapper.
    pub fn release_point(&mut self, point: PointRef) -> BridgeResult<()> {
        point.release(&mut self.store, self.entry.point_free)
    }
}

/// Resolve a typed function export from the instance.
fn typed_export<P, R>(
    instance: &Instance,
    store: &Store<HostState>,
    name: &'static str,
) -> BridgeResult<TypedFunc<P, R>>
where
    P: wasmi::WasmParams,
    R: wasmi::WasmResults,
{
    instance
        .get_export(store.as_context(), name)
        .and_then(Extern::into_func)
        .ok_or(BridgeError::MissingExport(name))?
        .typed::<P, R>(store)
        .map_err(|e| BridgeError::ExportShape {
            name,
            detail: e.to_string(),
        })
}
