//! The host capability surface — every function the module may call.
//!
//! Each import shim performs exactly one marshalling step and forwards to
//! the named host operation; the bridge neither interprets nor retries
//! capability-level failures. Struct-shaped arguments arrive as raw
//! handles and are reconstructed as handle wrappers before the host sees
//! them; variable-length returns go out through a module-supplied return
//! slot, never through the bridge's own scratch slot.

use wasmi::core::{Trap, F32, F64};
use wasmi::{Caller, Linker};

use crate::handle::{Color, ColorRef, Point, PointRef};
use crate::marshal::{ElemKind, Marshaller, TransferBuffer};
use crate::memory::MemoryLens;
use crate::{BridgeError, BridgeResult};

/// Import module name the module links against.
pub const HOST_MODULE: &str = "host";

/// Windowing, input and drawing capabilities.
///
/// Failures are the implementation's own business (e.g. a headless host
/// may hand out a dummy window id); the bridge only guarantees the
/// arguments arrive intact.
pub trait Gfx {
    fn new_window(&mut self, width: u32, height: u32) -> u32;
    fn poll_events(&mut self, window: u32) -> Vec<u32>;
    fn poll_mouse(&mut self, window: u32) -> Vec<f32>;
    fn set_clear_color(&mut self, window: u32, color: Color);
    fn set_line_width(&mut self, window: u32, width: f32);
    fn draw_line(&mut self, window: u32, start: Point, end: Point, color: Color);
    fn draw_line_list(&mut self, window: u32, xs: &[f32], ys: &[f32], color: Color);
    fn draw_circle(&mut self, window: u32, center: Point, radius: f32, color: Color);
    fn present(&mut self, window: u32);
}

/// Console I/O capabilities.
pub trait Console {
    fn print(&mut self, text: &str);
    fn print_line(&mut self, text: &str);
    /// Supply one line of input. The module never blocks on this directly;
    /// it suspends and the host calls it during `resume`.
    fn read_line(&mut self) -> String;
    /// Structured log line from the module. Defaults to the `log` facade.
    fn log(&mut self, text: &str) {
        log::info!(target: "guest", "{text}");
    }
}

/// Host state stored in the wasmi store: the capability implementations
/// the import shims forward to.
pub struct HostState {
    pub gfx: Box<dyn Gfx>,
    pub console: Box<dyn Console>,
}

impl HostState {
    pub fn new(gfx: Box<dyn Gfx>, console: Box<dyn Console>) -> Self {
        Self { gfx, console }
    }
}

fn into_trap(err: BridgeError) -> Trap {
    Trap::new(err.to_string())
}

/// Register the full capability surface on `linker` under [`HOST_MODULE`].
pub fn link_host_surface(linker: &mut Linker<HostState>) -> BridgeResult<()> {
    link_gfx(linker)?;
    link_console(linker)?;
    link_math(linker)?;
    Ok(())
}

// The boundary only speaks wasmi's NaN-preserving `F32`/`F64`; plain Rust
// floats are converted at the shim edge so the capability traits stay on
// `f32`/`f64`.

fn link_gfx(linker: &mut Linker<HostState>) -> BridgeResult<()> {
    linker
        .func_wrap(HOST_MODULE, "random", || -> F64 {
            F64::from(rand::random::<f64>())
        })
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "new_window",
            |mut caller: Caller<'_, HostState>, width: u32, height: u32| -> u32 {
                caller.data_mut().gfx.new_window(width, height)
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "poll_events",
            |mut caller: Caller<'_, HostState>, ret: u32, window: u32| -> Result<(), Trap> {
                let events = caller.data_mut().gfx.poll_events(window);
                let m = Marshaller::from_caller(&caller).map_err(into_trap)?;
                let buf = m.write_u32_array(&mut caller, &events).map_err(into_trap)?;
                m.return_pair(&mut caller, ret, buf).map_err(into_trap)
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "poll_mouse",
            |mut caller: Caller<'_, HostState>, ret: u32, window: u32| -> Result<(), Trap> {
                let state = caller.data_mut().gfx.poll_mouse(window);
                let m = Marshaller::from_caller(&caller).map_err(into_trap)?;
                let buf = m.write_f32_array(&mut caller, &state).map_err(into_trap)?;
                m.return_pair(&mut caller, ret, buf).map_err(into_trap)
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "set_clear_color",
            |mut caller: Caller<'_, HostState>, window: u32, color: u32| -> Result<(), Trap> {
                let lens = MemoryLens::from_caller(&caller).map_err(into_trap)?;
                let color = ColorRef::from_raw(color)
                    .and_then(|c| c.load(&lens, &caller))
                    .map_err(into_trap)?;
                caller.data_mut().gfx.set_clear_color(window, color);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "set_line_width",
            |mut caller: Caller<'_, HostState>, window: u32, width: F32| {
                caller.data_mut().gfx.set_line_width(window, width.to_float());
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "draw_line",
            |mut caller: Caller<'_, HostState>,
             window: u32,
             start: u32,
             end: u32,
             color: u32|
             -> Result<(), Trap> {
                let lens = MemoryLens::from_caller(&caller).map_err(into_trap)?;
                let start = PointRef::from_raw(start)
                    .and_then(|p| p.load(&lens, &caller))
                    .map_err(into_trap)?;
                let end = PointRef::from_raw(end)
                    .and_then(|p| p.load(&lens, &caller))
                    .map_err(into_trap)?;
                let color = ColorRef::from_raw(color)
                    .and_then(|c| c.load(&lens, &caller))
                    .map_err(into_trap)?;
                caller.data_mut().gfx.draw_line(window, start, end, color);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "draw_line_list",
            |mut caller: Caller<'_, HostState>,
             window: u32,
             xs: u32,
             xs_len: u32,
             ys: u32,
             ys_len: u32,
             color: u32|
             -> Result<(), Trap> {
                // Coordinate arrays are borrowed for this call only; the
                // module keeps ownership and releases them afterwards.
                let lens = MemoryLens::from_caller(&caller).map_err(into_trap)?;
                let xs = lens.read_f32_array(&caller, xs, xs_len).map_err(into_trap)?;
                let ys = lens.read_f32_array(&caller, ys, ys_len).map_err(into_trap)?;
                let color = ColorRef::from_raw(color)
                    .and_then(|c| c.load(&lens, &caller))
                    .map_err(into_trap)?;
                caller.data_mut().gfx.draw_line_list(window, &xs, &ys, color);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "draw_circle",
            |mut caller: Caller<'_, HostState>,
             window: u32,
             center: u32,
             radius: F32,
             color: u32|
             -> Result<(), Trap> {
                let lens = MemoryLens::from_caller(&caller).map_err(into_trap)?;
                let center = PointRef::from_raw(center)
                    .and_then(|p| p.load(&lens, &caller))
                    .map_err(into_trap)?;
                let color = ColorRef::from_raw(color)
                    .and_then(|c| c.load(&lens, &caller))
                    .map_err(into_trap)?;
                caller
                    .data_mut()
                    .gfx
                    .draw_circle(window, center, radius.to_float(), color);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "present",
            |mut caller: Caller<'_, HostState>, window: u32| {
                caller.data_mut().gfx.present(window);
            },
        )
        .map_err(BridgeError::load)?;

    Ok(())
}

fn link_console(linker: &mut Linker<HostState>) -> BridgeResult<()> {
    linker
        .func_wrap(
            HOST_MODULE,
            "print",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<(), Trap> {
                let text = consume_text(&mut caller, ptr, len)?;
                caller.data_mut().console.print(&text);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "print_line",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<(), Trap> {
                let text = consume_text(&mut caller, ptr, len)?;
                caller.data_mut().console.print_line(&text);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<(), Trap> {
                let text = consume_text(&mut caller, ptr, len)?;
                caller.data_mut().console.log(&text);
                Ok(())
            },
        )
        .map_err(BridgeError::load)?;

    linker
        .func_wrap(
            HOST_MODULE,
            "read_line",
            |mut caller: Caller<'_, HostState>, ret: u32| -> Result<(), Trap> {
                let line = caller.data_mut().console.read_line();
                let m = Marshaller::from_caller(&caller).map_err(into_trap)?;
                let buf = m.write_text(&mut caller, &line).map_err(into_trap)?;
                m.return_pair(&mut caller, ret, buf).map_err(into_trap)
            },
        )
        .map_err(BridgeError::load)?;

    Ok(())
}

/// Elementary math passthroughs. Direct scalar forwarding to the host
/// math library; no marshalling, no state.
fn link_math(linker: &mut Linker<HostState>) -> BridgeResult<()> {
    let unary: &[(&str, fn(f64) -> f64)] = &[
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
    ];
    for &(name, op) in unary {
        linker
            .func_wrap(HOST_MODULE, name, move |x: F64| -> F64 {
                F64::from(op(x.to_float()))
            })
            .map_err(BridgeError::load)?;
    }

    linker
        .func_wrap(HOST_MODULE, "atan2", |y: F64, x: F64| -> F64 {
            F64::from(y.to_float().atan2(x.to_float()))
        })
        .map_err(BridgeError::load)?;
    linker
        .func_wrap(HOST_MODULE, "pow", |x: F64, y: F64| -> F64 {
            F64::from(x.to_float().powf(y.to_float()))
        })
        .map_err(BridgeError::load)?;
    linker
        .func_wrap(HOST_MODULE, "fmod", |x: F64, y: F64| -> F64 {
            F64::from(x.to_float() % y.to_float())
        })
        .map_err(BridgeError::load)?;
    Ok(())
}

/// Copy inbound text out of module memory and release the span.
fn consume_text(caller: &mut Caller<'_, HostState>, ptr: u32, len: u32) -> Result<String, Trap> {
    let m = Marshaller::from_caller(caller).map_err(into_trap)?;
    m.read_text(
        &mut *caller,
        TransferBuffer::from_raw_parts(ptr, len, ElemKind::Byte),
    )
    .map_err(into_trap)
}
