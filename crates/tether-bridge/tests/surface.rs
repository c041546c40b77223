//! Capability surface tests: a guest module calls each class of import
//! shim and the host observes the arguments through recording
//! implementations.

use std::cell::RefCell;
use std::rc::Rc;

use wasmi::core::{F32, F64};
use wasmi::{Engine, Extern, Linker, Module, Store, TypedFunc};

use tether_bridge::{
    link_host_surface, Color, ColorRef, Console, Gfx, HostState, MemoryLens, Point, PointRef,
};

const GUEST: &str = r#"
    (module
        (import "host" "new_window" (func $new_window (param i32 i32) (result i32)))
        (import "host" "poll_events" (func $poll_events (param i32 i32)))
        (import "host" "poll_mouse" (func $poll_mouse (param i32 i32)))
        (import "host" "set_line_width" (func $set_line_width (param i32 f32)))
        (import "host" "draw_line" (func $draw_line (param i32 i32 i32 i32)))
        (import "host" "draw_line_list" (func $draw_line_list (param i32 i32 i32 i32 i32 i32)))
        (import "host" "draw_circle" (func $draw_circle (param i32 i32 f32 i32)))
        (import "host" "present" (func $present (param i32)))
        (import "host" "print" (func $print (param i32 i32)))
        (import "host" "print_line" (func $print_line (param i32 i32)))
        (import "host" "read_line" (func $read_line (param i32)))
        (import "host" "log" (func $log (param i32 i32)))
        (import "host" "sin" (func $sin (param f64) (result f64)))
        (import "host" "atan2" (func $atan2 (param f64 f64) (result f64)))
        (memory (export "memory") 1)
        (global $bump (mut i32) (i32.const 4096))
        (global $dealloc_count (mut i32) (i32.const 0))
        (global $last_dealloc_len (mut i32) (i32.const 0))
        (func (export "alloc") (param $n i32) (result i32)
            (local $p i32)
            (local.set $p (global.get $bump))
            (global.set $bump (i32.add (global.get $bump) (local.get $n)))
            (local.get $p))
        (func (export "dealloc") (param $p i32) (param $n i32)
            (global.set $dealloc_count (i32.add (global.get $dealloc_count) (i32.const 1)))
            (global.set $last_dealloc_len (local.get $n)))
        (func (export "dealloc_count") (result i32) (global.get $dealloc_count))
        (func (export "last_dealloc_len") (result i32) (global.get $last_dealloc_len))
        (func (export "open") (result i32)
            (call $new_window (i32.const 640) (i32.const 480)))
        (func (export "sum_events") (param $win i32) (result i32)
            (local $ptr i32) (local $n i32) (local $i i32) (local $sum i32)
            (call $poll_events (i32.const 16) (local.get $win))
            (local.set $ptr (i32.load (i32.const 16)))
            (local.set $n (i32.load (i32.const 20)))
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
                    (local.set $sum
                        (i32.add (local.get $sum)
                            (i32.load (i32.add (local.get $ptr)
                                               (i32.mul (local.get $i) (i32.const 4))))))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)))
            (local.get $sum))
        (func (export "mouse_sum") (param $win i32) (result f32)
            (local $ptr i32) (local $n i32) (local $i i32) (local $sum f32)
            (call $poll_mouse (i32.const 16) (local.get $win))
            (local.set $ptr (i32.load (i32.const 16)))
            (local.set $n (i32.load (i32.const 20)))
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
                    (local.set $sum
                        (f32.add (local.get $sum)
                            (f32.load (i32.add (local.get $ptr)
                                               (i32.mul (local.get $i) (i32.const 4))))))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)))
            (local.get $sum))
        (func (export "say")
            (call $print (i32.const 1024) (i32.const 2))
            (call $print_line (i32.const 1027) (i32.const 5)))
        (func (export "ask") (result i32)
            (call $read_line (i32.const 16))
            (i32.load (i32.const 20)))
        (func (export "line")
            (call $set_line_width (i32.const 3) (f32.const 2.5))
            (call $draw_line (i32.const 3) (i32.const 2048) (i32.const 2056) (i32.const 2064)))
        (func (export "bad_line")
            (call $draw_line (i32.const 3) (i32.const 0) (i32.const 2056) (i32.const 2064)))
        (func (export "note")
            (call $log (i32.const 1040) (i32.const 8)))
        (func (export "polyline")
            (call $draw_line_list (i32.const 4)
                (i32.const 2560) (i32.const 3)
                (i32.const 2576) (i32.const 3)
                (i32.const 2064)))
        (func (export "circle")
            (call $draw_circle (i32.const 5) (i32.const 2048) (f32.const 1.25) (i32.const 2064)))
        (func (export "flip")
            (call $present (i32.const 9)))
        (func (export "sine") (param f64) (result f64)
            (call $sin (local.get 0)))
        (func (export "angle") (param f64 f64) (result f64)
            (call $atan2 (local.get 0) (local.get 1)))
        (data (i32.const 1024) "hi there")
        (data (i32.const 1040) "trace-me")
    )
"#;

#[derive(Default)]
struct GfxLog {
    windows: Vec<(u32, u32)>,
    events: Vec<u32>,
    mouse: Vec<f32>,
    line_widths: Vec<(u32, f32)>,
    lines: Vec<(u32, Point, Point, Color)>,
    line_lists: Vec<(u32, Vec<f32>, Vec<f32>, Color)>,
    circles: Vec<(u32, Point, f32, Color)>,
    presents: Vec<u32>,
}

struct RecordingGfx {
    log: Rc<RefCell<GfxLog>>,
}

impl Gfx for RecordingGfx {
    fn new_window(&mut self, width: u32, height: u32) -> u32 {
        let mut log = self.log.borrow_mut();
        log.windows.push((width, height));
        log.windows.len() as u32
    }

    fn poll_events(&mut self, _window: u32) -> Vec<u32> {
        self.log.borrow().events.clone()
    }

    fn poll_mouse(&mut self, _window: u32) -> Vec<f32> {
        self.log.borrow().mouse.clone()
    }

    fn set_clear_color(&mut self, _window: u32, _color: Color) {}

    fn set_line_width(&mut self, window: u32, width: f32) {
        self.log.borrow_mut().line_widths.push((window, width));
    }

    fn draw_line(&mut self, window: u32, start: Point, end: Point, color: Color) {
        self.log.borrow_mut().lines.push((window, start, end, color));
    }

    fn draw_line_list(&mut self, window: u32, xs: &[f32], ys: &[f32], color: Color) {
        self.log
            .borrow_mut()
            .line_lists
            .push((window, xs.to_vec(), ys.to_vec(), color));
    }

    fn draw_circle(&mut self, window: u32, center: Point, radius: f32, color: Color) {
        self.log
            .borrow_mut()
            .circles
            .push((window, center, radius, color));
    }

    fn present(&mut self, window: u32) {
        self.log.borrow_mut().presents.push(window);
    }
}

#[derive(Default)]
struct ConsoleLog {
    printed: Vec<String>,
    printed_lines: Vec<String>,
    logged: Vec<String>,
    input: String,
}

struct RecordingConsole {
    log: Rc<RefCell<ConsoleLog>>,
}

impl Console for RecordingConsole {
    fn print(&mut self, text: &str) {
        self.log.borrow_mut().printed.push(text.to_owned());
    }

    fn print_line(&mut self, text: &str) {
        self.log.borrow_mut().printed_lines.push(text.to_owned());
    }

    fn read_line(&mut self) -> String {
        self.log.borrow().input.clone()
    }

    fn log(&mut self, text: &str) {
        self.log.borrow_mut().logged.push(text.to_owned());
    }
}

struct Fixture {
    store: Store<HostState>,
    instance: wasmi::Instance,
    lens: MemoryLens,
    gfx: Rc<RefCell<GfxLog>>,
    console: Rc<RefCell<ConsoleLog>>,
}

impl Fixture {
    fn new() -> Self {
        let gfx = Rc::new(RefCell::new(GfxLog::default()));
        let console = Rc::new(RefCell::new(ConsoleLog::default()));

        let wasm = wat::parse_str(GUEST).unwrap();
        let engine = Engine::default();
        let module = Module::new(&engine, &wasm[..]).unwrap();
        let mut linker = Linker::<HostState>::new(&engine);
        link_host_surface(&mut linker).unwrap();

        let state = HostState::new(
            Box::new(RecordingGfx { log: gfx.clone() }),
            Box::new(RecordingConsole {
                log: console.clone(),
            }),
        );
        let mut store = Store::new(&engine, state);
        let instance = linker
            .instantiate(&mut store, &module)
            .unwrap()
            .start(&mut store)
            .unwrap();
        let memory = instance
            .get_export(&store, "memory")
            .and_then(Extern::into_memory)
            .unwrap();

        Self {
            store,
            instance,
            lens: MemoryLens::new(memory),
            gfx,
            console,
        }
    }

    fn typed<P, R>(&self, name: &str) -> TypedFunc<P, R>
    where
        P: wasmi::WasmParams,
        R: wasmi::WasmResults,
    {
        self.instance
            .get_export(&self.store, name)
            .and_then(Extern::into_func)
            .unwrap()
            .typed::<P, R>(&self.store)
            .unwrap()
    }

    fn counter(&mut self, name: &str) -> u32 {
        let f = self.typed::<(), u32>(name);
        f.call(&mut self.store, ()).unwrap()
    }
}

#[test]
fn new_window_forwards_dimensions() {
    let mut fx = Fixture::new();
    let open = fx.typed::<(), u32>("open");
    let id = open.call(&mut fx.store, ()).unwrap();
    assert_eq!(id, 1);
    assert_eq!(fx.gfx.borrow().windows, vec![(640, 480)]);
}

#[test]
fn poll_events_reaches_module_via_return_pair() {
    let mut fx = Fixture::new();
    fx.gfx.borrow_mut().events = vec![10, 20, 12];
    let sum = fx.typed::<u32, u32>("sum_events");
    assert_eq!(sum.call(&mut fx.store, 5).unwrap(), 42);
}

#[test]
fn poll_events_empty_writes_zero_length() {
    let mut fx = Fixture::new();
    let sum = fx.typed::<u32, u32>("sum_events");
    assert_eq!(sum.call(&mut fx.store, 5).unwrap(), 0);
    assert_eq!(fx.lens.read_u32(&fx.store, 20).unwrap(), 0);
}

#[test]
fn poll_mouse_carries_floats() {
    let mut fx = Fixture::new();
    fx.gfx.borrow_mut().mouse = vec![0.25, -1.5, 3.0];
    let sum = fx.typed::<u32, F32>("mouse_sum");
    assert_eq!(sum.call(&mut fx.store, 5).unwrap().to_float(), 1.75);
}

#[test]
fn outbound_text_is_consumed_intact() {
    let mut fx = Fixture::new();
    let say = fx.typed::<(), ()>("say");
    say.call(&mut fx.store, ()).unwrap();
    let log = fx.console.borrow();
    assert_eq!(log.printed, vec!["hi".to_owned()]);
    assert_eq!(log.printed_lines, vec!["there".to_owned()]);
}

#[test]
fn read_line_marshals_host_input_into_module_memory() {
    let mut fx = Fixture::new();
    fx.console.borrow_mut().input = "über-line".to_owned();
    let ask = fx.typed::<(), u32>("ask");
    let len = ask.call(&mut fx.store, ()).unwrap();
    assert_eq!(len, "über-line".len() as u32);

    let ptr = fx.lens.read_u32(&fx.store, 16).unwrap();
    let bytes = fx.lens.read_bytes(&fx.store, ptr, len).unwrap();
    assert_eq!(bytes, "über-line".as_bytes());
}

#[test]
fn draw_line_reconstructs_handles_before_the_host_sees_them() {
    let mut fx = Fixture::new();
    let start = PointRef::from_raw(2048).unwrap();
    start
        .store(&fx.lens, &mut fx.store, Point { x: 1.5, y: 2.5 })
        .unwrap();
    let end = PointRef::from_raw(2056).unwrap();
    end.store(&fx.lens, &mut fx.store, Point { x: 3.5, y: 4.5 })
        .unwrap();
    let color = ColorRef::from_raw(2064).unwrap();
    color
        .store(
            &fx.lens,
            &mut fx.store,
            Color {
                r: 0.125,
                g: 0.25,
                b: 0.5,
            },
        )
        .unwrap();

    let line = fx.typed::<(), ()>("line");
    line.call(&mut fx.store, ()).unwrap();

    let log = fx.gfx.borrow();
    assert_eq!(log.line_widths, vec![(3, 2.5)]);
    let (window, start, end, color) = log.lines[0];
    assert_eq!(window, 3);
    assert_eq!(start, Point { x: 1.5, y: 2.5 });
    assert_eq!(end, Point { x: 3.5, y: 4.5 });
    assert_eq!(
        color,
        Color {
            r: 0.125,
            g: 0.25,
            b: 0.5
        }
    );
}

#[test]
fn null_handle_traps_the_call() {
    let mut fx = Fixture::new();
    let bad = fx.typed::<(), ()>("bad_line");
    let err = bad.call(&mut fx.store, ()).unwrap_err();
    assert!(err.to_string().contains("null"));
    assert!(fx.gfx.borrow().lines.is_empty());
}

#[test]
fn log_text_is_consumed_with_one_release() {
    let mut fx = Fixture::new();
    let note = fx.typed::<(), ()>("note");
    note.call(&mut fx.store, ()).unwrap();
    assert_eq!(fx.console.borrow().logged, vec!["trace-me".to_owned()]);
    assert_eq!(fx.counter("dealloc_count"), 1);
    assert_eq!(fx.counter("last_dealloc_len"), 8);
}

#[test]
fn draw_line_list_borrows_the_coordinate_arrays() {
    let mut fx = Fixture::new();
    let xs = [1.0f32, 2.0, 3.0];
    let ys = [4.0f32, 5.0, 6.0];
    fx.lens.write_f32_array(&mut fx.store, 2560, &xs).unwrap();
    fx.lens.write_f32_array(&mut fx.store, 2576, &ys).unwrap();
    ColorRef::from_raw(2064)
        .unwrap()
        .store(
            &fx.lens,
            &mut fx.store,
            Color {
                r: 0.5,
                g: 0.5,
                b: 1.0,
            },
        )
        .unwrap();

    let polyline = fx.typed::<(), ()>("polyline");
    polyline.call(&mut fx.store, ()).unwrap();

    {
        let log = fx.gfx.borrow();
        let (window, seen_xs, seen_ys, color) = &log.line_lists[0];
        assert_eq!(*window, 4);
        assert_eq!(seen_xs, &xs);
        assert_eq!(seen_ys, &ys);
        assert_eq!(
            *color,
            Color {
                r: 0.5,
                g: 0.5,
                b: 1.0
            }
        );
    }
    // The coordinate spans stay module-owned: borrowing must not release.
    assert_eq!(fx.counter("dealloc_count"), 0);
}

#[test]
fn draw_circle_and_present_forward() {
    let mut fx = Fixture::new();
    PointRef::from_raw(2048)
        .unwrap()
        .store(&fx.lens, &mut fx.store, Point { x: 10.0, y: -3.5 })
        .unwrap();
    ColorRef::from_raw(2064)
        .unwrap()
        .store(
            &fx.lens,
            &mut fx.store,
            Color {
                r: 1.0,
                g: 0.0,
                b: 0.0,
            },
        )
        .unwrap();

    let circle = fx.typed::<(), ()>("circle");
    circle.call(&mut fx.store, ()).unwrap();
    let flip = fx.typed::<(), ()>("flip");
    flip.call(&mut fx.store, ()).unwrap();

    let log = fx.gfx.borrow();
    let (window, center, radius, color) = log.circles[0];
    assert_eq!(window, 5);
    assert_eq!(center, Point { x: 10.0, y: -3.5 });
    assert_eq!(radius, 1.25);
    assert_eq!(
        color,
        Color {
            r: 1.0,
            g: 0.0,
            b: 0.0
        }
    );
    assert_eq!(log.presents, vec![9]);
}

#[test]
fn math_passthroughs_match_the_host_library() {
    let mut fx = Fixture::new();
    let sine = fx.typed::<F64, F64>("sine");
    assert_eq!(
        sine.call(&mut fx.store, F64::from(0.5)).unwrap().to_float(),
        0.5f64.sin()
    );
    let angle = fx.typed::<(F64, F64), F64>("angle");
    assert_eq!(
        angle
            .call(&mut fx.store, (F64::from(1.0), F64::from(-1.0)))
            .unwrap()
            .to_float(),
        1.0f64.atan2(-1.0)
    );
}
