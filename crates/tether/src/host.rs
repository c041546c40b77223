//! Terminal-backed capability implementations.
//!
//! The rendering backend is out of scope for the driver: `TraceGfx`
//! records window/draw activity on stderr instead of rasterizing, which
//! is enough to run graphical scripts headless.

use std::io::{self, BufRead, Write};

use tether_bridge::{Color, Console, Gfx, Point};

/// Console bound to the process's stdin/stdout.
pub struct TermConsole;

impl Console for TermConsole {
    fn print(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }

    fn print_line(&mut self, text: &str) {
        println!("{text}");
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        // EOF yields an empty line; the script decides what that means.
        let _ = io::stdin().lock().read_line(&mut line);
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    fn log(&mut self, text: &str) {
        eprintln!("[guest] {text}");
    }
}

/// Headless graphics backend: hands out sequential window ids and traces
/// every call instead of drawing.
#[derive(Default)]
pub struct TraceGfx {
    next_window: u32,
}

impl Gfx for TraceGfx {
    fn new_window(&mut self, width: u32, height: u32) -> u32 {
        self.next_window += 1;
        eprintln!("tether: window {} ({width}x{height}, headless)", self.next_window);
        self.next_window
    }

    fn poll_events(&mut self, _window: u32) -> Vec<u32> {
        Vec::new()
    }

    fn poll_mouse(&mut self, _window: u32) -> Vec<f32> {
        vec![0.0, 0.0]
    }

    fn set_clear_color(&mut self, window: u32, color: Color) {
        log::debug!("window {window}: clear color {color:?}");
    }

    fn set_line_width(&mut self, window: u32, width: f32) {
        log::debug!("window {window}: line width {width}");
    }

    fn draw_line(&mut self, window: u32, start: Point, end: Point, color: Color) {
        log::debug!("window {window}: line {start:?} -> {end:?} {color:?}");
    }

    fn draw_line_list(&mut self, window: u32, xs: &[f32], ys: &[f32], color: Color) {
        log::debug!(
            "window {window}: line list of {} points {color:?}",
            xs.len().min(ys.len())
        );
    }

    fn draw_circle(&mut self, window: u32, center: Point, radius: f32, color: Color) {
        log::debug!("window {window}: circle at {center:?} r={radius} {color:?}");
    }

    fn present(&mut self, window: u32) {
        log::trace!("window {window}: present");
    }
}
