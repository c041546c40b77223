use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use tether_bridge::{Bridge, EvalOutcome};

mod host;
mod logger;
use host::{TermConsole, TraceGfx};

/// tether — run a sandboxed Wasm interpreter module from the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Interpreter module binary (.wasm)
    module: PathBuf,

    /// Script to evaluate; without it, start a read-eval-print loop
    script: Option<PathBuf>,

    /// Delay between resume steps of a suspended evaluation, in ms
    #[arg(long, default_value_t = 0)]
    frame_delay_ms: u64,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let wasm_bytes = fs::read(&cli.module)
        .with_context(|| format!("failed to read {}", cli.module.display()))?;
    let mut bridge = Bridge::initialize(&wasm_bytes, Box::new(TraceGfx::default()), Box::new(TermConsole))
        .context("failed to initialize bridge")?;
    eprintln!("tether: loaded {}", cli.module.display());

    if let Some(script) = &cli.script {
        let source = fs::read_to_string(script)
            .with_context(|| format!("failed to read {}", script.display()))?;
        let result = run_to_completion(&mut bridge, &source, cli.frame_delay_ms)?;
        println!("{result}");
    } else {
        repl(&mut bridge, cli.frame_delay_ms)?;
    }

    Ok(())
}

/// Evaluate `source`, driving the resume loop until the module reports
/// completion.
fn run_to_completion(bridge: &mut Bridge, source: &str, frame_delay_ms: u64) -> Result<String> {
    match bridge.evaluate(source).context("evaluation failed")? {
        EvalOutcome::Complete(result) => Ok(result),
        EvalOutcome::Suspended => {
            loop {
                if bridge.resume().context("resume failed")? {
                    break;
                }
                if frame_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(frame_delay_ms));
                }
            }
            Ok(bridge.last_result().unwrap_or_default().to_string())
        }
    }
}

/// Line-at-a-time read-eval-print loop on stdin.
fn repl(bridge: &mut Bridge, frame_delay_ms: u64) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(()); // EOF
        }
        let source = line.trim();
        if source.is_empty() {
            continue;
        }
        match run_to_completion(bridge, source, frame_delay_ms) {
            Ok(result) => println!("{result}"),
            Err(err) => {
                // A failed boundary call leaves the controller wedged;
                // reset so the next line starts from idle.
                eprintln!("tether: {err:#}");
                bridge.reset().context("reset failed")?;
            }
        }
    }
}
