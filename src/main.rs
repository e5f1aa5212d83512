//! Solana Vanity Keypair Search CLI
//!
//! Usage:
//!   pow-vanity search                  # Find a PoW address ("pow" + ID)
//!   pow-vanity search -s gg -n 5       # Find 5 addresses starting with "gg"
//!   pow-vanity stdio                   # JSON-lines requests on stdin
//!   pow-vanity register 1029           # Register address of PoW ID 1029

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{never, select};
use tracing_subscriber::EnvFilter;

use pow_vanity::codec::{decode_pow, example_pow, split_pow, ProgramRegisters, RegisterDerivation};
use pow_vanity::config::{
    validate_anchor, Command, ConfigError, DecodeArgs, ExampleArgs, RegisterArgs, SearchArgs,
    StdioArgs,
};
use pow_vanity::crypto::{DeriveError, GenerationError};
use pow_vanity::worker::{Outbound, SearchError, SearchEvent, SearchRequest};
use pow_vanity::{Config, MatchResult, SearchCoordinator, SearchHandle};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Search(#[from] SearchError),

    #[error("Derivation failed: {0}")]
    Derive(#[from] DeriveError),

    #[error("Key generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Error setting Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' is not a PoW address")]
    NotPow(String),

    #[error("All workers retired, search cannot continue")]
    AllWorkersRetired,
}

fn main() {
    init_tracing();
    let config = Config::parse();

    let result = match config.command {
        Command::Search(args) => run_search(args),
        Command::Stdio(args) => run_stdio(args),
        Command::Decode(args) => run_decode(args),
        Command::Register(args) => run_register(args),
        Command::Example(args) => run_example(args),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for results.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_search(args: SearchArgs) -> Result<(), CliError> {
    args.validate()?;
    let registers = args.pow.registers()?;

    let coordinator = SearchCoordinator::new();
    let handle = coordinator.start(args.search_options())?;

    if !args.json {
        let pattern = handle.pattern();
        println!("Solana Vanity Keypair Search");
        println!("============================");
        println!("Criteria:   {}", pattern.criteria());
        println!("Difficulty: {}", pattern.difficulty_description());
        println!("Workers:    {}", handle.num_workers());
        println!("Batch size: {}", handle.batch_size());
        println!("Target:     {} keypair(s)", args.count);
        println!();
        println!("Searching... (Press Ctrl+C to stop)\n");
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc_handler(interrupted.clone())?;

    let report_interval = Duration::from_secs(args.report_interval.max(1));
    let mut found = 0;
    let mut failed = false;

    loop {
        match handle.wait_for_match(report_interval) {
            Some(result) => {
                found += 1;
                if args.json {
                    write_line(&result.to_outbound())?;
                } else {
                    print_match(&result, found, &args.pow.prefix, &registers)?;
                }

                if args.count > 0 && found >= args.count {
                    if !args.json {
                        println!("\nTarget reached! Found {} keypair(s).", found);
                    }
                    break;
                }
            }
            None if !args.json => print_progress(&handle),
            None => {}
        }

        for event in handle.events().try_iter() {
            if args.json {
                write_line(&event.to_outbound())?;
            }
            if event == SearchEvent::Failed {
                failed = true;
            }
        }

        // The flag is set before the event is queued behind lagging progress.
        if !failed && handle.is_failed() {
            if args.json {
                write_line(&SearchEvent::Failed.to_outbound())?;
            }
            failed = true;
        }

        if failed {
            break;
        }

        if interrupted.load(Ordering::Relaxed) {
            if !args.json {
                println!("\nStopped by user.");
            }
            break;
        }
    }

    coordinator.stop(&handle)?;

    if !args.json {
        println!("\n--- Final Statistics ---");
        println!("Total keys generated: {}", format_number(handle.total_keys()));
        println!("Total matches found:  {}", handle.total_matches());
        println!("Time elapsed:         {:.2}s", handle.elapsed().as_secs_f64());
        println!(
            "Average speed:        {}/s",
            format_number(handle.keys_per_second() as u64)
        );
    }

    if failed {
        return Err(CliError::AllWorkersRetired);
    }
    Ok(())
}

/// Serves one session at a time; each request line replaces the running one.
fn run_stdio(args: StdioArgs) -> Result<(), CliError> {
    args.validate()?;

    let coordinator = SearchCoordinator::new();
    let mut current: Option<(SearchHandle, JoinHandle<()>)> = None;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: SearchRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed request");
                write_line(&Outbound::Error(format!("invalid request: {}", e)))?;
                continue;
            }
        };

        let (start, end) = request.criteria.anchors();
        let checked = validate_anchor("Start", start).and_then(|_| validate_anchor("End", end));
        if let Err(e) = checked {
            write_line(&Outbound::Error(e.to_string()))?;
            continue;
        }
        if request.count == 0 {
            write_line(&Outbound::Error(SearchError::InvalidBatchSize.to_string()))?;
            continue;
        }

        if let Some((handle, printer)) = current.take() {
            coordinator.stop(&handle)?;
            let _ = printer.join();
        }

        match coordinator.start(args.search_options(request)) {
            Ok(handle) => {
                let printer = spawn_printer(&handle)?;
                current = Some((handle, printer));
            }
            Err(e) => write_line(&Outbound::Error(e.to_string()))?,
        }
    }

    tracing::debug!("Input closed");
    if let Some((handle, printer)) = current.take() {
        coordinator.stop(&handle)?;
        let _ = printer.join();
    }
    Ok(())
}

/// Streams a session's matches and events to stdout until both channels close.
fn spawn_printer(handle: &SearchHandle) -> io::Result<JoinHandle<()>> {
    let matches = handle.matches().clone();
    let events = handle.events().clone();

    thread::Builder::new()
        .name("stdio-printer".into())
        .spawn(move || {
            let mut matches_open = true;
            let mut events_open = true;

            while matches_open || events_open {
                let match_rx = if matches_open { matches.clone() } else { never() };
                let event_rx = if events_open { events.clone() } else { never() };

                let written = select! {
                    recv(match_rx) -> msg => match msg {
                        Ok(result) => write_line(&result.to_outbound()),
                        Err(_) => {
                            matches_open = false;
                            Ok(())
                        }
                    },
                    recv(event_rx) -> msg => match msg {
                        Ok(event) => write_line(&event.to_outbound()),
                        Err(_) => {
                            events_open = false;
                            Ok(())
                        }
                    },
                };

                if let Err(e) = written {
                    tracing::warn!(error = %e, "Failed to write to stdout");
                    break;
                }
            }
        })
}

fn run_decode(args: DecodeArgs) -> Result<(), CliError> {
    args.pow.validate()?;
    let registers = args.pow.registers()?;

    let parts = split_pow(&args.address, &args.pow.prefix)
        .ok_or_else(|| CliError::NotPow(args.address.clone()))?;
    let id = parts.id().ok_or_else(|| CliError::NotPow(args.address.clone()))?;
    let (register, bump) = registers.register_with_bump(id)?;

    println!("Prefix:   {}", parts.prefix);
    println!("PoW ID:   {}", id);
    println!("Rest:     {}", parts.suffix);
    println!("Register: {} (bump {})", register, bump);
    Ok(())
}

fn run_register(args: RegisterArgs) -> Result<(), CliError> {
    args.pow.validate()?;
    let registers = args.pow.registers()?;

    let (register, bump) = registers.register_with_bump(args.id)?;
    println!("Program:        {}", registers.program_id());
    println!("Mint authority: {}", registers.mint_authority()?);
    println!("PoW ID:         {}", args.id);
    println!("Register:       {} (bump {})", register, bump);
    Ok(())
}

fn run_example(args: ExampleArgs) -> Result<(), CliError> {
    args.pow.validate()?;

    for _ in 0..args.count.max(1) {
        println!("{}", example_pow(&args.pow.prefix)?);
    }
    Ok(())
}

fn print_match(
    result: &MatchResult,
    index: usize,
    prefix: &str,
    registers: &ProgramRegisters,
) -> Result<(), CliError> {
    println!("=== Match #{} ===", index);
    println!("Address:  {}", result.address);
    if let Some(id) = decode_pow(&result.address, prefix) {
        println!("PoW ID:   {}", id);
        println!("Register: {}", registers.derive_register(id)?);
    }
    println!("Keypair:  {}", serde_json::to_string(&result.keypair.to_vec())?);
    println!("Worker:   {}", result.worker_id);
    println!();
    Ok(())
}

fn print_progress(handle: &SearchHandle) {
    let keys = handle.total_keys();
    let rate = handle.keys_per_second();
    let elapsed = handle.elapsed().as_secs();

    println!(
        "[{:>4}s] Generated {} keys ({}/s)",
        elapsed,
        format_number(keys),
        format_number(rate as u64)
    );
}

/// Writes one JSON object per line and flushes, so readers see it at once.
fn write_line(message: &Outbound) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, message)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn ctrlc_handler(stop_flag: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::Relaxed);
    })
}
