//! Command-line driver for the weft threading runtime.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, bail, ensure};
use clap::{Parser, Subcommand};
use weft_runtime::intrinsics::{atomic_wait_i32, atomic_wake, spawn_thread};
use weft_runtime::{
    Context, Fault, Function, Instance, Runtime, RuntimeConfig, Table, WAKE_ALL, WaitOutcome,
};

#[derive(Parser)]
#[command(name = "weft")]
#[command(author, version, about = "Exercise the weft wait/wake and thread runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Name prefix for guest threads
    #[arg(long, global = true, default_value = "weft-guest")]
    thread_prefix: String,

    /// Stack size for guest threads, in KiB
    #[arg(long, global = true)]
    stack_kib: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pass a token around a ring of threads with atomic wait and wake
    Stress {
        /// Number of threads in the ring
        #[arg(short, long, default_value = "4")]
        threads: u32,

        /// Number of times the token goes around the ring
        #[arg(short, long, default_value = "1000")]
        rounds: u32,

        /// Timeout of each wait in milliseconds (NaN or inf waits forever)
        #[arg(long, default_value = "inf")]
        timeout_ms: f64,
    },

    /// Spawn guest threads that count up a shared cell and wake the main thread
    Spawn {
        /// Number of guest threads
        #[arg(short, long, default_value = "8")]
        threads: u32,

        /// Make every guest entry fault so the error handler runs
        #[arg(long)]
        fault: bool,

        /// Give up waiting for the guest threads after this many seconds
        #[arg(long, default_value = "30")]
        join_timeout_secs: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    // RUST_LOG overrides the -v level.
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = RuntimeConfig::default().with_thread_name_prefix(cli.thread_prefix);
    if let Some(kib) = cli.stack_kib {
        config = config.with_thread_stack_size(kib.saturating_mul(1024));
    }

    match cli.command {
        Commands::Stress {
            threads,
            rounds,
            timeout_ms,
        } => stress(config, threads, rounds, timeout_ms),
        Commands::Spawn {
            threads,
            fault,
            join_timeout_secs,
        } => spawn(config, threads, fault, Duration::from_secs(join_timeout_secs)),
    }
}

/// A runtime with one memory and one table, and a context on it.
fn guest(config: RuntimeConfig) -> (Arc<Runtime>, Context, Arc<Table>) {
    let runtime = Runtime::with_config(config);
    let mut instance = Instance::new();
    instance.add_memory(runtime.new_memory());
    let table = Arc::new(Table::new(0));
    instance.add_table(Arc::clone(&table));
    let ctx = Context::new(Arc::clone(&runtime), instance);
    (runtime, ctx, table)
}

// ---------------------------------------------------------------------------
// stress
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Outcomes {
    woken: AtomicU64,
    not_equal: AtomicU64,
    timed_out: AtomicU64,
}

impl Outcomes {
    fn record(&self, code: i32) {
        let counter = if code == WaitOutcome::Woken.code() {
            &self.woken
        } else if code == WaitOutcome::NotEqual.code() {
            &self.not_equal
        } else {
            &self.timed_out
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn stress(config: RuntimeConfig, threads: u32, rounds: u32, timeout_ms: f64) -> anyhow::Result<()> {
    ensure!(threads >= 2, "a ring needs at least two threads");
    let total = i32::try_from(u64::from(threads) * u64::from(rounds))
        .context("threads * rounds does not fit the token counter")?;

    let (runtime, ctx, _) = guest(config);
    let outcomes = Outcomes::default();
    let start = Instant::now();

    thread::scope(|scope| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..threads)
            .map(|position| {
                let ctx = ctx.fork();
                let outcomes = &outcomes;
                thread::Builder::new()
                    .name(format!("ring-{position}"))
                    .spawn_scoped(scope, move || {
                        ring_worker(&ctx, position as i32, threads as i32, total, timeout_ms, outcomes)
                    })
            })
            .collect::<Result<_, _>>()
            .context("failed to start ring thread")?;

        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(_) => bail!("ring thread panicked"),
            }
        }
        Ok(())
    })?;

    let elapsed = start.elapsed();
    println!(
        "passed token {total} times across {threads} threads in {:.2?}",
        elapsed
    );
    println!(
        "waits: {} woken, {} not-equal, {} timed out",
        outcomes.woken.load(Ordering::Relaxed),
        outcomes.not_equal.load(Ordering::Relaxed),
        outcomes.timed_out.load(Ordering::Relaxed),
    );

    let leftover = runtime.wait_lists().len();
    ensure!(leftover == 0, "{leftover} wait lists left in the registry");
    println!("wait list registry drained");
    Ok(())
}

/// Take the token whenever the counter lands on this thread's position, and
/// pass it on by incrementing the counter and waking everyone.
fn ring_worker(
    ctx: &Context,
    position: i32,
    threads: i32,
    total: i32,
    timeout_ms: f64,
    outcomes: &Outcomes,
) -> Result<(), Fault> {
    let cell = ctx.memory(0)?.atomic_i32(0)?;
    let mut turn = position;
    while turn < total {
        loop {
            let current = cell.load(Ordering::SeqCst);
            if current == turn {
                break;
            }
            outcomes.record(atomic_wait_i32(ctx, 0, 0, current, timeout_ms)?);
        }
        cell.store(turn + 1, Ordering::SeqCst);
        atomic_wake(ctx, 0, 0, WAKE_ALL)?;
        turn += threads;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// spawn
// ---------------------------------------------------------------------------

const COUNTER: u32 = 0;
const HANDLED: u32 = 4;

fn spawn(config: RuntimeConfig, threads: u32, fault: bool, join_timeout: Duration) -> anyhow::Result<()> {
    let expected = i32::try_from(threads).context("too many threads")?;
    let (runtime, ctx, table) = guest(config);

    let entry = table.push(Function::thread_entry("count", move |ctx, arg| {
        if fault {
            return Err(Fault::trap(format!("guest {arg} gave up")));
        }
        bump(ctx, COUNTER)
    }));
    let error = table.push(Function::thread_entry("recover", |ctx, _| {
        ctx.memory(0)?.atomic_i32(HANDLED)?.fetch_add(1, Ordering::SeqCst);
        bump(ctx, COUNTER)
    }));

    for argument in 0..expected {
        spawn_thread(&ctx, entry, argument, error, 0)
            .with_context(|| format!("failed to spawn guest thread {argument}"))?;
    }
    tracing::info!(threads, "spawned guest threads");

    let counter = ctx.memory(0)?.atomic_i32(COUNTER)?;
    loop {
        let seen = counter.load(Ordering::SeqCst);
        if seen >= expected {
            break;
        }
        atomic_wait_i32(&ctx, 0, COUNTER, seen, 100.0)?;
    }

    ensure!(
        runtime.threads().join_all_timeout(join_timeout),
        "{} guest threads still running after {join_timeout:?}",
        runtime.threads().live_count()
    );

    let handled = ctx.memory(0)?.load_i32(HANDLED)?;
    println!(
        "{} guest threads finished, {handled} through the error handler",
        runtime.threads().total_spawned()
    );
    Ok(())
}

fn bump(ctx: &Context, offset: u32) -> Result<(), Fault> {
    ctx.memory(0)?.atomic_i32(offset)?.fetch_add(1, Ordering::SeqCst);
    atomic_wake(ctx, 0, offset, WAKE_ALL).map(|_| ())
}
