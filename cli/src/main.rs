//! chainretry CLI: inspect and simulate retry policies from the terminal.
//!
//! Usage:
//! ```bash
//! # Print the delays a policy would sleep between attempts
//! chainretry schedule --config policy.json
//!
//! # Run 20 calls that each fail twice with a timeout, then report metrics
//! chainretry simulate --config policy.json --calls 20 --fail-first 2 --error-kind timeout
//! ```

use std::env;
use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};

use chainretry_core::{Classify, MetricsRegistry, RetryConfig};
use chainretry_observability::{init_tracing, log_registry, LogConfig, MetricsReport};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let log_config = LogConfig {
        json: args.iter().any(|a| a == "--json-logs"),
        ..LogConfig::with_level(parse_flag(&args, "--log-level").unwrap_or_else(|| "warn".into()))
    };
    // Only fails if a subscriber is already installed.
    let _ = init_tracing(&log_config);

    let result = match args[1].as_str() {
        "schedule" => cmd_schedule(&args[2..]),
        "simulate" => cmd_simulate(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainretry {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainretry {}", env!("CARGO_PKG_VERSION"));
    println!("Inspect and simulate retry policies\n");
    println!("USAGE:");
    println!("    chainretry <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    schedule   Print the backoff delays of a configured policy");
    println!("    simulate   Run a flaky operation through a policy and print metrics");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("SCHEDULE FLAGS:");
    println!("    --config <FILE>      Policy config (JSON)  [required]");
    println!("    --attempts <N>       Attempts to plan for  [default: max_attempts]\n");
    println!("SIMULATE FLAGS:");
    println!("    --config <FILE>      Policy config (JSON)  [required]");
    println!("    --calls <N>          Number of calls       [default: 10]");
    println!("    --fail-first <K>     Failing attempts per call before success  [default: 1]");
    println!("    --error-kind <KIND>  Kind of the simulated error  [default: timeout]\n");
    println!("GLOBAL FLAGS:");
    println!("    --log-level <LEVEL>  trace | debug | info | warn | error  [default: warn]");
    println!("    --json-logs          Emit logs as JSON");
}

/// Error raised by the simulated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SimulatedError {
    kind: String,
    attempt: u32,
}

impl fmt::Display for SimulatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated {} on attempt {}", self.kind, self.attempt)
    }
}

impl std::error::Error for SimulatedError {}

impl Classify for SimulatedError {
    fn kind(&self) -> &str {
        &self.kind
    }
}

fn load_config(args: &[String]) -> Result<RetryConfig, String> {
    let path = parse_flag(args, "--config").ok_or("--config is required")?;
    RetryConfig::from_file(&path).map_err(|e| format!("{path}: {e}"))
}

fn cmd_schedule(args: &[String]) -> Result<(), String> {
    let config = load_config(args)?;
    let policy = config
        .into_policy::<serde_json::Value, SimulatedError>()
        .map_err(|e| e.to_string())?;
    let attempts = match parse_flag(args, "--attempts") {
        Some(n) => parse_number(&n, "--attempts")?,
        None => policy.max_attempts(),
    };

    println!("Policy: {config}");
    let mut total = 0.0;
    for (i, delay) in policy.delay_schedule(attempts).iter().enumerate() {
        total += delay.as_secs_f64();
        println!(
            "  after attempt {:>3}: sleep {:>9.3}s  (elapsed {:.3}s)",
            i + 1,
            delay.as_secs_f64(),
            total
        );
    }
    println!("  attempt {attempts} is the last");
    Ok(())
}

async fn cmd_simulate(args: &[String]) -> Result<(), String> {
    let config = load_config(args)?;
    let calls: u32 = match parse_flag(args, "--calls") {
        Some(n) => parse_number(&n, "--calls")?,
        None => 10,
    };
    let fail_first: u32 = match parse_flag(args, "--fail-first") {
        Some(n) => parse_number(&n, "--fail-first")?,
        None => 1,
    };
    let kind = parse_flag(args, "--error-kind").unwrap_or_else(|| "timeout".into());

    let registry = MetricsRegistry::new();
    let policy = config
        .into_registered_policy::<u32, SimulatedError>(&registry)
        .map_err(|e| e.to_string())?;

    tracing::info!(policy = policy.name(), calls, fail_first, kind = %kind, "simulating");

    let mut failures = 0;
    for _ in 0..calls {
        let attempt = AtomicU32::new(0);
        let result = policy
            .execute_async(|| {
                let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
                let kind = kind.clone();
                async move {
                    if n > fail_first {
                        Ok(n)
                    } else {
                        Err(SimulatedError { kind, attempt: n })
                    }
                }
            })
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "call failed");
            failures += 1;
        }
    }

    log_registry(&registry);
    let report = MetricsReport::new(policy.name(), policy.metrics().snapshot());
    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
    );
    if failures > 0 {
        eprintln!("{failures} of {calls} calls failed");
    }
    Ok(())
}

fn parse_number(value: &str, flag: &str) -> Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} expects a non-negative integer, got `{value}`"))
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
