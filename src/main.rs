use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hins::analysis::{self, DistStats, LedgerViolation, YearDist, YearStats};
use hins::config::SimulationConfig;
use hins::events::SimEvent;
use hins::selection::InsuranceMode;
use hins::simulation::Simulation;

#[derive(Debug, Default)]
struct Args {
    seed: Option<u64>,
    years: Option<u32>,
    mode: Option<InsuranceMode>,
    config: Option<String>,
    output: Option<String>,
    runs: Option<u64>,
    csv: Option<String>,
    quiet: bool,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i).map(String::as_str).ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--seed" => {
                i += 1;
                parsed.seed =
                    Some(value(args, i, flag)?.parse().map_err(|_| "--seed requires a u64")?);
            }
            "--years" => {
                i += 1;
                parsed.years =
                    Some(value(args, i, flag)?.parse().map_err(|_| "--years requires a u32")?);
            }
            "--mode" => {
                i += 1;
                parsed.mode = Some(value(args, i, flag)?.parse::<InsuranceMode>().map_err(|e| e.to_string())?);
            }
            "--config" => {
                i += 1;
                parsed.config = Some(value(args, i, flag)?.to_string());
            }
            "--output" => {
                i += 1;
                parsed.output = Some(value(args, i, flag)?.to_string());
            }
            "--runs" => {
                i += 1;
                let n: u64 = value(args, i, flag)?
                    .parse()
                    .map_err(|_| "--runs requires a positive integer")?;
                if n == 0 {
                    return Err("--runs requires a positive integer".to_string());
                }
                parsed.runs = Some(n);
            }
            "--csv" => {
                i += 1;
                parsed.csv = Some(value(args, i, flag)?.to_string());
            }
            "--quiet" => parsed.quiet = true,
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }
    Ok(parsed)
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("hins: {msg}");
            return ExitCode::from(2);
        }
    };
    init_logging(args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let mut base_config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(Path::new(path)).map_err(|e| e.to_string())?,
        None => SimulationConfig::canonical(),
    };
    if let Some(seed) = args.seed {
        base_config.seed = seed;
    }
    if let Some(years) = args.years {
        base_config.years = years;
    }
    if let Some(mode) = args.mode {
        base_config.mode = mode;
    }

    match args.runs {
        Some(n) => run_many(base_config, n, args),
        None => run_once(base_config, args),
    }
}

fn run_once(config: SimulationConfig, args: &Args) -> Result<(), String> {
    let bounds = config.premium_bounds;
    let mut sim = Simulation::from_config(config).map_err(|e| e.to_string())?;
    let outcome = sim.run();

    // The partial log is still worth keeping when a run aborts.
    let output = args.output.as_deref().unwrap_or("events.ndjson");
    write_ndjson(&sim.log, output)?;
    info!(events = sim.log.len(), path = output, "event log written");
    outcome.map_err(|e| e.to_string())?;

    if !args.quiet {
        print_ledger(&analysis::verify_ledger(&sim.log, &bounds));
        print_year_table(&analysis::analyse(&sim.log));
    }
    Ok(())
}

fn run_many(base_config: SimulationConfig, n: u64, args: &Args) -> Result<(), String> {
    use rayon::prelude::*;

    let start_seed = base_config.seed;
    let all_stats: Vec<Vec<YearStats>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut config = base_config.clone();
            config.seed = start_seed + i;
            let mut sim = Simulation::from_config(config).map_err(|e| e.to_string())?;
            sim.run().map_err(|e| format!("seed {}: {e}", start_seed + i))?;
            Ok(analysis::analyse(&sim.log))
        })
        .collect::<Result<_, String>>()?;
    info!(runs = n, start_seed, "runs complete");

    if let Some(path) = &args.csv {
        write_runs_csv(&all_stats, start_seed, path)?;
    }
    if !args.quiet {
        if n < 2 {
            eprintln!("Warning: Distribution requires >= 2 runs");
        } else {
            print_distributions(&analysis::analyse_distributions(&all_stats), n);
        }
    }
    Ok(())
}

fn write_ndjson(log: &[SimEvent], path: &str) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("failed to create {path}: {e}"))?;
    let mut writer = BufWriter::new(file);
    for e in log {
        serde_json::to_writer(&mut writer, e).map_err(|e| format!("serialize: {e}"))?;
        writeln!(writer).map_err(|e| format!("write {path}: {e}"))?;
    }
    writer.flush().map_err(|e| format!("write {path}: {e}"))
}

fn write_runs_csv(all_stats: &[Vec<YearStats>], start_seed: u64, path: &str) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("failed to create {path}: {e}"))?;
    let mut w = BufWriter::new(file);
    let io = |e: std::io::Error| format!("write {path}: {e}");
    writeln!(w, "seed,year,premiums,reimbursements,loss_ratio,mean_premium,out_of_pocket,uninsured_share,deaths,declined")
        .map_err(io)?;
    for (i, run) in all_stats.iter().enumerate() {
        let seed = start_seed + i as u64;
        for s in run {
            writeln!(
                w,
                "{},{},{:.2},{:.2},{:.6},{:.2},{:.2},{:.6},{},{}",
                seed,
                s.year,
                s.premiums,
                s.reimbursements,
                s.loss_ratio(),
                s.mean_premium(),
                s.out_of_pocket(),
                s.uninsured_share(),
                s.deaths,
                s.declined,
            )
            .map_err(io)?;
        }
    }
    w.flush().map_err(io)
}

fn print_ledger(violations: &[LedgerViolation]) {
    println!("\n=== Ledger invariants ===");
    if violations.is_empty() {
        println!("  All ledger invariants: PASS");
        return;
    }
    println!("  {} violation(s):", violations.len());
    for v in violations {
        println!("    {v}");
    }
}

fn print_year_table(stats: &[YearStats]) {
    if stats.is_empty() {
        return;
    }
    println!("\n=== Year table ===");
    println!(
        "{:>4} | {:>12} | {:>12} | {:>7} | {:>9} | {:>12} | {:>7} | {:>6} | {:>6}",
        "Year", "Premiums", "Reimb", "LossR%", "MeanPrem", "OutOfPocket", "Unins%", "Deaths", "Signed"
    );
    println!("{}", "-".repeat(100));
    for s in stats {
        println!(
            "{:>4} | {:>12.0} | {:>12.0} | {:>6.1}% | {:>9.0} | {:>12.0} | {:>6.1}% | {:>6} | {:>6}",
            s.year,
            s.premiums,
            s.reimbursements,
            s.loss_ratio() * 100.0,
            s.mean_premium(),
            s.out_of_pocket(),
            s.uninsured_share() * 100.0,
            s.deaths,
            s.contracts_signed,
        );
    }
}

fn print_dist_section<F>(title: &str, dists: &[YearDist], scale: f64, extract: F)
where
    F: Fn(&YearDist) -> &DistStats,
{
    println!("\n--- {title} ---");
    println!(
        "{:>4} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9}",
        "Year", "min", "p5", "p50", "p95", "max", "mean", "stddev"
    );
    for yd in dists {
        let ds = extract(yd);
        println!(
            "{:>4} | {:>9.1} | {:>9.1} | {:>9.1} | {:>9.1} | {:>9.1} | {:>9.1} | {:>9.1}",
            yd.year,
            ds.min * scale,
            ds.p5 * scale,
            ds.p50 * scale,
            ds.p95 * scale,
            ds.max * scale,
            ds.mean * scale,
            ds.std_dev * scale,
        );
    }
}

fn print_distributions(dists: &[YearDist], n_runs: u64) {
    println!("\n=== Multi-Run Distribution (N={n_runs} runs) ===");
    print_dist_section("LossR%", dists, 100.0, |yd| &yd.loss_ratio);
    print_dist_section("Mean premium", dists, 1.0, |yd| &yd.mean_premium);
    print_dist_section("Out of pocket", dists, 1.0, |yd| &yd.out_of_pocket);
    print_dist_section("Uninsured%", dists, 100.0, |yd| &yd.uninsured_share);

    println!("\n--- Discrete Counts (p50 | max) ---");
    println!("{:>4} | {:>10} | {:>10} | {:>12} | {:>12}", "Year", "Deaths p50", "Deaths max", "Declined p50", "Declined max");
    for yd in dists {
        println!(
            "{:>4} | {:>10} | {:>10} | {:>12} | {:>12}",
            yd.year, yd.deaths.p50, yd.deaths.max, yd.declined.p50, yd.declined.max
        );
    }
}
