//! `cshm` CLI: `analyze` one structure or `batch` many, against the
//! reference library shipped in [`cshm::reference_library`]. File parsing
//! lives here, not in the library (SPEC_FULL.md §6) — this is a minimal
//! whitespace/XYZ reader sufficient to drive the worked examples, not a
//! general structure-format parser.

use clap::{Args, Parser, Subcommand};
use cshm::{
    coordination, Analyzer, AnalysisResult, Atom, BatchItem, CancelToken, Mode, RunConfig, ScaleMode, Structure,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cshm", about = "Continuous Shape Measure engine for coordination polyhedra")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze the coordination sphere of one center atom in one structure.
    Analyze(AnalyzeArgs),
    /// Analyze one center atom across many structures in parallel.
    Batch(BatchArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Path to a minimal XYZ file.
    file: PathBuf,
    /// Element symbol of the center atom (first match used). Defaults to
    /// the first atom in the file.
    #[arg(long)]
    metal: Option<String>,
    /// Fixed coordination radius in Angstrom. Mutually exclusive with
    /// `--target-cn`; one of the two is required.
    #[arg(long)]
    radius: Option<f64>,
    /// Auto-search for a radius yielding this coordination number.
    #[arg(long)]
    target_cn: Option<usize>,
    #[arg(long, value_enum, default_value_t = Mode::Default)]
    mode: Mode,
    #[arg(long)]
    flexible: bool,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Write JSON to this path instead of printing a human-readable table.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct BatchArgs {
    files: Vec<PathBuf>,
    #[arg(long)]
    metal: Option<String>,
    #[arg(long)]
    radius: Option<f64>,
    #[arg(long)]
    target_cn: Option<usize>,
    #[arg(long, value_enum, default_value_t = Mode::Default)]
    mode: Mode,
    #[arg(long)]
    flexible: bool,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Exit codes (SPEC_FULL.md §6): 0 success, 2 input/file error, 3 analysis
/// could not produce a ranking, 4 cancelled, 1 unexpected internal error.
const EXIT_OK: i32 = 0;
const EXIT_INPUT: i32 = 2;
const EXIT_ANALYSIS: i32 = 3;
const EXIT_CANCELLED: i32 = 4;
const EXIT_INTERNAL: i32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Batch(args) => run_batch(args),
    };
    std::process::exit(code);
}

fn read_xyz(path: &Path) -> Result<Structure, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut lines = text.lines();

    let count: usize = lines
        .next()
        .ok_or("empty file")?
        .trim()
        .parse()
        .map_err(|_| "first line must be an atom count".to_string())?;
    let _comment = lines.next();

    let mut atoms = Vec::with_capacity(count);
    for (i, line) in lines.enumerate() {
        if atoms.len() == count {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(format!("line {}: expected '<element> x y z'", i + 3));
        }
        let parse = |s: &str| s.parse::<f64>().map_err(|_| format!("line {}: bad coordinate", i + 3));
        let pos = cshm::linalg::Vec3::new(parse(fields[1])?, parse(fields[2])?, parse(fields[3])?);
        atoms.push(Atom { element: fields[0].to_string(), pos });
    }

    if atoms.len() != count {
        return Err(format!("expected {count} atoms, found {}", atoms.len()));
    }

    let mut structure = Structure::new(path.file_stem().and_then(|s| s.to_str()).unwrap_or("structure"), atoms);
    structure.source = Some(path.display().to_string());
    Ok(structure)
}

fn find_center(structure: &Structure, metal: Option<&str>) -> Result<usize, String> {
    match metal {
        Some(symbol) => structure
            .atoms
            .iter()
            .position(|a| a.element.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| format!("no atom with element '{symbol}' found")),
        None => {
            if structure.atoms.is_empty() {
                Err("structure has no atoms".to_string())
            } else {
                Ok(0)
            }
        }
    }
}

fn select_sphere(structure: &Structure, center: usize, radius: Option<f64>, target_cn: Option<usize>) -> Result<Vec<cshm::CoordAtom>, String> {
    match (radius, target_cn) {
        (Some(r), _) => coordination::select_by_radius(structure, center, r).map_err(|e| e.message()),
        (None, Some(cn)) => coordination::select_by_target_cn(structure, center, cn).map(|(atoms, _, _)| atoms).map_err(|e| e.message()),
        (None, None) => Err("one of --radius or --target-cn is required".to_string()),
    }
}

fn build_config(mode: Mode, flexible: bool, seed: u64, timeout_secs: Option<u64>) -> RunConfig {
    RunConfig {
        mode,
        flexible,
        seed,
        timeout: timeout_secs.map(Duration::from_secs),
        scale_mode: ScaleMode::Optimal,
    }
}

fn emit(result: &AnalysisResult, out: Option<&Path>) -> Result<(), String> {
    match out {
        Some(path) => {
            let json = serde_json::to_string_pretty(result).map_err(|e| e.to_string())?;
            std::fs::write(path, json).map_err(|e| e.to_string())
        }
        None => {
            print_human(result);
            Ok(())
        }
    }
}

fn print_human(result: &AnalysisResult) {
    println!("structure: {}  center atom: {}  CN: {}", result.structure_name, result.center_index, result.cn);
    if let Some(err) = &result.error {
        println!("  error: {err}");
        return;
    }
    for (rank, g) in result.rankings.iter().enumerate() {
        let marker = if Some(rank) == result.best_index { "*" } else { " " };
        println!("  {marker} {:<12} {:<28} S = {:8.4}", g.reference_code, g.reference_name, g.shape.measure);
        if let Some(flex) = &g.flexible {
            println!("      flexible: S = {:8.4} (delta {:.4})", flex.flexible_measure, flex.delta);
        }
    }
    if let Some(q) = &result.quality {
        println!("  overall score: {:.2}", q.overall_score);
    }
}

fn exit_code_for(result: &AnalysisResult) -> i32 {
    match result.error.as_deref() {
        None => EXIT_OK,
        Some("cancelled") => EXIT_CANCELLED,
        Some(_) => EXIT_ANALYSIS,
    }
}

fn run_analyze(args: AnalyzeArgs) -> i32 {
    let structure = match read_xyz(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_INPUT;
        }
    };
    let center = match find_center(&structure, args.metal.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_INPUT;
        }
    };
    let atoms = match select_sphere(&structure, center, args.radius, args.target_cn) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_INPUT;
        }
    };

    let config = build_config(args.mode, args.flexible, args.seed, args.timeout_secs);
    let cancel = CancelToken::new();
    let analyzer = Analyzer::new();

    match analyzer.analyze(structure.name.clone(), center, &atoms, &config, &cancel, |_, _| {}) {
        Ok(result) => {
            let code = exit_code_for(&result);
            if let Err(e) = emit(&result, args.out.as_deref()) {
                eprintln!("error writing output: {e}");
                return EXIT_INTERNAL;
            }
            code
        }
        Err(e) => {
            eprintln!("internal error: {e}");
            EXIT_INTERNAL
        }
    }
}

fn run_batch(args: BatchArgs) -> i32 {
    let mut items = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let structure = match read_xyz(file) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return EXIT_INPUT;
            }
        };
        let center = match find_center(&structure, args.metal.as_deref()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return EXIT_INPUT;
            }
        };
        let atoms = match select_sphere(&structure, center, args.radius, args.target_cn) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return EXIT_INPUT;
            }
        };
        items.push(BatchItem { structure_name: structure.name.clone(), center_index: center, atoms });
    }

    let config = build_config(args.mode, args.flexible, args.seed, args.timeout_secs);
    let cancel = CancelToken::new();
    let result = cshm::run_batch(&items, &config, &cancel, |p| {
        tracing::info!(current = p.current, total = p.total, structure = %p.structure_name, "progress");
    });

    match args.out {
        Some(path) => {
            let json = match serde_json::to_string_pretty(&result) {
                Ok(j) => j,
                Err(e) => {
                    eprintln!("error serializing result: {e}");
                    return EXIT_INTERNAL;
                }
            };
            if let Err(e) = std::fs::write(&path, json) {
                eprintln!("error writing output: {e}");
                return EXIT_INTERNAL;
            }
        }
        None => {
            for r in result.results.iter().flatten() {
                print_human(r);
            }
        }
    }

    match result.state {
        cshm::BatchState::Complete => EXIT_OK,
        cshm::BatchState::Cancelled => EXIT_CANCELLED,
        cshm::BatchState::Error => EXIT_ANALYSIS,
        cshm::BatchState::Idle | cshm::BatchState::Running => EXIT_INTERNAL,
    }
}
