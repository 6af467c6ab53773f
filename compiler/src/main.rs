use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value as Json};
use sirs_runtime::{Algorithm, CancelToken, Options, Registry};
use sirsc::codegen::CodegenOptions;
use sirsc::diag::{has_errors, Phase};
use sirsc::interp::{run_entry, Limits};
use sirsc::json_value;
use sirsc::model::{self, ModelDensity};
use sirsc::opt::OptLevel;
use sirsc::pass::PassId;
use sirsc::pipeline::{compute_provenance, run_pipeline, CompilationState, CompileOptions};
use sirsc::typeck::CheckOptions;
use sirsc::types::{WideningPolicy, F64};
use sirsc::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Canonical re-serialization of the parsed document
    Ast,
    /// Function signatures and expression types
    Typed,
    /// Core IR after optimization
    Cir,
    /// Rust source against sirs-runtime
    Rust,
    /// Execute the entry function with the reference interpreter
    Run,
    /// Treat the entry function as a log density and run inference
    Infer,
    /// Provenance manifest
    BuildInfo,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Widening {
    SameCategory,
    Strict,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AlgorithmArg {
    Mh,
    Amh,
    Hmc,
    Vi,
}

#[derive(Parser, Debug)]
#[command(
    name = "sirsc",
    version,
    about = "SIRS compiler — compiles JSON structured-IR programs to Rust and runs probabilistic models"
)]
struct Cli {
    /// Input document (`-` reads stdin)
    source: PathBuf,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Rust)]
    emit: EmitStage,

    /// Optimization level: 0, 1 or 2
    #[arg(short = 'O', long = "opt-level", default_value_t = OptLevel::O2)]
    opt_level: OptLevel,

    /// Implicit numeric widening policy
    #[arg(long, value_enum, default_value_t = Widening::SameCategory)]
    widening: Widening,

    /// Entry function (default: `main`, or `model` for --emit infer)
    #[arg(long)]
    entry: Option<String>,

    /// Emit a module without `fn main`
    #[arg(long)]
    no_main: bool,

    /// Session / inference seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// JSON array of entry arguments for --emit run (`-` reads stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Interpreter step budget for --emit run
    #[arg(long, default_value_t = sirsc::interp::DEFAULT_FUEL)]
    fuel: u64,

    /// Inference algorithm
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Amh)]
    algorithm: AlgorithmArg,

    /// Proposal or leapfrog step size (algorithm default if unset)
    #[arg(long)]
    step_size: Option<f64>,

    #[arg(long, default_value_t = 4)]
    chains: usize,

    /// Retained draws per chain
    #[arg(long, default_value_t = 1000)]
    samples: usize,

    #[arg(long, default_value_t = 500)]
    warmup: usize,

    #[arg(long, default_value_t = 1)]
    thin: usize,

    /// Include raw chains in the inference report
    #[arg(long)]
    with_chains: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        for d in e.diagnostics() {
            eprintln!("sirsc: {}", d);
        }
        eprintln!("sirsc: error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "sirsc=debug,sirs_runtime=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_path(path: &Path) -> Result<String, CompileError> {
    let io = |source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path == Path::new("-") {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s).map_err(io)?;
        Ok(s)
    } else {
        std::fs::read_to_string(path).map_err(io)
    }
}

fn write_output(cli: &Cli, text: &str) -> Result<(), CompileError> {
    match &cli.output {
        Some(path) => std::fs::write(path, text).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        }),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn pretty(value: &Json) -> String {
    let mut s = serde_json::to_string_pretty(value).unwrap_or_default();
    s.push('\n');
    s
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    tracing::debug!(source = %cli.source.display(), emit = ?cli.emit, "starting");
    let source = read_path(&cli.source)?;
    let registry = Arc::new(Registry::with_builtins());
    let provenance = compute_provenance(&source, &registry);

    if cli.emit == EmitStage::BuildInfo {
        return write_output(cli, &provenance.to_json());
    }

    // ── Parse ──
    let parsed = sirsc::parser::parse(&source);
    let program = match parsed.program {
        Some(p) if !has_errors(&parsed.diagnostics) => p,
        _ => {
            return Err(CompileError::Phase {
                phase: Phase::Structural,
                diagnostics: parsed.diagnostics,
            })
        }
    };
    tracing::debug!(functions = program.functions.len(), "parsed");

    if cli.emit == EmitStage::Ast {
        return write_output(cli, &pretty(&sirsc::unparse::unparse(&program)));
    }

    // ── Pipeline ──
    let terminal = match cli.emit {
        EmitStage::Typed => PassId::Check,
        EmitStage::Rust => PassId::Codegen,
        _ => PassId::Optimize,
    };
    let options = CompileOptions {
        check: CheckOptions {
            widening: match cli.widening {
                Widening::SameCategory => WideningPolicy::SameCategory,
                Widening::Strict => WideningPolicy::Strict,
            },
        },
        opt_level: cli.opt_level,
    };
    let codegen_options = CodegenOptions {
        entry: if cli.no_main {
            None
        } else {
            Some(cli.entry.clone().unwrap_or_else(|| "main".to_string()))
        },
        seed: cli.seed,
        provenance: Some(provenance.clone()),
    };

    let mut state = CompilationState::new(program, registry.clone());
    state.provenance = Some(provenance);
    let result = run_pipeline(&mut state, terminal, &options, &codegen_options, |_, diags| {
        for d in diags.iter().filter(|d| !d.is_error()) {
            eprintln!("sirsc: {}", d);
        }
    });
    if let Err(e) = result {
        return Err(e.into_compile_error(&state.diagnostics));
    }

    match cli.emit {
        EmitStage::Typed => {
            let typed = state.artifacts.typed.as_ref().ok_or_else(missing)?;
            write_output(cli, &pretty(&typed.describe(&state.program)))
        }
        EmitStage::Cir => {
            let cir = state.final_cir().ok_or_else(missing)?;
            write_output(cli, &cir.to_string())
        }
        EmitStage::Rust => {
            let generated = state.artifacts.generated.as_ref().ok_or_else(missing)?;
            write_output(cli, &generated.rust_source)
        }
        EmitStage::Run => emit_run(cli, &state, registry),
        EmitStage::Infer => emit_infer(cli, &state, registry),
        EmitStage::Ast | EmitStage::BuildInfo => Ok(()),
    }
}

fn missing() -> CompileError {
    CompileError::Input("pipeline produced no artifact".to_string())
}

fn emit_run(cli: &Cli, state: &CompilationState, registry: Arc<Registry>) -> Result<(), CompileError> {
    let entry = cli.entry.as_deref().unwrap_or("main");
    let typed = state.artifacts.typed.as_ref().ok_or_else(missing)?;
    let cir = state.final_cir().ok_or_else(missing)?;
    let sig = typed
        .decls
        .functions
        .get(entry)
        .filter(|sig| sig.type_params.is_empty())
        .ok_or_else(|| CompileError::Input(format!("no non-generic function named '{entry}'")))?;

    let raw = match &cli.input {
        Some(path) => serde_json::from_str(&read_path(path)?)
            .map_err(|e| CompileError::Input(format!("input is not JSON: {e}")))?,
        None => Json::Array(Vec::new()),
    };
    let items = raw
        .as_array()
        .ok_or_else(|| CompileError::Input("input must be a JSON array of arguments".to_string()))?;
    if items.len() != sig.params.len() {
        return Err(CompileError::Input(format!(
            "'{entry}' takes {} argument(s), input has {}",
            sig.params.len(),
            items.len()
        )));
    }
    let args = items
        .iter()
        .zip(&sig.params)
        .map(|(j, ty)| json_value::from_json(j, ty, &typed.decls))
        .collect::<Result<Vec<_>, _>>()
        .map_err(CompileError::Input)?;

    let limits = Limits {
        fuel: cli.fuel,
        ..Limits::default()
    };
    let outcome = run_entry(cir, entry, args, registry, cli.seed, limits)?;
    let report = json!({
        "result": json_value::to_json(&outcome.result, &sig.returns, &typed.decls),
        "log_weight": json_value::to_json(&sirs_runtime::Value::Float(outcome.log_weight), &F64, &typed.decls),
        "output": outcome.output,
    });
    write_output(cli, &pretty(&report))
}

fn emit_infer(cli: &Cli, state: &CompilationState, registry: Arc<Registry>) -> Result<(), CompileError> {
    let entry = cli.entry.as_deref().unwrap_or("model");
    let cir = state.final_cir().ok_or_else(missing)?;
    let density = ModelDensity::new(&state.program, cir, entry, registry)?;

    let mut algorithm = match cli.algorithm {
        AlgorithmArg::Mh => Algorithm::metropolis(),
        AlgorithmArg::Amh => Algorithm::adaptive_metropolis(),
        AlgorithmArg::Hmc => Algorithm::hamiltonian(),
        AlgorithmArg::Vi => Algorithm::variational(),
    };
    if let Some(h) = cli.step_size {
        match &mut algorithm {
            Algorithm::MetropolisHastings { step_size }
            | Algorithm::AdaptiveMetropolis { step_size, .. }
            | Algorithm::Hamiltonian { step_size, .. } => *step_size = h,
            Algorithm::Variational { learning_rate, .. } => *learning_rate = h,
        }
    }
    let options = Options {
        chains: cli.chains,
        samples: cli.samples,
        warmup: cli.warmup,
        thin: cli.thin,
        seed: cli.seed,
        ..Options::default()
    };

    let result = model::infer(&density, &algorithm, &options, &CancelToken::new())?;
    write_output(cli, &pretty(&model::report(&result, cli.with_chains)))
}
