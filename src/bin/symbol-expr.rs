use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use symbol_expr::batch::{self, Summary, Verdict};
use symbol_expr::{
    load_detections, Bindings, Expression, LabelMap, Linearizer, LinearizerConfig,
    SCORE_THRESHOLD,
};

#[derive(Parser, Debug)]
#[command(name = "symbol-expr", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct, parse and evaluate an expression from detector output.
    Linearize(LinearizeArgs),
    /// Parse and evaluate expression text.
    Eval(EvalArgs),
    /// Parse expression text and print its JSON tree.
    ToJson(ToJsonArgs),
    /// Evaluate a saved JSON tree.
    Load(LoadArgs),
    /// Tabulate an expression over a range of one variable.
    Table(TableArgs),
    /// Check saved trees against a `file,x,expected,tol` table.
    Batch(BatchArgs),
    /// Check saved trees against a `file,x,expected_error` table.
    BatchErrors(BatchArgs),
}

#[derive(Parser, Debug)]
struct LinearizeArgs {
    /// Detector output JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Value bound to `x` when evaluating.
    #[arg(long)]
    x: Option<f64>,

    /// Drop detections scoring below this.
    #[arg(long, default_value_t = SCORE_THRESHOLD)]
    score_threshold: f64,
}

#[derive(Parser, Debug)]
struct EvalArgs {
    /// Expression text, e.g. `2*x+sin(y)`.
    text: String,

    /// Variable binding as `name=value`. Repeatable.
    #[arg(long = "var", value_parser = parse_binding)]
    vars: Vec<(char, f64)>,
}

#[derive(Parser, Debug)]
struct ToJsonArgs {
    /// Expression text.
    text: String,
}

#[derive(Parser, Debug)]
struct LoadArgs {
    /// Expression tree JSON.
    path: PathBuf,

    /// Value bound to `x`.
    #[arg(long)]
    x: Option<f64>,
}

#[derive(Parser, Debug)]
struct TableArgs {
    /// Expression text.
    text: String,

    #[arg(long)]
    from: f64,

    #[arg(long)]
    to: f64,

    /// Number of intervals; `steps + 1` rows are printed.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Variable to sweep.
    #[arg(long, default_value_t = 'x')]
    var: char,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// CSV table.
    table: PathBuf,
}

fn parse_binding(arg: &str) -> Result<(char, f64), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{arg}'"))?;
    let mut chars = name.trim().chars();
    let (Some(name), None) = (chars.next(), chars.next()) else {
        return Err(format!("variable name must be one letter, got '{name}'"));
    };
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("not a number: '{value}'"))?;
    Ok((name, value))
}

fn x_bindings(x: Option<f64>) -> Bindings {
    match x {
        Some(x) => Bindings::new().with('x', x),
        None => Bindings::new(),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Linearize(args) => cmd_linearize(args),
        Command::Eval(args) => cmd_eval(args),
        Command::ToJson(args) => cmd_to_json(args),
        Command::Load(args) => cmd_load(args),
        Command::Table(args) => cmd_table(args),
        Command::Batch(args) => cmd_batch(&args.table, false),
        Command::BatchErrors(args) => cmd_batch(&args.table, true),
    }
}

fn cmd_linearize(args: LinearizeArgs) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read detections '{}'", args.in_path.display()))?;
    let (symbols, load_warnings) = load_detections(&json, &LabelMap::default())
        .with_context(|| format!("load detections '{}'", args.in_path.display()))?;

    let linearizer = Linearizer::new(LinearizerConfig {
        score_threshold: args.score_threshold,
        ..LinearizerConfig::default()
    });
    let result = linearizer.linearize(&symbols);
    for warning in load_warnings.iter().chain(&result.warnings) {
        println!("[warn] {warning}");
    }
    println!("[expr] {}", result.expr);

    let tree = Expression::parse(&result.expr)
        .with_context(|| format!("parse '{}'", result.expr))?;
    let bindings = x_bindings(args.x);
    let value = tree.evaluate(&bindings).context("evaluate")?;
    println!("[eval] x={} => {value}", bindings.get('x'));
    println!("[ast-json] {}", tree.to_json());
    Ok(())
}

fn cmd_eval(args: EvalArgs) -> anyhow::Result<()> {
    let tree = Expression::parse(&args.text).with_context(|| format!("parse '{}'", args.text))?;
    let mut bindings = Bindings::new();
    for (name, value) in args.vars {
        bindings.set(name, value);
    }
    println!("{}", tree.evaluate(&bindings)?);
    Ok(())
}

fn cmd_to_json(args: ToJsonArgs) -> anyhow::Result<()> {
    let tree = Expression::parse(&args.text).with_context(|| format!("parse '{}'", args.text))?;
    println!("{}", tree.to_json_pretty());
    Ok(())
}

fn cmd_load(args: LoadArgs) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.path)
        .with_context(|| format!("read tree '{}'", args.path.display()))?;
    let tree = Expression::from_json(&json)
        .with_context(|| format!("decode tree '{}'", args.path.display()))?;
    println!("[expr] {tree}");
    let bindings = x_bindings(args.x);
    let value = tree.evaluate(&bindings)?;
    println!("[eval] x={} => {value}", bindings.get('x'));
    Ok(())
}

fn cmd_table(args: TableArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.steps > 0, "--steps must be at least 1");
    let tree = Expression::parse(&args.text).with_context(|| format!("parse '{}'", args.text))?;
    let width = (args.to - args.from) / args.steps as f64;
    let values: Vec<f64> = (0..=args.steps)
        .map(|i| args.from + width * i as f64)
        .collect();
    let results = tree.evaluate_over(args.var, &values, &Bindings::new());
    for (value, result) in values.iter().zip(results) {
        match result {
            Ok(y) => println!("{value}\t{y}"),
            Err(err) => println!("{value}\terror: {err}"),
        }
    }
    Ok(())
}

fn cmd_batch(table: &Path, expect_errors: bool) -> anyhow::Result<()> {
    let verdicts: Vec<Verdict> = if expect_errors {
        batch::read_error_cases(table)
            .with_context(|| format!("read table '{}'", table.display()))?
            .iter()
            .map(batch::ErrorCase::run)
            .collect()
    } else {
        batch::read_value_cases(table)
            .with_context(|| format!("read table '{}'", table.display()))?
            .iter()
            .map(batch::ValueCase::run)
            .collect()
    };
    for verdict in &verdicts {
        println!("{verdict}");
    }
    let summary = Summary::tally(&verdicts);
    println!();
    println!("{summary}");
    if !summary.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
