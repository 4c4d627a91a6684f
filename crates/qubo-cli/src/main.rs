use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use qubo_core::{DEFAULT_PENALTY, DEFAULT_TOLERANCE, Problem, QuboConverter, VarType};

#[derive(Parser)]
#[command(name = "qubo")]
#[command(about = "Convert optimization problems to QUBO form", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConvertOptions {
    /// Penalty factor for folded constraints
    #[arg(short, long, default_value_t = DEFAULT_PENALTY)]
    penalty: f64,
    /// Keep the objective sense instead of normalizing to minimization
    #[arg(long)]
    keep_sense: bool,
}

impl ConvertOptions {
    fn converter(&self) -> QuboConverter {
        let converter = QuboConverter::new().with_penalty(self.penalty);
        if self.keep_sense { converter.keep_sense() } else { converter }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a problem (JSON) and print the QUBO as JSON
    Convert {
        /// The problem file
        file: PathBuf,
        #[command(flatten)]
        options: ConvertOptions,
    },
    /// Map a solution of the converted QUBO back to the problem's variables
    Interpret {
        /// The problem file
        file: PathBuf,
        /// JSON array with one value per QUBO variable
        solution: PathBuf,
        #[command(flatten)]
        options: ConvertOptions,
    },
    /// Print the objective value and violations of a solution
    Evaluate {
        /// The problem file
        file: PathBuf,
        /// JSON array with one value per problem variable
        solution: PathBuf,
    },
    /// Check a problem file for errors and QUBO compatibility
    Check {
        /// The problem file
        file: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn read_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn read_problem(path: &Path) -> Problem {
    match serde_json::from_str::<Problem>(&read_file(path)) {
        Ok(problem) => {
            info!(
                file = %path.display(),
                variables = problem.num_variables(),
                constraints = problem.num_constraints(),
                "loaded problem"
            );
            problem
        }
        Err(e) => {
            eprintln!("Invalid problem in {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn read_solution(path: &Path) -> Vec<f64> {
    match serde_json::from_str::<Vec<f64>>(&read_file(path)) {
        Ok(values) => {
            debug!(file = %path.display(), len = values.len(), "loaded solution");
            values
        }
        Err(e) => {
            eprintln!("Invalid solution in {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!(verbose = cli.verbose, "logging initialized");

    match cli.command {
        Commands::Convert { file, options } => {
            let problem = read_problem(&file);
            let mut converter = options.converter();
            info!(penalty = converter.penalty(), keep_sense = options.keep_sense, "converting");

            match converter.convert(&problem) {
                Ok(qubo) => match serde_json::to_string_pretty(&qubo) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error writing QUBO: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("Conversion error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Interpret { file, solution, options } => {
            let problem = read_problem(&file);
            let values = read_solution(&solution);
            let mut converter = options.converter();

            if let Err(e) = converter.convert(&problem) {
                eprintln!("Conversion error: {}", e);
                std::process::exit(1);
            }

            match converter.interpret(&values) {
                Ok(original) => {
                    for (var, value) in problem.variables().iter().zip(&original) {
                        println!("  {:20} {:10}", var.name, value);
                    }
                    match problem.evaluate(&original) {
                        Ok(objective) => println!("Objective: {}", objective),
                        Err(e) => eprintln!("Error evaluating objective: {}", e),
                    }
                }
                Err(e) => {
                    eprintln!("Interpret error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Evaluate { file, solution } => {
            let problem = read_problem(&file);
            let values = read_solution(&solution);

            let objective = match problem.evaluate(&values) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            println!("Objective: {}", objective);

            match problem.violations(&values, DEFAULT_TOLERANCE) {
                Ok(violations) if violations.is_empty() => println!("Status: FEASIBLE"),
                Ok(violations) => {
                    println!("Status: INFEASIBLE");
                    println!();
                    println!("Violations:");
                    for v in &violations {
                        println!("  - {}", v.description);
                    }
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check { file } => {
            let problem = read_problem(&file);

            let count = |kind: VarType| problem.variables().iter().filter(|v| v.var_type == kind).count();
            println!("✓ {} is valid", file.display());
            println!("  {} binary variables", count(VarType::Binary));
            println!("  {} integer variables", count(VarType::Integer));
            println!("  {} continuous variables", count(VarType::Continuous));
            println!("  {} constraints", problem.num_constraints());

            match QuboConverter::new().check(&problem) {
                Ok(()) => println!("  QUBO compatible"),
                Err(e) => {
                    eprintln!("✗ not QUBO compatible: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
