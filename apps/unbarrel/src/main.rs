use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use std::io::{BufWriter, Write};
use std::time::Instant;
use unbarrel_barrels::{Config, ExplainConfig};

#[derive(Parser)]
#[command(name = "unbarrel")]
#[command(about = "Rewrite imports through barrel files into direct imports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rewrite barrel imports across a JavaScript/TypeScript project
    Rewrite(Config),
    /// Show how one specifier resolves and where its bindings are defined
    Explain(ExplainConfig),
}

fn main() -> Result<()> {
    env_logger::init();

    // stdio is blocked by LineWriter, use a BufWriter to reduce syscalls.
    // See https://github.com/rust-lang/rust/issues/60673
    let mut stdout = BufWriter::new(std::io::stdout());

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli.command);

    let start = Instant::now();

    match cli.command {
        Commands::Rewrite(cfg) => {
            let num_threads = rayon::current_num_threads();
            info!("Running barrel rewrite (using {} threads)", num_threads);
            debug!("Config: root={:?}, entry_glob={:?}", cfg.resolve.root, cfg.entry_glob);

            let check = cfg.check;
            let report = unbarrel_barrels::run_rewrite(cfg)?;
            let elapsed_ms = start.elapsed().as_millis();

            if report.files.is_empty() {
                unbarrel_barrels::print_no_rewrites_message(&mut stdout)?;
            } else {
                unbarrel_barrels::print_rewrites_tree(&mut stdout, &report)?;
            }
            writeln!(
                stdout,
                "\n{} Finished in {}ms on {} files (using {} threads).",
                "●".bright_blue(),
                elapsed_ms.to_string().cyan(),
                report.files_analyzed.to_string().cyan(),
                num_threads.to_string().cyan()
            )?;
            stdout.flush()?;

            // Non-zero exit to fail CI
            if check && report.pending() > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Explain(cfg) => {
            debug!("Explaining '{}' from {}", cfg.specifier, cfg.from.display());
            let explanation = unbarrel_barrels::explain(cfg)?;
            unbarrel_barrels::print_explanation(&mut stdout, &explanation)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
