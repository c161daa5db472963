//! Weft CLI
//!
//! Validate program models, inspect advice plans and run invocations
//! with a full trace of variant selection, masking and advice.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use weft_cli::commands::{check, plan, run};
use weft_cli::output::{resolve_color_choice, StyledOutput};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Caller-relation dispatch and pointcut weaving", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv); WEFT_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Color output: auto, always or never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a program model
    Check {
        /// Model file (.toml or .json)
        file: PathBuf,
    },

    /// Show the advice plan of each join point
    Plan {
        /// Model file (.toml or .json)
        file: PathBuf,
        /// Only this member (`Ns.Type.Member`)
        #[arg(short, long)]
        member: Option<String>,
    },

    /// Invoke a member and print its trace
    Run {
        /// Model file (.toml or .json)
        file: PathBuf,
        /// Target member (`Ns.Type.Member`)
        member: String,
        /// Argument literal, repeatable
        #[arg(short = 'a', long = "arg")]
        args: Vec<String>,
        /// Call from inside this member instead of from outside every module
        #[arg(long)]
        from: Option<String>,
        /// Call from module-level code of this module
        #[arg(long, conflicts_with = "from")]
        module: Option<String>,
        /// The calling member runs on the target's receiver
        #[arg(long, requires = "from")]
        same_instance: bool,
        /// Engine settings file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print a JSON report
        #[arg(long)]
        json: bool,
        /// Do not record a trace
        #[arg(long)]
        no_trace: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let ok = match cli.command {
        Commands::Check { file } => check::execute(&file, &mut out)?,
        Commands::Plan { file, member } => plan::execute(&file, member.as_deref(), &mut out)?,
        Commands::Run {
            file,
            member,
            args,
            from,
            module,
            same_instance,
            config,
            json,
            no_trace,
        } => run::execute(
            run::RunArgs {
                file,
                member,
                args,
                from,
                module,
                same_instance,
                config,
                json,
                no_trace,
            },
            &mut out,
        )?,
    };

    out.flush();
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize the tracing subscriber on stderr
fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
