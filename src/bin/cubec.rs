//! cubec: compile a cube test program to NASM text.

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use cube_backend::core::{CompilationSession, Compiler, ProgramOutput};
use cube_backend::test_ir::parse_program;
use cube_backend::x64::TargetConfig;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Allocated IR listing
    Ir,
    /// NASM assembly
    Asm,
}

#[derive(Parser)]
#[command(name = "cubec")]
#[command(about = "Compile a cube test program to x86-64 NASM")]
struct Args {
    /// Path to the input program
    input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Number of allocatable registers (1-6)
    #[arg(long)]
    registers: Option<usize>,

    /// Skip functions that fail with a recoverable error
    #[arg(long)]
    keep_going: bool,

    /// Annotate assembly with the IR each line came from
    #[arg(long)]
    comments: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every function compiled.
fn run(args: &Args) -> Result<bool, String> {
    let source = fs::read_to_string(&args.input)
        .map_err(|e| format!("failed to read '{}': {}", args.input.display(), e))?;

    let mut target = TargetConfig::default().with_comments(args.comments);
    if let Some(count) = args.registers {
        target = target.with_register_count(count).map_err(|e| e.to_string())?;
    }

    let arena = Bump::new();
    let session = CompilationSession::with_target(&arena, target);
    let program = parse_program(&session, &source).map_err(|e| format!("{}: {}", args.input.display(), e))?;
    let output = Compiler::new(&session)
        .keep_going(args.keep_going)
        .compile_program(&program)
        .map_err(|e| e.to_string())?;

    let text = match args.emit {
        Emit::Asm => output.text.clone(),
        Emit::Ir => ir_listing(&output),
    };
    match &args.output {
        Some(path) => fs::write(path, text).map_err(|e| format!("failed to write '{}': {}", path.display(), e))?,
        None => print!("{text}"),
    }

    for (name, err) in &output.failures {
        eprintln!("{name}: {err}");
    }
    log::debug!("{}", session.stats());
    Ok(output.is_complete())
}

fn ir_listing(output: &ProgramOutput) -> String {
    let mut text = String::new();
    for func in &output.functions {
        let _ = writeln!(text, "{} (frame {} bytes):", func.name, func.frame_size);
        for (position, instr) in func.instrs.iter().enumerate() {
            let _ = writeln!(text, "{position:4}  {instr}");
        }
        text.push('\n');
    }
    text
}
