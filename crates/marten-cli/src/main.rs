use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

use marten_bytecode::Module;
use marten_compiler::GlobalNames;
use marten_syntax::{SourceId, fold_constants, parse};
use marten_vm::{Value, Vm};

#[derive(Parser)]
#[command(name = "marten", version, about = "Marten scripting toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute a script, or run a compiled `.mbc` module
    Run { entry: PathBuf },
    /// Compile a script to a bytecode module on disk
    Build {
        entry: PathBuf,
        /// Output path (defaults to the entry with an `.mbc` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the disassembly of a script or compiled module
    Disasm { entry: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { entry } => run(&entry),
        Commands::Build { entry, output } => build(&entry, output),
        Commands::Disasm { entry } => disasm(&entry),
    }
}

fn run(entry: &Path) -> Result<()> {
    let mut vm = host_vm();
    let module = load_module(entry, &vm)?;
    vm.run(&module)?;
    Ok(())
}

fn build(entry: &Path, output: Option<PathBuf>) -> Result<()> {
    let vm = host_vm();
    let module = load_module(entry, &vm)?;
    let output = output.unwrap_or_else(|| entry.with_extension("mbc"));
    let mut file = std::fs::File::create(&output)
        .with_context(|| format!("creating {}", output.display()))?;
    module.write_to(&mut file)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn disasm(entry: &Path) -> Result<()> {
    let vm = host_vm();
    let module = load_module(entry, &vm)?;
    println!("module {}", module.source_url);
    for function in &module.functions {
        print!("{}", function.disassemble());
    }
    Ok(())
}

/// A VM with the standard host natives bound
fn host_vm() -> Vm {
    let mut vm = Vm::new();
    vm.register_native("print", |args| {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        println!("{line}");
        Ok(Value::Null)
    });
    vm.register_native("clock", |args| {
        if !args.is_empty() {
            return Err("clock takes no arguments".to_string());
        }
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_secs_f64();
        Ok(Value::Float(secs))
    });
    vm
}

/// Read a compiled module, or compile source against the VM's globals
fn load_module(entry: &Path, vm: &Vm) -> Result<Module> {
    if entry.extension().is_some_and(|e| e == "mbc") {
        let mut file = std::fs::File::open(entry)
            .with_context(|| format!("opening {}", entry.display()))?;
        return Ok(Module::read_from(&mut file)?);
    }

    let source = std::fs::read_to_string(entry)
        .with_context(|| format!("reading {}", entry.display()))?;
    let program = parse(&source, SourceId(0))?;
    let program = fold_constants(program);
    let globals: GlobalNames = vm.global_names().collect();
    let module = marten_compiler::compile(&program, &globals, &entry.display().to_string())?;
    Ok(module)
}
