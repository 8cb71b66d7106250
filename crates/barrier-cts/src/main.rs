//! Command line runner of the ray tracing barrier matrix.
//!
//! ```bash
//! # list all ray tracing cases
//! barrier-cts list
//!
//! # run every storage image case with precompiled shaders and validation
//! barrier-cts run --case 'barrier.simg.*' --spirv-dir spirv/ --validation
//!
//! # write the GLSL of a case to disk
//! barrier-cts dump-shaders barrier.ssbo.memory_barrier.from_comp_to_ahit --out shaders/
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use barrier_cts::{RunConfig, ShaderCompiler, SpirvDirectory, runner};
use barrier_matrix::{CasePrograms, TestCase};
use barrier_vk::context::Ctx;
use clap::{Args, Parser, Subcommand};

/// Vulkan ray tracing barrier test matrix
#[derive(Parser, Debug)]
#[command(name = "barrier-cts")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the path of every selected case
    List(Selection),
    /// Run the selected cases and report Pass, Fail or NotSupported for each
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Enable the Khronos validation layer
        #[arg(long)]
        validation: bool,

        /// Load precompiled `<program>.spv` files from this directory instead of compiling GLSL
        #[arg(long)]
        spirv_dir: Option<PathBuf>,
    },
    /// Write the generated GLSL of a single case
    DumpShaders {
        /// Case path, e.g. barrier.ssbo.memory_barrier.from_comp_to_rgen
        case: String,

        /// Output directory. Prints to stdout if not set
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct Selection {
    /// Glob over case paths (`*`, `?`). Can be given multiple times
    #[arg(long = "case")]
    cases: Vec<String>,

    /// Also enumerate pairs where neither side is a ray tracing stage
    #[arg(long)]
    include_non_rt: bool,
}

impl Selection {
    fn into_config(self) -> RunConfig {
        RunConfig {
            filters: self.cases,
            ray_tracing_only: !self.include_non_rt,
            ..Default::default()
        }
    }
}

fn make_compiler(spirv_dir: Option<PathBuf>) -> Result<Box<dyn ShaderCompiler>> {
    if let Some(dir) = spirv_dir {
        if !dir.is_dir() {
            bail!("SPIR-V directory {} does not exist", dir.display());
        }
        return Ok(Box::new(SpirvDirectory::new(dir)));
    }
    runtime_compiler()
}

#[cfg(feature = "shaderc")]
fn runtime_compiler() -> Result<Box<dyn ShaderCompiler>> {
    Ok(Box::new(barrier_cts::ShadercCompiler::new()?))
}

#[cfg(not(feature = "shaderc"))]
fn runtime_compiler() -> Result<Box<dyn ShaderCompiler>> {
    bail!("built without the shaderc feature, pass --spirv-dir with precompiled shaders")
}

fn dump_shaders(path: &str, out: Option<PathBuf>) -> Result<()> {
    let case = TestCase::from_path(path)?;
    let programs = CasePrograms::generate(&case)?;

    for source in programs.iter() {
        let file_name = format!("{}.{}", source.name, source.kind.extension());
        match &out {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                let file = dir.join(&file_name);
                std::fs::write(&file, &source.glsl)
                    .with_context(|| format!("writing {}", file.display()))?;
                log::info!("Wrote {}", file.display());
            }
            None => println!("// {}\n{}", file_name, source.glsl),
        }
    }
    Ok(())
}

///Runs all selected cases. Returns false if any of them failed.
fn run_cases(config: &RunConfig) -> Result<bool> {
    let cases = config.select_cases()?;
    if cases.is_empty() {
        bail!("no case matches {:?}", config.filters);
    }

    let compiler = make_compiler(config.spirv_dir.clone())?;
    let ctx = Ctx::new_headless(config.validation).context("creating Vulkan context")?;

    let summary = runner::run(&ctx, compiler.as_ref(), &cases, |case, status| {
        println!("{}: {}", case.path(), status);
    });
    println!("{}", summary);

    for failed in &summary.failed {
        eprintln!("FAILED {}", failed);
    }
    Ok(!summary.has_failures())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()?;

    match cli.command {
        Command::List(selection) => {
            for case in selection.into_config().select_cases()? {
                println!("{}", case.path());
            }
        }
        Command::Run {
            selection,
            validation,
            spirv_dir,
        } => {
            let config = RunConfig {
                validation,
                spirv_dir,
                ..selection.into_config()
            };
            //the context is dropped before exiting
            if !run_cases(&config)? {
                std::process::exit(1);
            }
        }
        Command::DumpShaders { case, out } => dump_shaders(&case, out)?,
    }

    Ok(())
}
