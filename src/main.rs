use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dwiprep::{
    read_case_list, run_pipeline, B0Mode, ExtractConfig, MergeConfig, PipelineConfig,
    RunnerConfig, ToolConfig, ToolSpec, DEFAULT_VOLUME_EDGE, DEFAULT_WORKERS,
};

#[derive(Parser)]
#[command(name = "dwiprep")]
#[command(author, version, about = "Diffusion b0 preprocessing and view-merged tensor assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, register, normalize and merge every case in a case list
    Process {
        /// Case list: one .nrrd/.nhdr/.nii/.nii.gz path per line
        #[arg(short, long)]
        input: PathBuf,

        /// Reference volume every b0 is registered onto
        #[arg(long)]
        reference: PathBuf,

        /// Cases processed concurrently per stage
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Intensity threshold passed to the b0 extraction tool
        #[arg(long)]
        threshold: Option<f64>,

        /// How multiple b0 acquisitions are combined
        #[arg(long, value_enum, default_value_t = B0Mode::Average)]
        b0_mode: B0Mode,

        /// Directory for merged arrays, manifests and the report (default: first case's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Edge length every normalized volume must have
        #[arg(long, default_value_t = DEFAULT_VOLUME_EDGE)]
        volume_edge: usize,

        /// Kill any external tool running longer than this
        #[arg(long)]
        tool_timeout_secs: Option<u64>,

        /// Delete the flat binary stores after the .npy arrays are written
        #[arg(long)]
        remove_binary_stores: bool,

        /// Conversion tool command line (overrides DWIPREP_CONVERTER)
        #[arg(long)]
        converter: Option<String>,

        /// b0 extraction tool command line (overrides DWIPREP_EXTRACTOR)
        #[arg(long)]
        extractor: Option<String>,

        /// Registration tool command line (overrides DWIPREP_REGISTRAR)
        #[arg(long)]
        registrar: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a case list and show the files each case will produce
    Inspect {
        /// Case list to check
        #[arg(short, long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            reference,
            workers,
            threshold,
            b0_mode,
            output_dir,
            volume_edge,
            tool_timeout_secs,
            remove_binary_stores,
            converter,
            extractor,
            registrar,
            verbose,
        } => {
            setup_logging(verbose);

            let mut tools = ToolConfig::from_env();
            let overrides = [
                (&mut tools.converter, converter),
                (&mut tools.extractor, extractor),
                (&mut tools.registrar, registrar),
            ];
            for (slot, command_line) in overrides {
                if let Some(spec) = command_line.as_deref().and_then(ToolSpec::parse) {
                    *slot = spec;
                }
            }
            tools.timeout = tool_timeout_secs.map(Duration::from_secs);

            let config = PipelineConfig {
                case_list: input,
                reference,
                output_dir,
                tools,
                runner: RunnerConfig { workers },
                extract: ExtractConfig {
                    threshold,
                    mode: b0_mode,
                },
                merge: MergeConfig {
                    volume_edge,
                    remove_binary_stores,
                },
                ..Default::default()
            };

            let summary = run_pipeline(&config).await?;
            info!(
                "{} of {} cases merged; report written to {:?}",
                summary.merged_cases, summary.total_cases, summary.report
            );
            Ok(())
        }
        Commands::Inspect { input, verbose } => {
            setup_logging(verbose);
            inspect_case_list(input)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn inspect_case_list(input: PathBuf) -> Result<()> {
    info!("Inspecting case list {:?}", input);
    let list = read_case_list(&input).context("Failed to load case list")?;

    println!("Case List Analysis");
    println!("==================");
    println!("Run name: {}", list.name);
    println!("Cases: {}", list.cases.len());
    println!("Output directory: {:?}", list.storage_dir());
    println!();

    let mut missing = 0;
    for case in &list.cases {
        let exists = case.path.is_file();
        if !exists {
            missing += 1;
        }
        println!(
            "[{}] {} ({}){}",
            case.index,
            case.path.display(),
            case.format,
            if exists { "" } else { " MISSING" }
        );
        if case.format.is_legacy() {
            println!("    converted:  {}", case.names.converted_volume().display());
        }
        println!("    bvals:      {}", case.names.bvals().display());
        println!("    b0:         {}", case.names.b0_volume().display());
        println!("    warped:     {}", case.names.warped_volume().display());
        println!("    transform:  {}", case.names.transform_matrix().display());
        println!("    normalized: {}", case.names.normalized_volume().display());
    }

    println!();
    println!("Missing case files: {}", missing);
    if missing > 0 {
        list.verify_exists()?;
    }
    Ok(())
}
