mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_PRESET_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deployer",
    version,
    about = "Compile deployment descriptors into build scripts, package recipes and workload patches"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Image, profile and build identity of a run.
#[derive(Debug, Clone, Args)]
struct JobArgs {
    /// Image name; defaults to the part of $JOB_NAME before the dot.
    #[arg(long)]
    image: Option<String>,
    /// Profile name; defaults to the part of $JOB_NAME after the dot.
    #[arg(long)]
    profile: Option<String>,
    /// Build identifier appended to the primary tag.
    #[arg(long, env = "BUILD_NUMBER")]
    build_id: Option<String>,
}

/// Workload targets and resource overrides.
#[derive(Debug, Clone, Args)]
struct TargetArgs {
    /// Target workload as CLUSTER/NAMESPACE/TYPE/NAME[/CONTAINER[!]]; repeatable.
    #[arg(long = "workload")]
    workloads: Vec<String>,
    /// CPU as MIN:MAX in milli-cores ('-' for no ceiling).
    #[arg(long)]
    cpu: Option<String>,
    /// Memory as MIN:MAX in mebibytes ('-' for no ceiling).
    #[arg(long)]
    mem: Option<String>,
    /// Directory holding preset-<cluster>.yml files (default: $DEPLOYER_PRESET_DIR or ~/.deployer2).
    #[arg(long)]
    preset_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the build script and package recipe of a profile.
    Render {
        /// Path to the manifest file.
        #[arg(long, default_value = "deployer.yml")]
        manifest: PathBuf,
        /// Profile name; defaults to the part of $JOB_NAME after the dot.
        #[arg(long)]
        profile: Option<String>,
        /// Write build.sh and package.dockerfile here instead of printing them.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the image tags of a run, primary tag first.
    Tags {
        #[command(flatten)]
        job: JobArgs,
        /// Registry path to prefix every tag with.
        #[arg(long)]
        registry: Option<String>,
    },
    /// Print the patch document for each workload target.
    Patch {
        /// Path to the manifest file.
        #[arg(long, default_value = "deployer.yml")]
        manifest: PathBuf,
        #[command(flatten)]
        job: JobArgs,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Write every artifact of a run into a directory.
    Plan {
        /// Path to the manifest file.
        #[arg(long, default_value = "deployer.yml")]
        manifest: PathBuf,
        #[command(flatten)]
        job: JobArgs,
        #[command(flatten)]
        targets: TargetArgs,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DEPLOYER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let job_name = std::env::var("JOB_NAME").ok();

    let result = match cli.command {
        Commands::Render {
            manifest,
            profile,
            out,
        } => commands::resolve_profile(profile, job_name.as_deref()).and_then(|profile| {
            commands::render::run(&manifest, &profile, out.as_deref(), json_output)
        }),
        Commands::Tags { job, registry } => commands::resolve_job(
            job.image,
            job.profile,
            job_name.as_deref(),
        )
        .and_then(|(image, profile)| {
            commands::tags::run(
                &image,
                &profile,
                job.build_id.as_deref(),
                registry.as_deref(),
                json_output,
            )
        }),
        Commands::Patch {
            manifest,
            job,
            targets,
        } => commands::build_request(manifest, job, &targets, job_name.as_deref()).and_then(
            |request| commands::patch::run(&request, targets.preset_dir.as_deref(), json_output),
        ),
        Commands::Plan {
            manifest,
            job,
            targets,
            out,
        } => commands::build_request(manifest, job, &targets, job_name.as_deref()).and_then(
            |request| {
                commands::plan::run(&request, targets.preset_dir.as_deref(), &out, json_output)
            },
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:")
                || msg.starts_with("failed to parse manifest")
                || msg.starts_with("failed to read manifest")
                || msg.starts_with("failed to render")
            {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("preset error:") || msg.starts_with("invalid workload") {
                if msg.contains("no preset for cluster") {
                    eprintln!(
                        "hint: check the CLUSTER segment of --workload, or point --preset-dir at the directory holding preset-<cluster>.yml"
                    );
                }
                EXIT_PRESET_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
