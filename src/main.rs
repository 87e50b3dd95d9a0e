use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use graal_native_lib::artifact::{ArtifactBuilder, BuildInputs, DependencyPolicy};
use graal_native_lib::config::BuildConfig;
use graal_native_lib::platform;
use graal_native_lib::provision;
use graal_native_lib::{output, toolchain};

/// Provision a GraalVM toolchain and build shared libraries with native-image.
///
/// Provisioning and building are separate steps: `build` never downloads a
/// toolchain, so run `provision` first.
#[derive(Parser, Debug)]
#[command(
    name = "graal-native-lib",
    version,
    about,
    after_help = "Examples:\n  graal-native-lib provision\n  graal-native-lib locate\n  graal-native-lib build --app build/libs/app.jar --dep libs/kotlin-stdlib-2.1.0.jar --output kotlin-lib\n  graal-native-lib --config ci/graal-native.toml build"
)]
struct Cli {
    /// Config file (defaults to ./graal-native.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the full native-image command line and other detail.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where the toolchain lives and which release to use.
#[derive(Args, Debug)]
struct ToolchainArgs {
    /// Directory holding unpacked toolchains.
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Full GraalVM version, e.g. 25.0.0.
    #[arg(long = "graalvm-version")]
    graalvm_version: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and unpack the GraalVM distribution for this host, if missing.
    Provision {
        #[command(flatten)]
        toolchain: ToolchainArgs,

        /// Download URL template ({semver}, {major}, {os}, {arch}, {platform}, {ext}).
        #[arg(long)]
        url_template: Option<String>,
    },

    /// Print the installed toolchain home, if any.
    Locate {
        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Build a shared library with the installed toolchain's native-image.
    Build(BuildArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    toolchain: ToolchainArgs,

    /// Compiled application archive.
    #[arg(long)]
    app: Option<PathBuf>,

    /// Resolved runtime dependency artifact (repeatable, replaces the configured list).
    #[arg(long = "dep")]
    deps: Vec<PathBuf>,

    /// Library name passed to native-image -o.
    #[arg(long)]
    output: Option<String>,

    /// Directory native-image runs in.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Substring identifying the required runtime dependency.
    #[arg(long)]
    runtime_marker: Option<String>,

    /// What to do when several dependencies match the marker.
    #[arg(long, value_enum)]
    policy: Option<DependencyPolicy>,
}

// ---------------------------------------------------------------------------
// Subcommand dispatch
// ---------------------------------------------------------------------------

fn run_provision(
    config: &BuildConfig,
    toolchain_args: &ToolchainArgs,
    url_template: Option<&str>,
) -> Result<()> {
    let install_dir = config.resolve_install_dir(toolchain_args.install_dir.as_deref());
    let version = config.resolve_version(toolchain_args.graalvm_version.as_deref())?;
    let template = config.resolve_url_template(url_template);

    output::verbose(&format!("platform: {}", platform::identify()?));

    let installed = provision::ensure(&install_dir, &version, &template, config.download_timeout())
        .with_context(|| format!("failed to provision GraalVM {version}"))?;
    println!("{}", installed.home.display());
    Ok(())
}

fn run_locate(config: &BuildConfig, toolchain_args: &ToolchainArgs) -> Result<()> {
    let install_dir = config.resolve_install_dir(toolchain_args.install_dir.as_deref());
    let version = config.resolve_version(toolchain_args.graalvm_version.as_deref())?;
    let platform = platform::identify()?;

    match toolchain::locate(&install_dir, &version, platform)? {
        Some(installed) => println!("{}", installed.home.display()),
        None => output::note(&format!(
            "GraalVM {version} is not installed in {}",
            install_dir.display()
        )),
    }
    Ok(())
}

fn run_build(config: &BuildConfig, args: &BuildArgs) -> Result<()> {
    let install_dir = config.resolve_install_dir(args.toolchain.install_dir.as_deref());
    let version = config.resolve_version(args.toolchain.graalvm_version.as_deref())?;

    let inputs = BuildInputs {
        app_archive: config.resolve_app_archive(args.app.as_deref())?,
        dependencies: config.resolve_dependencies(&args.deps),
    };
    let output_name = config.resolve_output_name(args.output.as_deref())?;

    let builder = ArtifactBuilder::for_host()?
        .with_runtime_marker(config.resolve_runtime_marker(args.runtime_marker.as_deref()))
        .with_policy(config.resolve_policy(args.policy))
        .with_working_dir(config.resolve_working_dir(args.working_dir.as_deref()))
        .with_extra_args(config.extra_args.iter().cloned());

    let result = builder
        .build_installed(&install_dir, &version, &inputs, &output_name)
        .with_context(|| format!("failed to build shared library '{output_name}'"))?;
    println!("{}", result.library_path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = BuildConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Provision {
            toolchain,
            url_template,
        } => run_provision(&config, &toolchain, url_template.as_deref()),
        Command::Locate { toolchain } => run_locate(&config, &toolchain),
        Command::Build(args) => run_build(&config, &args),
    }
}

fn main() {
    let cli = Cli::parse();
    output::set_verbose(cli.verbose);

    if let Err(e) = run(cli) {
        output::fail("Error", &format!("{e:#}"));
        if let Some(graal_native_lib::ToolchainError::NativeBuildFailed { stdout, stderr, .. }) =
            e.downcast_ref::<graal_native_lib::ToolchainError>()
        {
            if output::is_verbose() && !stdout.trim().is_empty() {
                output::detail(stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                output::detail(stderr.trim_end());
            }
        }
        process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
