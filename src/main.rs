use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;

use modinst::history::{FileHistoryStore, HistoryStore};
use modinst::hooks::{HookRegistry, RequestContext};
use modinst::installer::ModuleInstaller;
use modinst::paths::{ModulePaths, default_install_root};
use modinst::references::InMemoryReferenceRegistry;
use modinst::runtime::RealRuntime;

/// modinst - module installer
///
/// Install self-contained extension packages into a shared host runtime:
/// validate and extract the package, reconcile its bundled binaries against
/// the shared binary directory, and record every installation.
///
/// Examples:
///   modinst install blog.zip --user admin
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Installation root directory (overrides defaults; also via MODINST_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "MODINST_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a module package: extract it, then commit its binaries if
    /// there are no conflicts (or when overriding)
    Install(InstallArgs),

    /// List binary conflicts between an extracted module and the shared runtime
    Conflicts(ConflictsArgs),

    /// Copy an extracted module's binaries into the shared runtime and run
    /// its install hook
    Commit(CommitArgs),

    /// Show the installation history
    History(HistoryArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Path to the module package (zip)
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Identity of the installing user, recorded in the history log
    #[arg(long, default_value = "anonymous")]
    pub user: String,

    /// Overwrite shared binaries that conflict with the module's versions
    #[arg(long)]
    pub override_system: bool,
}

#[derive(clap::Args, Debug)]
pub struct ConflictsArgs {
    /// Name of an extracted module
    #[arg(value_name = "MODULE")]
    pub module: String,
}

#[derive(clap::Args, Debug)]
pub struct CommitArgs {
    /// Name of an extracted module
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Identity of the requesting user, passed to the install hook
    #[arg(long, default_value = "anonymous")]
    pub user: String,

    /// Overwrite shared binaries that conflict with the module's versions
    #[arg(long)]
    pub override_system: bool,
}

#[derive(clap::Args, Debug)]
pub struct HistoryArgs {}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let root = match cli.install_root {
        Some(path) => path,
        None => default_install_root(&runtime)?,
    };
    let paths = ModulePaths::new(root);
    let history = FileHistoryStore::new(&runtime, paths.clone());
    let references = InMemoryReferenceRegistry::new(&runtime);
    references.seed_from_dir(&paths.shared_bin_dir())?;
    // Hooks are registered by hosts embedding the library; the CLI has none.
    let hooks = HookRegistry::new();
    let installer = ModuleInstaller::new(&runtime, &history, &references, &hooks, paths);

    match cli.command {
        Commands::Install(args) => {
            let package = File::open(&args.package)
                .with_context(|| format!("Failed to open package {:?}", args.package))?;
            let name_hint = args
                .package
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            let module = installer.unzip(&name_hint, package, &args.user)?;
            println!("Extracted module \"{}\"", module);

            let conflicts = installer.check_conflicted_assembly_references(&module)?;
            if !conflicts.is_empty() && !args.override_system {
                print_conflicts(&conflicts);
                bail!(
                    "module \"{}\" extracted but not committed; re-run `modinst commit {}` to decide",
                    module,
                    module
                );
            }

            installer.copy_assemblies(&module, args.override_system)?;
            installer.run_event(&module, &RequestContext::for_user(&args.user))?;
            println!("Installed module \"{}\"", module);
        }
        Commands::Conflicts(args) => {
            let conflicts = installer.check_conflicted_assembly_references(&args.module)?;
            if conflicts.is_empty() {
                println!("No conflicts for module \"{}\"", args.module);
            } else {
                print_conflicts(&conflicts);
            }
        }
        Commands::Commit(args) => {
            installer.copy_assemblies(&args.module, args.override_system)?;
            installer.run_event(&args.module, &RequestContext::for_user(&args.user))?;
            println!("Committed module \"{}\"", args.module);
        }
        Commands::History(_args) => {
            for record in history.read_log()? {
                println!(
                    "{} {} {} (by {}, archive {})",
                    record.installed_at.format("%Y-%m-%d %H:%M:%S"),
                    record.module_name,
                    record.version,
                    record.user,
                    record.archive_file
                );
            }
        }
    }
    Ok(())
}

fn print_conflicts(conflicts: &[modinst::references::ConflictedAssemblyReference]) {
    println!("Conflicting binaries:");
    for conflict in conflicts {
        println!(
            "  {}: module has {}, system has {}",
            conflict.file_name, conflict.module_version, conflict.system_version
        );
    }
}
