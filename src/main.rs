//! ghdsu: GHD Software Utility
//!
//! Entry point for activation URLs. Resolves the package, reports whether it
//! is ready to install or launch, and with `--install` carries that out.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ghdsu::activation;
use ghdsu::config::{Config, ConfigSource};
use ghdsu::error::{Notice, SessionError};
use ghdsu::install::{InstallOrchestrator, InstallOutcome, InstallSettings, SystemHost, host};
use ghdsu::logging;
use ghdsu::package_info::{HttpTransport, PackageInfoClient, credentials};
use ghdsu::paths::AppPaths;
use ghdsu::session::Session;
use ghdsu::state_machine::InstallState;

/// GHD Software Utility
#[derive(Parser, Debug)]
#[command(name = "ghdsu", version, about = "Install and open catalog software")]
struct Args {
    /// Activation URL, e.g. ghdsoftwareutility://ghd/?sys_id=..&fmno=..
    url: Option<String>,

    /// Config file (defaults to ~/.config/ghdsu/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Install the package if missing, then open it
    #[arg(short, long)]
    install: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let paths = AppPaths::resolve();

    let config_path = args
        .config
        .clone()
        .or_else(|| paths.as_ref().map(AppPaths::config_file));
    let (config, config_source) = match config_path
        .as_deref()
        .map(Config::load_with_source)
        .transpose()
    {
        Ok(loaded) => loaded.unwrap_or_else(|| (Config::default(), ConfigSource::Defaults)),
        Err(e) => {
            eprintln!("ghdsu: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_config {
        print!("{}", config.to_toml());
        return ExitCode::SUCCESS;
    }

    if let Some(paths) = &paths {
        if let Err(e) = paths.ensure() {
            eprintln!("ghdsu: cannot create application directories: {e}");
        }
    }
    let _log_guard = logging::init(&config.logging, paths.as_ref().map(|p| p.logs.as_path()));
    info!(source = %config_source, "configuration loaded");

    match run(args, config, paths) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("ghdsu: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, config: Config, paths: Option<AppPaths>) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started = %chrono::Local::now().to_rfc3339(),
        url = args.url.as_deref().unwrap_or(""),
        "ghdsu session started"
    );

    let code = runtime.block_on(serve(args, &config, paths.as_ref()));

    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    code
}

async fn serve(args: Args, config: &Config, paths: Option<&AppPaths>) -> Result<ExitCode> {
    let Some(url) = args.url else {
        info!(store = %config.store.url, "no activation URL, opening store");
        host::open_url(&config.store.url)
            .await
            .with_context(|| format!("failed to open {}", config.store.url))?;
        return Ok(ExitCode::SUCCESS);
    };

    #[cfg(unix)]
    {
        use ghdsu::instance::{self, InstanceRole};
        if let Some(paths) = paths {
            match instance::acquire(&paths.socket_path(), Some(&url)).await {
                Ok(InstanceRole::Primary(guard)) => {
                    return activate_as_primary(guard, &url, config, args.install).await;
                }
                Ok(InstanceRole::Secondary) => {
                    println!("ghdsu is already running; activation handed over");
                    return Ok(ExitCode::SUCCESS);
                }
                Err(e) => warn!(error = %e, "single-instance guard unavailable"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = paths;

    activate(&url, config, args.install).await
}

/// Run the activation while reporting every URL forwarded by a duplicate
/// launch. The guard lives until the activation ends.
#[cfg(unix)]
async fn activate_as_primary(
    mut guard: ghdsu::instance::InstanceGuard,
    url: &str,
    config: &Config,
    install: bool,
) -> Result<ExitCode> {
    let activation = activate(url, config, install);
    tokio::pin!(activation);
    loop {
        tokio::select! {
            code = &mut activation => return code,
            Some(forwarded) = guard.next_forwarded() => {
                warn!(url = %forwarded, "activation ignored, another one is in progress");
                eprintln!("{}", ghdsu::instance::ignored_activation(&forwarded));
            }
        }
    }
}

async fn activate(url: &str, config: &Config, install: bool) -> Result<ExitCode> {
    let request = match activation::parse(url) {
        Ok(request) => request,
        Err(e) => return Ok(report(&SessionError::from(e))),
    };

    let provider = credentials::from_config(&config.credentials);
    let transport = match HttpTransport::from_credentials(provider.as_ref(), &config.api) {
        Ok(transport) => transport,
        Err(e) => return Ok(report(&SessionError::from(e))),
    };
    let client = PackageInfoClient::new(
        transport,
        config.api.clone(),
        config.install.estimated_minutes,
    );
    let host = SystemHost::new(
        config.install.jamf_binary.clone(),
        config.install.worker_process.clone(),
    );
    let orchestrator = InstallOrchestrator::new(host, InstallSettings::from_config(config));
    let session = Session::new(client, orchestrator);

    let info = match session.fetch(&request).await {
        Ok(info) => info,
        Err(e) => return Ok(report(&e)),
    };

    let installed = matches!(session.state(), InstallState::Ready { installed: true });
    println!("{}", info.display_name);
    if installed {
        println!("Installed. Action: Launch");
    } else {
        println!(
            "Not installed. Action: Install (about {} minutes)",
            info.estimated_minutes
        );
    }

    if !install {
        return Ok(ExitCode::SUCCESS);
    }

    if !installed {
        println!("Installing {}...", info.display_name);
        match session.install().await {
            Ok(InstallOutcome::AlreadyInstalled) => println!("Already installed."),
            Ok(InstallOutcome::Installed { elapsed, .. }) => {
                println!("Installed in {}s.", elapsed.as_secs())
            }
            Err(e) => return Ok(report(&e)),
        }
    }

    match session.launch().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => Ok(report(&e)),
    }
}

fn report(err: &SessionError) -> ExitCode {
    error!(error = %err, "activation failed");
    eprintln!("{}", Notice::from(err));
    ExitCode::FAILURE
}
