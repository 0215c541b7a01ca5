use call_recorder::config::{Cli, Commands, HostConfig};
use call_recorder::host::{self, ProcessLauncher, ShutdownCoordinator};
use call_recorder::sandbox;
use call_recorder::utils::logging::{self, render_error, LogOutput};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Call(args) => {
            logging::init(LogOutput::Stdout);
            tracing::info!("Starting call-recorder v{}", env!("CARGO_PKG_VERSION"));

            let shutdown = ShutdownCoordinator::new(|code| std::process::exit(code));
            if let Err(e) = host::signals::install(shutdown.clone()) {
                tracing::error!("[{}] Failed to install signal handlers: {}", e.code(), e);
            }
            host::install_panic_hook(shutdown.clone());
            host::log_banner();

            let config = match HostConfig::try_from(&args) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!("[{}] {}", e.code(), e);
                    std::process::exit(2);
                }
            };
            let launcher = match &args.sandbox_program {
                Some(program) => Ok(ProcessLauncher::new(program, args.device.to_args())),
                None => ProcessLauncher::current_exe(args.device.to_args()),
            };
            let launcher = match launcher {
                Ok(launcher) => launcher,
                Err(e) => {
                    tracing::error!("[{}] {}", e.code(), e);
                    std::process::exit(1);
                }
            };

            let code = host::run(config, &launcher, shutdown).await;
            std::process::exit(code);
        }
        Commands::Sandbox(args) => {
            logging::init(LogOutput::Stderr);
            if let Err(e) = sandbox::run_stdio(args).await {
                tracing::error!("{}", render_error(&e));
                std::process::exit(1);
            }
        }
    }
}
