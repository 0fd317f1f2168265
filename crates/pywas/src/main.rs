use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use pywas_core::config::{AppConfig, ServerConfig};
use pywas_core::BridgeConfig;
use pywas_host::strings::decode_utf8;
use pywas_host::{interpreter, AppLocator, Interpreter};
use pywas_wsgi::WsgiHandler;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "pywas",
    about = "Serve a Python WSGI application over the Web Application Socket protocol",
    version
)]
struct Cli {
    /// Append a directory to sys.path (repeatable)
    #[arg(long = "sys-path", value_name = "PATH")]
    sys_path: Vec<PathBuf>,

    /// Module to import instead of trying `app` and then `wsgi`
    #[arg(long, value_name = "NAME")]
    module: Option<OsString>,

    /// Attribute to use instead of trying `app` and then `application`
    #[arg(long, value_name = "NAME")]
    app: Option<OsString>,

    /// SERVER_NAME for requests without a Host header [default: localhost]
    #[arg(long)]
    host: Option<String>,

    /// SERVER_PORT for requests without a Host header [default: 80]
    #[arg(long)]
    port: Option<u16>,

    /// TOML configuration file; command-line flags take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run two canned requests and print the responses instead of serving
    /// WAS (the default when stdin is a terminal)
    #[arg(long)]
    interactive: bool,
}

impl Cli {
    /// The command-line half of the configuration.
    fn overrides(&self) -> anyhow::Result<BridgeConfig> {
        let name = |value: &Option<OsString>| -> anyhow::Result<Option<String>> {
            value
                .as_ref()
                .map(|v| decode_utf8(v.as_encoded_bytes()).map(str::to_string))
                .transpose()
                .map_err(Into::into)
        };
        Ok(BridgeConfig {
            app: AppConfig {
                module: name(&self.module)?,
                attribute: name(&self.app)?,
                sys_path: self.sys_path.clone(),
            },
            server: ServerConfig {
                host: self.host.clone(),
                port: self.port,
            },
        })
    }

    fn load_config(&self) -> anyhow::Result<BridgeConfig> {
        let base = match &self.config {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("could not load configuration from {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        Ok(base.merge(self.overrides()?))
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // stdout is the response body pipe under WAS; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let interactive = cli.interactive || std::io::stdin().is_terminal();
    tracing::debug!(?config, interactive, "starting");

    Interpreter::run(|py| -> anyhow::Result<()> {
        interpreter::extend_sys_path(py, &config.app.sys_path)?;
        if !interactive {
            interpreter::redirect_stdout_to_stderr(py)?;
        }

        let app = AppLocator::new().locate(py, config.app.module.as_deref(), config.app.attribute.as_deref())?;
        let handler = WsgiHandler::new(app);

        // The handler takes the GIL back for each exchange.
        py.allow_threads(|| {
            if interactive {
                commands::interactive::run(&handler, &config.server)
            } else {
                commands::serve::run(&handler, &config.server)
            }
        })
    })?
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = init_tracing() {
        eprintln!("pywas: could not initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
