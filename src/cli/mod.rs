//! Command-line interface.

mod call;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use soap_datasource::config::Config;

#[derive(Parser)]
#[command(
    name = "soap-datasource",
    version,
    about = "Call SOAP operations through a caching gateway"
)]
pub(crate) struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Invoke a SOAP method and print its response as JSON.
    Call {
        /// Method name.
        method: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Service name for a namespaced call (requires --port).
        #[arg(long, requires = "port")]
        service: Option<String>,
        /// Port name for a namespaced call (requires --service).
        #[arg(long, requires = "service")]
        port: Option<String>,
        /// Endpoint URL, overriding the configuration.
        #[arg(long)]
        endpoint: Option<String>,
        /// Target namespace, overriding the configuration.
        #[arg(long)]
        namespace: Option<String>,
        /// SOAPAction header (default: namespace + method).
        #[arg(long)]
        soap_action: Option<String>,
        /// Number of times to issue the call; repeats are served from cache.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Print the effective configuration.
    Config,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the default `info`.
pub(crate) fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub(crate) async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Call {
            method,
            args,
            service,
            port,
            endpoint,
            namespace,
            soap_action,
            repeat,
        } => {
            call::cmd_call(call::CallArgs {
                method,
                args,
                target: service.zip(port),
                endpoint,
                namespace,
                soap_action,
                repeat,
            })
            .await
        }
        Commands::Config => cmd_config(),
    }
}

/// Print the configuration after env overrides.
fn cmd_config() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    println!("# {}", Config::path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_namespaced_call() {
        let cli = Cli::try_parse_from([
            "soap-datasource",
            "call",
            "sayHello",
            "--args",
            r#"{"firstName":"x"}"#,
            "--service",
            "Hello_Service",
            "--port",
            "Hello_Port",
            "--repeat",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Call {
                method,
                service,
                port,
                repeat,
                ..
            } => {
                assert_eq!(method, "sayHello");
                assert_eq!(service.as_deref(), Some("Hello_Service"));
                assert_eq!(port.as_deref(), Some("Hello_Port"));
                assert_eq!(repeat, 2);
            }
            Commands::Config => panic!("expected call"),
        }
    }

    #[test]
    fn test_service_requires_port() {
        assert!(Cli::try_parse_from(["soap-datasource", "call", "m", "--service", "S"]).is_err());
    }
}
