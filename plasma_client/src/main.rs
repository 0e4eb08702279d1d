//! Plasma interactive command-line client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{self, LevelFilter};
use plasma::{
    logger_init, pf_error, ClientId, ClusterDefinition, DiscoveryBoard,
    PlasmaError, QuorumClient,
};
use tokio::runtime::Builder;

mod repl;

use repl::ClientRepl;

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Cluster definition file (`Key=Value` lines).
    #[arg(short, long)]
    definition: PathBuf,

    /// Ports file written by the replica launcher.
    #[arg(short, long)]
    ports_file: PathBuf,

    /// Client number used as the log prefix.
    #[arg(short, long, default_value_t = 0)]
    id: ClientId,

    /// Client tuning knobs in TOML format.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(())` on success or
    /// `Err(PlasmaError)` on any error.
    fn sanitize(&self) -> Result<(), PlasmaError> {
        if self.definition.as_os_str().is_empty() {
            Err(PlasmaError::msg("empty definition path"))
        } else if self.ports_file.as_os_str().is_empty() {
            Err(PlasmaError::msg("empty ports file path"))
        } else if self.threads < 2 {
            Err(PlasmaError::msg(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else {
            Ok(())
        }
    }
}

/// Actual main function of the interactive client.
fn client_main() -> Result<(), PlasmaError> {
    // read in and parse command line arguments
    let args = CliArgs::parse();
    args.sanitize()?;
    let definition = ClusterDefinition::load(&args.definition)?;
    let board = DiscoveryBoard::load_ports_file(
        &args.ports_file,
        definition.ip_address,
    )?;

    let log_level = log::max_level();
    {
        // create tokio multi-threaded runtime
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(args.threads)
            .thread_name("tokio-worker-client")
            .build()?;

        runtime.block_on(async move {
            let client = QuorumClient::new_and_setup(
                args.id,
                definition,
                Arc::new(board),
                args.config.as_deref(),
            )
            .await?;

            let mut repl = ClientRepl::new(client);
            repl.run().await?;

            // suppress logging before dropping the runtime to avoid spurious
            // error messages
            log::set_max_level(LevelFilter::Off);

            Ok::<(), PlasmaError>(()) // give type hint for this async closure
        })?;
    } // drop the runtime here

    log::set_max_level(log_level);
    Ok(())
}

/// Main function of the interactive client.
fn main() -> ExitCode {
    logger_init();

    if let Err(ref e) = client_main() {
        pf_error!("client"; "client_main exited: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod arg_tests {
    use super::*;

    #[test]
    fn sanitize_valid() {
        let args = CliArgs {
            definition: "cluster.def".into(),
            ports_file: "ports.txt".into(),
            id: 3,
            config: Some("io_timeout_ms = 500".into()),
            threads: 2,
        };
        assert_eq!(args.sanitize(), Ok(()));
    }

    #[test]
    fn sanitize_empty_ports_file() {
        let args = CliArgs {
            definition: "cluster.def".into(),
            ports_file: "".into(),
            id: 0,
            config: None,
            threads: 2,
        };
        assert!(args.sanitize().is_err());
    }

    #[test]
    fn sanitize_invalid_threads() {
        let args = CliArgs {
            definition: "cluster.def".into(),
            ports_file: "ports.txt".into(),
            id: 0,
            config: None,
            threads: 1,
        };
        assert!(args.sanitize().is_err());
    }
}
