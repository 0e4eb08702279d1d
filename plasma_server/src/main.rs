//! Plasma replica cluster launcher.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{self, LevelFilter};
use plasma::{
    logger_init, pf_error, pf_info, pf_warn, ClusterDefinition, PlasmaError,
    ReplicaCluster,
};
use tokio::runtime::Builder;
use tokio::sync::watch;

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Cluster definition file (`Key=Value` lines).
    #[arg(short, long)]
    definition: PathBuf,

    /// Where to write the `"<server> <port>"` lines once all replicas
    /// are listening.
    #[arg(short, long)]
    ports_file: Option<PathBuf>,

    /// Replica tuning knobs in TOML format.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 16)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(())` on success or
    /// `Err(PlasmaError)` on any error.
    fn sanitize(&self) -> Result<(), PlasmaError> {
        if self.definition.as_os_str().is_empty() {
            Err(PlasmaError::msg("empty definition path"))
        } else if self.ports_file.as_ref() == Some(&self.definition) {
            Err(PlasmaError::msg(format!(
                "ports file would overwrite definition '{}'",
                self.definition.display()
            )))
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

/// Actual main function of the replica launcher.
fn server_main() -> Result<(), PlasmaError> {
    // read in and parse command line arguments
    let args = CliArgs::parse();
    args.sanitize()?;
    let definition = ClusterDefinition::load(&args.definition)?;

    // set up termination signals handler
    let (tx_term, mut rx_term) = watch::channel(false);
    ctrlc::set_handler(move || {
        if let Err(e) = tx_term.send(true) {
            pf_error!("launcher"; "error sending to term channel: {}", e);
        }
    })?;

    let log_level = log::max_level();
    {
        // create tokio multi-threaded runtime
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(args.threads)
            .thread_name("tokio-worker-replica")
            .build()?;

        runtime.block_on(async move {
            let mut cluster =
                ReplicaCluster::launch(&definition, args.config.as_deref())
                    .await?;

            match &args.ports_file {
                Some(path) => {
                    cluster.board().dump_ports_file(path)?;
                    pf_info!("launcher"; "ports written to '{}'", path.display());
                }
                None => {
                    for line in cluster.board().to_ports_text().lines() {
                        pf_info!("launcher"; "{}", line);
                    }
                }
            }

            let interrupted = tokio::select! {
                _ = rx_term.changed() => true,
                stopped = cluster.wait_all_stopped() => {
                    stopped?;
                    false
                }
            };
            if interrupted {
                pf_warn!("launcher"; "interrupted, shutting down replicas");
                cluster.shutdown().await?;
            } else {
                pf_info!("launcher"; "all replicas stopped");
            }

            // suppress logging before dropping the runtime to avoid spurious
            // error messages
            log::set_max_level(LevelFilter::Off);

            Ok::<(), PlasmaError>(()) // give type hint for this async closure
        })?;
    } // drop the runtime here

    log::set_max_level(log_level);
    Ok(())
}

/// Main function of the replica launcher.
fn main() -> ExitCode {
    logger_init();

    if let Err(ref e) = server_main() {
        pf_error!("launcher"; "server_main exited: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
