//! Main entrypoint for the host binary.

#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tunnel_host::{init_tracing_subscriber, native::run_native, HostCli, HostHandlers, HostMode};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = HostCli::parse();
    init_tracing_subscriber(cli.v)?;
    let cfg = cli.load_config()?;

    match cli.mode {
        HostMode::Native { vcpus } => {
            for report in run_native(&cfg, vcpus).await? {
                for (index, preview) in report.previews.iter().enumerate() {
                    info!(
                        "vCPU {}: file {index} begins with {:?}",
                        report.vcpu,
                        String::from_utf8_lossy(preview)
                    );
                }
            }
        }
        HostMode::Check => {
            let handlers = HostHandlers::open(&cfg.files, cfg.max_handles)?;
            println!(
                "{} virtual file(s), {} armed hook(s), {} socket handle(s), unknown calls: {:?}",
                handlers.file_count(),
                cfg.armed_hooks(),
                cfg.max_handles,
                cfg.unknown_calls
            );
        }
    }

    info!("Exiting host program.");
    Ok(())
}
