use clap::Parser;
use ft_engine::config::CliArgs;
use ft_engine::server::FtServer;
use ft_engine::transport::NdjsonTransport;

fn main() {
    let args = CliArgs::parse();

    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let limits = args.limits();
    tracing::info!(
        max_nodes = limits.max_node_count,
        max_total_size = limits.max_total_size,
        "ft-engine ready"
    );

    let mut server = FtServer::new(NdjsonTransport::new(), limits);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
