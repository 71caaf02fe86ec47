use tracing_subscriber::EnvFilter;

/// Initialize tracing output on stderr.
///
/// `RUST_LOG` takes precedence when set; otherwise the verbosity count
/// from the CLI picks a default filter (-v debug, -vv trace).
pub fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = match verbose {
            0 => "info,chromiumoxide=warn,hyper=warn,aws_config=warn",
            1 => "debug,chromiumoxide=info,hyper=info",
            _ => "trace",
        };
        EnvFilter::new(directive)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
