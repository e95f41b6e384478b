use tracing_subscriber::EnvFilter;

const QUIET_TARGETS: [&str; 4] = [
    "alloy_transport_http=off",
    "alloy_rpc_client=off",
    "reqwest=off",
    "hyper_util=off",
];

/// Installs the global fmt subscriber. `RUST_LOG` selects the level, `info` by default.
pub fn init_logging() {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in QUIET_TARGETS {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Invalid log directive {directive}: {e}"),
        }
    }

    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Logging already initialised: {e}");
    }
}
