const HELP: &str = "\
memtap-testapp - UDP demo harness for the memtap debug agent

Runs a process with a few known memory blocks and serves the memtap
protocol over UDP so a host-side tool can discover, connect and poke at
them.

USAGE:
  memtap-testapp [OPTIONS]

OPTIONS:
  -h, --help            Prints help information
  --bind <addr>         Bind address (default: 127.0.0.1)
  --port <port>         UDP port to listen on (default: 8765)
  --cycle-us <us>       Agent cycle period in microseconds (default: 1000)
  --bitrate <bps>       Advertised max bitrate (default: 115200)
  -v, --verbose         Show connection and protocol events
  -vv, --trace          Show raw frames as hex
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet = 0,
    /// Connection events, errors
    Verbose = 1,
    /// Raw frame bytes
    Trace = 2,
}

#[derive(Debug)]
pub struct AppArgs {
    pub bind: String,
    pub port: u16,
    pub cycle_us: u64,
    pub bitrate: u32,
    pub verbosity: Verbosity,
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let verbosity = if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let args = AppArgs {
        bind: pargs
            .opt_value_from_str("--bind")?
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        port: pargs.opt_value_from_str("--port")?.unwrap_or(8765),
        cycle_us: pargs.opt_value_from_str("--cycle-us")?.unwrap_or(1000),
        bitrate: pargs.opt_value_from_str("--bitrate")?.unwrap_or(115_200),
        verbosity,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}
