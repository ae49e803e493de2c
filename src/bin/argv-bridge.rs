use argv_bridge::{
    init_logging, BridgeConfig, LibraryEntry, LogFormat, MarshalError, Marshaller,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};

// sysexits.h; process statuses are a single byte, so the sentinels can't be used here.
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_UNAVAILABLE: u8 = 69;
const EX_SOFTWARE: u8 = 70;
const EX_OSERR: u8 = 71;
const EX_CONFIG: u8 = 78;

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    library: Option<PathBuf>,
    symbol: Option<String>,
    json_logs: bool,
    // Kept as raw OS strings; encoding is checked by the marshaller.
    forwarded: Vec<OsString>,
}

impl CliArgs {
    fn parse(args: &[OsString]) -> Result<Self, String> {
        let prog = args
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "argv-bridge".to_string());
        let mut parsed = Self::default();
        let mut rest = args.iter().skip(1);

        while let Some(arg) = rest.next() {
            match arg.to_str() {
                Some("--help" | "-h") => return Err(Self::usage(&prog)),
                Some("--config") => parsed.config = Some(PathBuf::from(Self::value(&mut rest, "--config")?)),
                Some("--library") => parsed.library = Some(PathBuf::from(Self::value(&mut rest, "--library")?)),
                Some("--symbol") => {
                    let symbol = Self::value(&mut rest, "--symbol")?
                        .into_string()
                        .map_err(|_| "--symbol must be valid UTF-8".to_string())?;
                    parsed.symbol = Some(symbol);
                }
                Some("--json-logs") => parsed.json_logs = true,
                Some("--") => {
                    parsed.forwarded.extend(rest.by_ref().cloned());
                    break;
                }
                _ => {
                    return Err(format!(
                        "Unknown option: {}\n\n{}",
                        arg.to_string_lossy(),
                        Self::usage(&prog)
                    ))
                }
            }
        }

        if parsed.forwarded.is_empty() {
            return Err(format!("No runtime arguments given\n\n{}", Self::usage(&prog)));
        }

        Ok(parsed)
    }

    fn value<'a>(rest: &mut impl Iterator<Item = &'a OsString>, flag: &str) -> Result<OsString, String> {
        rest.next()
            .cloned()
            .ok_or_else(|| format!("{} requires a value", flag))
    }

    fn usage(prog: &str) -> String {
        format!(
            "argv-bridge - start an embedded runtime with a packed argv\n\n\
            USAGE:\n    {} [OPTIONS] -- <ARG0> [ARGS...]\n\n\
            OPTIONS:\n    \
            -h, --help          Print help information\n    \
            --config <FILE>     TOML configuration (default: $ARGV_BRIDGE_CONFIG)\n    \
            --library <PATH>    Shared library exporting the entry point\n    \
            --symbol <NAME>     Entry point symbol (default: node_start)\n    \
            --json-logs         Emit JSON logs\n\n\
            EXAMPLES:\n    \
            {} --library ./libnode.so -- node --version\n    \
            {} --config bridge.toml -- node server.js",
            prog, prog, prog
        )
    }
}

fn load_config(args: &CliArgs) -> Result<BridgeConfig, String> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path),
        None => BridgeConfig::discover(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(library) = &args.library {
        config.runtime.library = Some(library.clone());
    }
    if let Some(symbol) = &args.symbol {
        config.runtime.symbol = symbol.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();

    let args = match CliArgs::parse(&argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EX_USAGE);
        }
    };

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EX_CONFIG);
        }
    };

    let log_config = match config.log_config() {
        Ok(c) if args.json_logs => c.with_format(LogFormat::Json),
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EX_CONFIG);
        }
    };
    let _guard = init_logging(log_config);

    debug!(config = %config.to_json(), "configuration loaded");

    // Arguments are checked before anything is loaded.
    let mut marshaller = Marshaller::with_limits(config.limits());
    let packed = match marshaller.pack(&args.forwarded) {
        Ok(packed) => packed,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(marshal_exit_code(&e));
        }
    };

    let Some(library) = config.runtime.library.clone() else {
        error!("no runtime library configured");
        eprintln!("No runtime library given (use --library or [runtime] library)");
        return ExitCode::from(EX_UNAVAILABLE);
    };

    // SAFETY: the operator names a symbol with the `int (*)(int, char**)` signature.
    let mut entry = match unsafe { LibraryEntry::open(&library, &config.runtime.symbol) } {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EX_UNAVAILABLE);
        }
    };

    info!(
        library = %library.display(),
        symbol = entry.symbol(),
        argc = packed.argc(),
        "launching embedded runtime"
    );

    match marshaller.invoke(packed, &mut entry) {
        // Statuses outside 0..=255 are truncated by the OS anyway.
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(marshal_exit_code(&e))
        }
    }
}

fn marshal_exit_code(err: &MarshalError) -> u8 {
    match err {
        MarshalError::Allocation(_) => EX_OSERR,
        MarshalError::Conversion(_) | MarshalError::SourceChanged { .. } => EX_DATAERR,
        MarshalError::Reused { .. } => EX_SOFTWARE,
    }
}
