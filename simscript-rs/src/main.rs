use std::process::ExitCode;

use simscript::cli::{self, USAGE};
use simscript::config::resolve_catalog;
use simscript::script::Interpreter;
use simscript::trace::init_tracing;
use tracing::{debug, warn};

// The script thread is a plain thread: the link owns its own runtime and
// blocks on handshakes, which must not happen inside an async context.
fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("simscript: {e}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.log_level());

    // Missing or unreadable scripts still exit 0.
    let Some(path) = args.script.as_deref() else {
        println!("No file");
        return ExitCode::SUCCESS;
    };
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read script");
            println!("File not found");
            return ExitCode::SUCCESS;
        }
    };

    let catalog = match resolve_catalog(args.catalog.as_deref()) {
        Ok((catalog, problems)) => {
            for p in problems {
                warn!("catalog {p}");
            }
            catalog
        }
        Err(e) => {
            eprintln!("simscript: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(entries = catalog.len(), "catalog loaded");

    let mut interp = Interpreter::new(catalog);
    let result = interp.run_source(&source);
    interp.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("simscript: {e}");
            ExitCode::FAILURE
        }
    }
}
