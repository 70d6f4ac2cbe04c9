use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;

use kebap::cli::{self, ScriptInput};
use kebap::config::DriverConfig;
use kebap::script::list::List;
use kebap::script::{Interpreter, SessionOutcome, Value};

/// Environment variable holding the log filter (`tracing_subscriber` syntax).
const LOG_VAR: &str = "KEBAP_LOG";

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Ok(filter) = std::env::var(LOG_VAR) {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::new(filter))
            .init();
    }
}

/// Running totals across every source the driver executes.
#[derive(Default)]
struct Status {
    errors: usize,
    exit: Option<i64>,
}

impl Status {
    fn absorb(&mut self, outcome: SessionOutcome) {
        self.errors += outcome.errors;
        if self.exit.is_none() {
            self.exit = outcome.exit;
        }
    }

    fn done(&self) -> bool {
        self.exit.is_some()
    }
}

fn run(interp: &mut Interpreter, status: &mut Status, name: &str, text: &str) {
    let outcome = interp.run_session(name, text, &mut io::stderr());
    status.absorb(outcome);
}

/// Read statements from an interactive terminal, one complete chunk at a
/// time.  Errors are reported but do not affect the exit code.
fn interactive(interp: &mut Interpreter, status: &mut Status, quiet: bool) -> io::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut chunk = String::new();
    loop {
        if !quiet {
            print!("{}", if chunk.is_empty() { "> " } else { "... " });
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else { break };
        chunk.push_str(&line?);
        chunk.push('\n');
        if !interp.is_complete(&chunk) {
            continue;
        }
        let outcome = interp.run_session("<stdin>", &chunk, &mut io::stderr());
        chunk.clear();
        if outcome.exit.is_some() {
            status.exit = outcome.exit;
            break;
        }
    }
    if !chunk.trim().is_empty() && !status.done() {
        run(interp, status, "<stdin>", &chunk);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("kebap: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };
    init_tracing();

    let config = DriverConfig::resolve(&args);
    let mut interp = Interpreter::new();
    interp.set_include_path(config.include_path.clone());
    let argv = List::from_values(args.script_args.iter().map(|a| Value::from(a.as_str())));
    if let Err(e) = interp.set_global("argv", Value::List(argv)) {
        eprintln!("kebap: {e}");
        return ExitCode::FAILURE;
    }

    let mut status = Status::default();

    // ── Startup file ──────────────────────────────────────────────────────────
    match config.read_startup() {
        Ok(Some((path, text))) => run(&mut interp, &mut status, &path.display().to_string(), &text),
        Ok(None) => {}
        Err(e) => eprintln!("kebap: warning: {e}"),
    }

    // ── -e statements ─────────────────────────────────────────────────────────
    for stmt in &args.statements {
        if status.done() {
            break;
        }
        run(&mut interp, &mut status, "-e", stmt);
    }

    // ── Main program ──────────────────────────────────────────────────────────
    if !status.done() {
        match &args.input {
            ScriptInput::File(path) => match std::fs::read_to_string(path) {
                Ok(text) => run(&mut interp, &mut status, &path.display().to_string(), &text),
                Err(e) => {
                    eprintln!("kebap: {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            },
            // `-e` alone runs without reading stdin.
            ScriptInput::Stdin if !args.statements.is_empty() && args.script_args.is_empty() => {}
            ScriptInput::Stdin => {
                let is_tty = unsafe { libc::isatty(libc::STDIN_FILENO) != 0 };
                if is_tty {
                    let errors_before = status.errors;
                    if let Err(e) = interactive(&mut interp, &mut status, args.quiet) {
                        eprintln!("kebap: {e}");
                    }
                    status.errors = errors_before;
                } else {
                    let mut text = String::new();
                    if let Err(e) = io::stdin().read_to_string(&mut text) {
                        eprintln!("kebap: stdin: {e}");
                        return ExitCode::FAILURE;
                    }
                    run(&mut interp, &mut status, "<stdin>", &text);
                }
            }
        }
    }

    match status.exit {
        Some(code) => ExitCode::from((code & 0xff) as u8),
        None if status.errors > 0 => ExitCode::FAILURE,
        None => ExitCode::SUCCESS,
    }
}
