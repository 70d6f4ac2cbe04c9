//! Command-line argument parsing.
//!
//! Usage:
//!   kebap [-e<stmt>] [-I<dir>] [-f[<rcfile>]] [-q] [<script> [<args>…]]
//!
//! Options end at the first positional argument: everything after the
//! script name is passed to the script untouched.

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Statements to run before the script (`-e<stmt>`, repeatable).
    pub statements: Vec<String>,
    /// Extra include directories (`-I<dir>`, repeatable).
    pub include_dirs: Vec<PathBuf>,
    /// Which startup file to load.
    pub startup: StartupFile,
    /// No prompt in interactive mode (`-q`).
    pub quiet: bool,
    /// What to run after the startup file and `-e` statements.
    pub input: ScriptInput,
    /// Arguments after the script name, exposed as `argv`.
    pub script_args: Vec<String>,
}

/// How to choose the startup file.
#[derive(Debug, Default, PartialEq)]
pub enum StartupFile {
    /// `KEBAP_RC`, then `~/.kebaprc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: no startup file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the main program comes from.
#[derive(Debug, Default, PartialEq)]
pub enum ScriptInput {
    /// Standard input (no positional args, or `-`).
    #[default]
    Stdin,
    /// A script file.
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            break;
        }

        // First positional argument: the script.
        if !arg.starts_with('-') || arg == "-" {
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'q' => args.quiet = true,

                // -f[<file>]; the file must be attached.
                'f' => {
                    args.startup = if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        StartupFile::Explicit(PathBuf::from(file))
                    } else {
                        StartupFile::Skip
                    };
                }

                // -e<stmt> or -e <stmt>
                'e' => {
                    let stmt = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-e requires a statement argument".to_owned());
                    };
                    args.statements.push(stmt);
                }

                // -I<dir> or -I <dir>
                'I' => {
                    let dir = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-I requires a directory argument".to_owned());
                    };
                    args.include_dirs.push(PathBuf::from(dir));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if let Some(script) = argv.get(i) {
        if script != "-" {
            args.input = ScriptInput::File(PathBuf::from(script));
        }
        args.script_args = argv[i + 1..].to_vec();
    }

    Ok(args)
}

/// One-line usage summary for error messages.
pub const USAGE: &str = "Usage: kebap [-e<stmt>] [-I<dir>] [-f[<rcfile>]] [-q] [<script> [<args>...]]";

// ── Tests ─────────────────────────────────────────────────────────────────────
