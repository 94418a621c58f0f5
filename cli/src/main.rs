//! Folio Gate CLI - admin sign-in from a terminal.
//!
//! # Commands
//!
//! - `folio-gate hash-password`: Print the hash to put in `FOLIO_ADMIN_PASSWORD_HASH`
//! - `folio-gate totp-setup`: Generate a TOTP secret and provisioning URI
//! - `folio-gate totp-code`: Print the current code for a secret
//! - `folio-gate login`: Sign in and keep the session token on disk
//! - `folio-gate status`: Validate the stored session (`--quick` skips the
//!   signature check and needs no configuration)
//! - `folio-gate logout`: Remove the stored session
//!
//! # Environment Variables
//!
//! `login` and `status` read the same variables as the server (see
//! [`folio_gate::config`]). The session file lives in `FOLIO_GATE_DIR`
//! (default `~/.folio-gate`).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::BaseDirs;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use folio_gate::config::Config;
use folio_gate::gate::{hash_password, LoginOutcome, RejectReason};
use folio_gate::session::{AdminSession, SessionState};
use folio_gate::store::{FileTokenStore, TokenStore};
use folio_gate::token::TokenAuthority;
use folio_gate::totp::{TotpSetup, TotpVerifier, DEFAULT_ACCOUNT, DEFAULT_ISSUER};

/// Default session directory name relative to home.
const DEFAULT_GATE_DIR: &str = ".folio-gate";

/// Environment variable overriding the session directory.
const GATE_DIR_ENV: &str = "FOLIO_GATE_DIR";

/// Folio Gate - admin sessions for a personal site.
#[derive(Parser, Debug)]
#[command(name = "folio-gate")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    FOLIO_ADMIN_PASSWORD_HASH  SHA-256 of the admin password (required for 'login', 'status')
    FOLIO_TOTP_SECRET          Base32 TOTP secret (enables the code prompt)
    FOLIO_GATE_DIR             Session directory (default: ~/.folio-gate)

EXAMPLES:
    # Configure the password
    export FOLIO_ADMIN_PASSWORD_HASH=$(folio-gate hash-password)

    # Enrol an authenticator app
    folio-gate totp-setup --account me@example.com

    # Sign in, check, sign out
    folio-gate login
    folio-gate status
    folio-gate logout
")]
struct Cli {
    /// Directory holding the session file.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password read from stdin.
    ///
    /// Prints the lowercase hex SHA-256 expected in FOLIO_ADMIN_PASSWORD_HASH.
    HashPassword,

    /// Generate a new TOTP secret.
    ///
    /// Prints the secret and the otpauth:// URI to enrol in an authenticator.
    TotpSetup {
        /// Account label shown by the authenticator.
        #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
        account: String,

        /// Issuer label shown by the authenticator.
        #[arg(short, long, default_value = DEFAULT_ISSUER)]
        issuer: String,
    },

    /// Print the current TOTP code.
    TotpCode {
        /// Base32 secret (defaults to FOLIO_TOTP_SECRET).
        #[arg(short, long)]
        secret: Option<String>,

        /// Time steps to shift by (-1 for the previous code).
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },

    /// Sign in and store the session token.
    Login,

    /// Check the stored session.
    ///
    /// Exits with status 1 when signed out.
    Status {
        /// Only check the token's shape and age against the default 24h
        /// lifetime. Needs no configuration but proves nothing.
        #[arg(long)]
        quick: bool,
    },

    /// Remove the stored session.
    Logout,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::HashPassword => run_hash_password(&mut Terminal),
        Command::TotpSetup { account, issuer } => run_totp_setup(&account, &issuer),
        Command::TotpCode { secret, offset } => run_totp_code(secret, offset),
        Command::Login => run_login(&open_session(session_dir(cli.dir)?)?, &mut Terminal),
        Command::Status { quick: true } => run_quick_status(session_dir(cli.dir)?),
        Command::Status { quick: false } => run_status(session_dir(cli.dir)?),
        Command::Logout => run_logout(session_dir(cli.dir)?),
    }
}

/// Interactive input for the commands that ask questions.
trait Prompter {
    /// Reads a secret without echoing it.
    fn password(&mut self, label: &str) -> Result<String>;

    /// Reads a visible line.
    fn line(&mut self, label: &str) -> Result<String>;
}

/// Prompts on the controlling terminal.
struct Terminal;

impl Prompter for Terminal {
    fn password(&mut self, label: &str) -> Result<String> {
        rpassword::prompt_password(label).context("Failed to read password")
    }

    fn line(&mut self, label: &str) -> Result<String> {
        eprint!("{label}");
        io::stderr().flush()?;
        read_line(&mut io::stdin().lock())
    }
}

/// Runs the hash-password command.
fn run_hash_password(prompter: &mut impl Prompter) -> Result<ExitCode> {
    let password = prompter.password("Password: ")?;
    if password.is_empty() {
        bail!("password must not be empty");
    }
    println!("{}", hash_password(&password));
    Ok(ExitCode::SUCCESS)
}

/// Runs the totp-setup command.
fn run_totp_setup(account: &str, issuer: &str) -> Result<ExitCode> {
    let setup = TotpSetup::generate(account, issuer).context("Failed to generate secret")?;

    println!("Secret:");
    println!();
    println!("  {}", setup.secret.as_base32());
    println!();
    println!("Provisioning URI (render as a QR code or paste into the authenticator):");
    println!();
    println!("  {}", setup.uri);
    println!();
    println!("Once enrolled, configure the server with:");
    println!();
    println!(
        "  export FOLIO_TOTP_SECRET=\"{}\"",
        setup.secret.as_base32()
    );
    Ok(ExitCode::SUCCESS)
}

/// Runs the totp-code command.
fn run_totp_code(secret: Option<String>, offset: i64) -> Result<ExitCode> {
    let secret = match secret {
        Some(secret) => secret,
        None => std::env::var("FOLIO_TOTP_SECRET")
            .context("No --secret given and FOLIO_TOTP_SECRET is not set")?,
    };

    let code = TotpVerifier::default()
        .current_code(secret.trim(), offset)
        .context("Failed to compute code")?;
    println!("{code}");
    Ok(ExitCode::SUCCESS)
}

/// Runs the login command.
fn run_login(
    session: &AdminSession<FileTokenStore>,
    prompter: &mut impl Prompter,
) -> Result<ExitCode> {
    let password = prompter.password("Password: ")?;
    let Some(verified) = session.gate().check_password(&password) else {
        eprintln!("incorrect password");
        return Ok(ExitCode::from(1));
    };

    let code = if session.gate().totp_enabled() {
        Some(prompter.line("Authentication code: ")?)
    } else {
        None
    };

    let outcome = session
        .gate()
        .complete(verified, code.as_deref())
        .context("Failed to issue session token")?;

    match session.persist(outcome)? {
        LoginOutcome::Authenticated(_) => {
            print_state(&session.check()?);
            Ok(ExitCode::SUCCESS)
        }
        LoginOutcome::TotpRequired => {
            eprintln!("authentication code required");
            Ok(ExitCode::from(1))
        }
        LoginOutcome::Rejected(RejectReason::TotpCode) => {
            eprintln!("invalid authentication code");
            Ok(ExitCode::from(1))
        }
        LoginOutcome::Rejected(RejectReason::Password) => {
            eprintln!("incorrect password");
            Ok(ExitCode::from(1))
        }
    }
}

/// Runs the status command.
fn run_status(dir: PathBuf) -> Result<ExitCode> {
    let session = open_session(dir)?;
    let state = session.check()?;
    print_state(&state);

    Ok(if state.is_active() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Runs `status --quick`.
fn run_quick_status(dir: PathBuf) -> Result<ExitCode> {
    let store = FileTokenStore::new(&dir);
    if stored_token_looks_fresh(&store)? {
        println!("Session token present (not verified).");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Signed out.");
        Ok(ExitCode::from(1))
    }
}

/// Shape and age check of the stored token, without the signature.
fn stored_token_looks_fresh(store: &impl TokenStore) -> Result<bool> {
    let token = store.load().context("Failed to read session file")?;
    Ok(token.is_some_and(|token| TokenAuthority::default().looks_fresh(&token)))
}

/// Runs the logout command.
///
/// Needs no configuration: clearing the file is enough.
fn run_logout(dir: PathBuf) -> Result<ExitCode> {
    let store = FileTokenStore::new(&dir);
    store
        .clear()
        .with_context(|| format!("Failed to remove {}", store.path().display()))?;
    println!("Signed out.");
    Ok(ExitCode::SUCCESS)
}

fn open_session(dir: PathBuf) -> Result<AdminSession<FileTokenStore>> {
    let config = Config::from_env().context("Failed to load configuration")?;
    debug!(dir = %dir.display(), "Using session directory");
    Ok(AdminSession::new(
        Arc::new(config.gate()),
        FileTokenStore::new(&dir),
    ))
}

fn print_state(state: &SessionState) {
    match state {
        SessionState::Active {
            issued_at,
            expires_at,
        } => {
            println!("Signed in.");
            println!("  issued:  {issued_at}");
            println!("  expires: {expires_at}");
        }
        SessionState::SignedOut => println!("Signed out."),
    }
}

/// Reads one line, without its line ending.
fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        bail!("unexpected end of input");
    }
    Ok(input.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Initializes the logging subsystem. Quiet unless `RUST_LOG` says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Resolves the session directory: `--dir`, then `FOLIO_GATE_DIR`, then
/// `~/.folio-gate`.
fn session_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }

    if let Ok(path) = std::env::var(GATE_DIR_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
    Ok(base_dirs.home_dir().join(DEFAULT_GATE_DIR))
}
