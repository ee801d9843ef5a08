use std::net::TcpListener;
use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

use braid::error::TrusteeError;
use braid::git::GitBulletinBoard;
use braid::protocol::Protocol;
use braid::settings::Settings;
use braid::trustee::Trustee;

const CYCLE_SLEEP: Duration = Duration::from_secs(5);

/// Runs one trustee against a bulletin board section, forever.
#[derive(Parser)]
#[command(name = "trustee-loop")]
struct Args {
    /// Board section to serve (repository name under the base uri)
    section: String,
}

fn main() {
    TermLogger::init(
        LevelFilter::Info,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("logger initialization");

    let args = Args::parse();
    if let Err(e) = run(&args.section) {
        error!("fatal: {}", e);
        exit(1);
    }
}

fn run(section: &str) -> Result<(), TrusteeError> {
    let settings = Settings::load_from_env()?;

    // a second instance on the same key material would race its sibling
    let _guard = singleton_guard(settings.singleton_port)?;

    let keys = settings.read_keys()?;
    let symmetric = settings.read_aes_key()?;
    let peers = settings.read_peers()?;
    let trustee = Trustee::new(keys, symmetric, peers, settings.offline_split);

    let (url, mirror) = settings.section_paths(section);
    info!("serving section [{}] at [{}]", section, url);
    let mut board = GitBulletinBoard::open(
        &url,
        &mirror,
        settings.git_no_compression,
        settings.git_remove_lock,
    )?;

    let protocol: Protocol<GitBulletinBoard> = Protocol::new(trustee);
    loop {
        match protocol.step(&mut board) {
            Ok(result) => {
                if let Some(msg) = result.stopped {
                    info!("cycle halted: {}", msg);
                } else if result.executed > 0 {
                    info!("cycle executed {} actions", result.executed);
                }
            }
            // transient failures are retried next cycle; the board
            // carries any posted errors
            Err(e) => error!("cycle failed: {}", e),
        }
        thread::sleep(CYCLE_SLEEP);
    }
}

fn singleton_guard(port: u16) -> Result<Option<TcpListener>, TrusteeError> {
    if port == 0 {
        return Ok(None);
    }
    let listener = TcpListener::bind(("127.0.0.1", port)).map_err(|e| {
        TrusteeError::Configuration(format!(
            "another instance appears to be running (port {}): {}",
            port, e
        ))
    })?;

    Ok(Some(listener))
}
