use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use sercom::cli::Cli;
use sercom::config::{self, Config};
use sercom::encoding::EncodingKind;
use sercom::link;
use sercom::logging;
use sercom::session::{self, Session};
use sercom::shell::{snippets, CommandTable, Repl};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose, cli.quiet) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let baud = cli.baud.unwrap_or_else(|| config.baud());

    // Local files first, so a bad path never touches the device.
    let mut sources = Vec::with_capacity(cli.read.len());
    for path in &cli.read {
        info!("< {}", path.display());
        sources.push(session::open_read_source(path, EncodingKind::Plain)?);
    }
    let mut sinks = Vec::with_capacity(cli.write.len());
    for path in &cli.write {
        info!("> {}", path.display());
        sinks.push(session::open_write_sink(path, false)?);
    }

    let link = link::open(&cli.device, baud)?;
    info!("Opened {}, {} baud.", cli.device, baud);

    let mut session = Session::new(link, cli.device.clone())?
        .with_transfer_config(config.transfer.to_transfer_config());
    for source in sources {
        session.add_source(source);
    }
    for sink in sinks {
        session.add_sink(sink);
    }

    if cli.use_stdio() {
        session.attach_stdio();
        if session.is_interactive() {
            info!("Hit 'Ctrl-A q' to exit, 'Ctrl-A :' for commands.");
        }
    }

    session
        .stop_signal()
        .install_handler()
        .context("failed to install signal handler")?;

    let snippet_dir = cli
        .snippets
        .as_deref()
        .map(config::expand_tilde)
        .or_else(|| config.snippet_dir());
    let found = match &snippet_dir {
        Some(dir) => snippets::discover(dir)
            .with_context(|| format!("failed to read snippets from {}", dir.display()))?,
        None => Vec::new(),
    };
    debug!("{} snippet(s) registered", found.len());

    let encoding = cli.encoding.unwrap_or(config.transfer.encoding);
    let mut repl = Repl::new(CommandTable::new(found).with_default_encoding(encoding));

    let exit = session.run(&mut repl)?;
    debug!("exit: {:?}", exit);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config.as_deref().map(config::expand_tilde).or_else(config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}
