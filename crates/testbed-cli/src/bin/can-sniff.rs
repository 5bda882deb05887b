//! can-sniff - capture, filter and replay CAN frames
//!
//! Streams every included frame as a numbered row and accepts console
//! commands on stdin (`help` lists them). A replay runs alongside capture
//! and can be cancelled at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use testbed_attack::{Injector, ReplayRequest, SniffSession, MAX_INJECTIONS, REPLAY_FREQUENCIES};
use testbed_can::open_interface;
use testbed_cli::{
    init_logging, parse_id, ConsoleCommand, MessageRow, OutputContext, OutputFormat, SniffLine,
};
use testbed_core::MessageRegistry;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Rows printed per refresh; the rest wait in the queue
const ROWS_PER_REFRESH: usize = 200;
const REFRESH: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "can-sniff")]
#[command(author, version, about = "CAN sniffer and replay tool for the testbed")]
struct Cli {
    /// CAN interface to open
    #[arg(short, long, env = "TESTBED_CAN_INTERFACE", default_value = "vcan0")]
    interface: String,

    /// Attached through the OBD-II port (display only)
    #[arg(long = "use-odb2")]
    use_odb2: bool,

    /// Only capture these ids (hex); default is every known id
    #[arg(long = "id", value_parser = parse_id_arg)]
    ids: Vec<u32>,

    /// Show whole payloads instead of 5-character previews
    #[arg(long)]
    full: bool,

    /// Output format for captured rows
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_id_arg(s: &str) -> Result<u32, String> {
    parse_id(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let out = OutputContext::new(cli.output, cli.no_color, false);

    let transport = open_interface(&cli.interface)
        .await
        .with_context(|| format!("Cannot open {}. Is the CAN interface up?", cli.interface))?;

    let mut session = SniffSession::new(transport.clone());
    if cli.ids.is_empty() {
        session.select_all(true);
    } else {
        for id in &cli.ids {
            session.set_filter(*id, true);
        }
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    out.info(&format!(
        "Sniffing {} via {}. Type 'help' for commands.",
        session.interface(),
        if cli.use_odb2 { "OBD-II port" } else { "bus clip" }
    ));
    session.start()?;

    let mut full = cli.full;
    let mut injector: Option<Injector> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(REFRESH);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<ConsoleCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        out.warn(&e.to_string());
                        continue;
                    }
                };
                match command {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Pause => {
                        session.stop().await;
                        out.info("Capture paused");
                    }
                    ConsoleCommand::Resume => match session.restart().await {
                        Ok(()) => out.info("Capture resumed"),
                        Err(e) => out.error(&e.to_string()),
                    },
                    ConsoleCommand::Include(id) => session.set_filter(id, true),
                    ConsoleCommand::Exclude(id) => session.set_filter(id, false),
                    ConsoleCommand::SelectAll => session.select_all(true),
                    ConsoleCommand::SelectNone => session.select_all(false),
                    ConsoleCommand::Full(on) => full = on,
                    ConsoleCommand::Ids => {
                        let rows: Vec<MessageRow> =
                            MessageRegistry::global().iter().map(MessageRow::from).collect();
                        out.print(&rows);
                    }
                    ConsoleCommand::Help => print_help(&out),
                    ConsoleCommand::Cancel => match injector.take() {
                        Some(running) => {
                            running.cancel();
                            finish_replay(&out, running).await;
                        }
                        None => out.warn("No replay running"),
                    },
                    ConsoleCommand::Replay { id, frequency, count, data } => {
                        if injector.as_ref().is_some_and(|i| !i.is_finished()) {
                            out.warn("A replay is already running; 'cancel' it first");
                            continue;
                        }
                        match ReplayRequest::parse(&id, &data, &frequency, &count) {
                            Ok(request) => {
                                out.info(&format!(
                                    "Replaying {} x{} at {} Hz",
                                    request.frame, request.count, request.frequency_hz
                                ));
                                injector = Some(Injector::start(transport.clone(), request));
                            }
                            Err(e) => out.error(&e.to_string()),
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                if interrupted.load(Ordering::SeqCst) {
                    break;
                }
                for row in session.drain(ROWS_PER_REFRESH) {
                    match out.format {
                        OutputFormat::Table => println!("{}", SniffLine::from_row(&row, full).render()),
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::to_string(&row).unwrap_or_default()
                        ),
                    }
                }
                if injector.as_ref().is_some_and(|i| i.is_finished()) {
                    if let Some(done) = injector.take() {
                        finish_replay(&out, done).await;
                    }
                }
            }
        }
    }

    if let Some(running) = injector.take() {
        running.cancel();
        finish_replay(&out, running).await;
    }
    session.stop().await;
    out.info(&format!("{} frames captured", session.captured()));
    Ok(())
}

async fn finish_replay(out: &OutputContext, injector: Injector) {
    let requested = injector.request().count;
    match injector.join().await {
        Ok(sent) => out.success(&format!("Replay finished: {sent}/{requested} frames sent")),
        Err(e) => out.error(&format!("Replay failed: {e}")),
    }
}

fn print_help(out: &OutputContext) {
    let rates: Vec<String> = REPLAY_FREQUENCIES.iter().map(|f| f.to_string()).collect();
    out.info(&format!(
        "\
pause | resume                 stop / restart capture
include <id> | exclude <id>    toggle one id
all | none                     select every known id / clear the filter
replay <id> <hz> <count> <data...>
                               hz one of {}, count 1..={}
cancel                         stop the running replay
full | short                   whole payloads / previews
ids                            list known ids
quit",
        rates.join("/"),
        MAX_INJECTIONS
    ));
}
