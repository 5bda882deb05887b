//! can-attack - launch canned CAN attacks against the testbed
//!
//! With attack names on the command line, runs them concurrently and exits
//! when all have finished. Without, lists the catalogue and reads attack
//! names from stdin, launching each one in the background.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use testbed_attack::{launch, Attack, AttackTarget};
use testbed_cli::{init_logging, AttackRow, OutputContext, OutputFormat};
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "can-attack")]
#[command(author, version, about = "CAN attack launcher for the testbed")]
struct Cli {
    /// The car runs the gateway mitigation (OBD2 attacks land on vcan1)
    #[arg(long, env = "TESTBED_USE_GATEWAY")]
    use_gateway: bool,

    /// Clip onto the bus directly instead of using the OBD-II port
    #[arg(long)]
    clipping: bool,

    /// List the attack catalogue and exit
    #[arg(short, long)]
    list: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Attacks to run (e.g. rpm, horn, fuzz)
    attacks: Vec<Attack>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let out = OutputContext::new(cli.output, cli.no_color, false);

    let target = AttackTarget {
        using_gateway: cli.use_gateway,
        using_obd2: !cli.clipping,
    };

    if cli.list {
        print_catalogue(&out);
        return Ok(());
    }

    if !cli.attacks.is_empty() {
        let handles: Vec<(Attack, JoinHandle<Option<usize>>)> = cli
            .attacks
            .iter()
            .map(|&attack| (attack, launch(attack, target)))
            .collect();
        let mut failed = false;
        for (attack, handle) in handles {
            failed |= !report(&out, attack, handle.await.ok().flatten());
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    interactive(&out, target).await
}

fn print_catalogue(out: &OutputContext) {
    let rows: Vec<AttackRow> = Attack::ALL.into_iter().map(AttackRow::from).collect();
    out.print(&rows);
}

fn report(out: &OutputContext, attack: Attack, sent: Option<usize>) -> bool {
    match sent {
        Some(frames) => {
            out.success(&format!("{attack}: done, {frames} frames sent"));
            true
        }
        None => {
            out.error(&format!("{attack}: failed (see log). Is the CAN interface up?"));
            false
        }
    }
}

async fn interactive(out: &OutputContext, target: AttackTarget) -> Result<()> {
    print_catalogue(out);
    out.info(&format!(
        "Attacking {} via {}. Type an attack name, 'list' or 'quit'.",
        target.interface(),
        if target.using_obd2 { "OBD-II port" } else { "bus clip" }
    ));

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    // stdin is read on a blocking thread so launched attacks keep running
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(|line| line.ok()) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut running: Vec<(Attack, JoinHandle<Option<usize>>)> = Vec::new();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(100));

    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                let line = line.trim();
                match line {
                    "" => {}
                    "quit" | "exit" | "q" => break,
                    "list" => print_catalogue(out),
                    name => match name.parse::<Attack>() {
                        Ok(attack) => {
                            out.info(&format!("{attack}: launched"));
                            running.push((attack, launch(attack, target)));
                        }
                        Err(e) => out.warn(&e.to_string()),
                    },
                }
                print!("> ");
                let _ = std::io::stdout().flush();
            }
            _ = ticker.tick() => {
                if interrupted.load(Ordering::SeqCst) {
                    break;
                }
                let mut still_running = Vec::with_capacity(running.len());
                for (attack, handle) in running.drain(..) {
                    if handle.is_finished() {
                        report(out, attack, handle.await.ok().flatten());
                    } else {
                        still_running.push((attack, handle));
                    }
                }
                running = still_running;
            }
        }
    }

    for (attack, handle) in running {
        out.warn(&format!("{attack}: aborted"));
        handle.abort();
    }
    Ok(())
}
