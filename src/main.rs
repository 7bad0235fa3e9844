use clap::Parser;
use crossbeam_channel::unbounded;
use log::{error, info};
use std::time::Duration;
use tokio::sync::broadcast;

use type2_tag::config::{self, Cli, Command, ServiceConfig};
use type2_tag::page_store::MemoryTag;
use type2_tag::types::{NfcCommand, OutgoingMessage};
use type2_tag::{cards, nfc_service, ws};

// NTAG213-sized image: pages 0x00-0x2B answer, 0x2C does not
const DEMO_UID: [u8; 7] = [0x04, 0xA2, 0x4B, 0x1A, 0x6C, 0x5D, 0x80];
const DEMO_PAGES: usize = 0x2C;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    config::init_logging(cli.debug);

    match cli.command {
        Command::Demo { url } => {
            if let Err(err) = demo(&url) {
                error!("Demo failed: {}", err);
                std::process::exit(1);
            }
        }
        Command::Serve(config) if config.once => once(&config),
        Command::Serve(config) => serve(config).await,
    }
}

fn demo(url: &str) -> type2_tag::Result<()> {
    let mut tag = MemoryTag::new(DEMO_UID, DEMO_PAGES);
    cards::write_url(&mut tag, url, Duration::ZERO)?;
    info!("{} page writes", tag.writes().len());

    let report = cards::analyze_tag(&mut tag)?;
    println!("{}", report);
    Ok(())
}

/// Read one card and exit, non-zero when the action failed.
fn once(config: &ServiceConfig) {
    info!("Running in one-shot mode - will handle one card and exit");
    let msg = match nfc_service::run_once(config) {
        Ok(msg) => msg,
        Err(err) => {
            error!("Reading a card failed: {}", err);
            std::process::exit(1);
        }
    };

    match &msg {
        OutgoingMessage::TagAnalysis { report } => println!("{}", report),
        other => match serde_json::to_string_pretty(other) {
            Ok(json) => println!("{}", json),
            Err(err) => error!("Cannot render result: {}", err),
        },
    }
    if matches!(
        msg,
        OutgoingMessage::DataWriteError { .. } | OutgoingMessage::ReaderError { .. }
    ) {
        std::process::exit(1);
    }
}

async fn serve(config: ServiceConfig) {
    info!("Starting NFC Type 2 tag service...");
    let addr = config.addr();

    // WS -> NFC commands. Crossbeam because the NFC thread blocks
    let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();

    // NFC -> WS events, fanned out to clients
    let (event_tx, event_rx) = broadcast::channel::<OutgoingMessage>(100);

    std::thread::spawn(move || {
        // Bridge the blocking NFC thread into the broadcast channel
        let (bridge_tx, bridge_rx) = unbounded::<OutgoingMessage>();

        std::thread::spawn(move || {
            nfc_service::run(config, bridge_tx, cmd_rx);
        });

        while let Ok(msg) = bridge_rx.recv() {
            let _ = event_tx.send(msg);
        }
    });

    ws::start_server(addr, cmd_tx, event_rx).await;
}
