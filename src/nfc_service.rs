// src/nfc_service.rs
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use pcsc::{Card, Context, PNP_NOTIFICATION, Protocols, ReaderState, Scope, ShareMode, State};
use std::ffi::{CStr, CString};
use std::time::Duration;

use crate::apdu::PcscTag;
use crate::cards;
use crate::config::ServiceConfig;
use crate::error::{Result, TransportError};
use crate::format;
use crate::page_store::PageStore;
use crate::types::{NfcCommand, OutgoingMessage, TagAction};

/// Status-change failures in a row before the context is rebuilt.
pub const MAX_STATUS_FAILURES: u32 = 3;

/// Whether the PC/SC context should be re-established after `failures`
/// consecutive status-change errors, the latest being `err`.
pub fn needs_recovery(err: pcsc::Error, failures: u32) -> bool {
    match err {
        pcsc::Error::Timeout => false,
        // pcscd restarted or the context went away: waiting will not help
        pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::InvalidHandle => true,
        _ => failures >= MAX_STATUS_FAILURES,
    }
}

pub fn run(config: ServiceConfig, tx: Sender<OutgoingMessage>, rx: Receiver<NfcCommand>) {
    info!("Starting NFC Service (Event Driven)...");

    let mut ctx = match Context::establish(Scope::User) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to establish context: {}", err);
            let _ = tx.send(OutgoingMessage::ReaderError {
                error: err.to_string(),
            });
            return;
        }
    };

    let mut readers_buf = [0; 2048];
    let mut reader_names: Vec<CString> = Vec::new();
    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];
    let mut status_failures = 0;

    loop {
        // 1. Wait for State Change
        match ctx.get_status_change(Duration::from_millis(500), &mut reader_states) {
            Ok(()) | Err(pcsc::Error::Timeout) => status_failures = 0,
            Err(err) => {
                error!("PCSC Error: {}", err);
                status_failures += 1;
                if needs_recovery(err, status_failures) {
                    match recover_context(&mut readers_buf, &mut reader_names, &mut reader_states) {
                        Ok(fresh) => {
                            ctx = fresh;
                            status_failures = 0;
                            let _ = tx.send(OutgoingMessage::ReaderStatus {
                                success: !reader_names.is_empty(),
                            });
                        }
                        Err(err) => {
                            warn!("Reader recovery failed: {}", err);
                            let _ = tx.send(OutgoingMessage::ReaderError {
                                error: format!("Reader recovery failed: {}", err),
                            });
                        }
                    }
                }
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        }

        // 2. Commands from clients
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                NfcCommand::CheckReaderStatus => {
                    refresh_readers(&ctx, &mut readers_buf, &mut reader_names);
                    let _ = tx.send(OutgoingMessage::ReaderStatus {
                        success: !reader_names.is_empty(),
                    });
                }
                NfcCommand::Tag(action) => {
                    info!("Received command: {:?}", action);
                    handle_tag_command(&ctx, &reader_names, &action, &config, &tx);
                }
            }
        }

        // 3. Reader and card events
        let mut readers_changed = false;

        if reader_states[0].event_state().intersects(State::CHANGED) {
            info!("Hardware change detected");
            readers_changed = true;
            reader_states[0].sync_current_state();
        }

        for i in 1..reader_states.len() {
            let Some(name) = reader_names.get(i - 1).cloned() else {
                continue;
            };
            let rs = &reader_states[i];

            if rs.event_state().intersects(State::CHANGED) {
                let current = rs.event_state();

                if current.intersects(State::PRESENT)
                    && !rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Inserted on {:?}", name);
                    handle_card_insertion(&ctx, &name, &config, &tx);
                }

                if current.intersects(State::EMPTY) && rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Removed from {:?}", name);
                    let _ = tx.send(OutgoingMessage::CardStatus {
                        success: false,
                        message: "Card removed!".into(),
                        uid: None,
                    });
                }

                reader_states[i].sync_current_state();
            }
        }

        // 4. Rebuild the watched reader list
        if readers_changed {
            refresh_readers(&ctx, &mut readers_buf, &mut reader_names);
            // Keep the PnP entry at index 0
            reader_states.truncate(1);
            for name in &reader_names {
                reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
            }
            let _ = tx.send(OutgoingMessage::ReaderStatus {
                success: !reader_names.is_empty(),
            });
        }
    }
}

fn refresh_readers(ctx: &Context, readers_buf: &mut [u8], reader_names: &mut Vec<CString>) {
    match ctx.list_readers(readers_buf) {
        Ok(iter) => *reader_names = iter.map(CString::from).collect(),
        Err(err) => {
            debug!("No readers listed: {}", err);
            reader_names.clear();
        }
    }
}

/// Fresh context with the reader list and watched states rebuilt from scratch.
fn recover_context(
    readers_buf: &mut [u8],
    reader_names: &mut Vec<CString>,
    reader_states: &mut Vec<ReaderState>,
) -> std::result::Result<Context, pcsc::Error> {
    info!("Attempting to recover reader connection...");
    let ctx = Context::establish(Scope::User)?;
    refresh_readers(&ctx, readers_buf, reader_names);

    reader_states.clear();
    reader_states.push(ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE));
    for name in reader_names.iter() {
        reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
    }
    info!("Recovered reader connection ({} readers)", reader_names.len());
    Ok(ctx)
}

/// Wait for a card on any reader, run the configured insert action on it once
/// and return the outcome.
pub fn run_once(config: &ServiceConfig) -> Result<OutgoingMessage> {
    let ctx = Context::establish(Scope::User).map_err(TransportError::from)?;

    let mut readers_buf = [0; 2048];
    let mut reader_names = Vec::new();
    refresh_readers(&ctx, &mut readers_buf, &mut reader_names);
    if reader_names.is_empty() {
        return Err(TransportError::from(pcsc::Error::NoReadersAvailable).into());
    }

    let mut reader_states: Vec<ReaderState> = reader_names
        .iter()
        .map(|name| ReaderState::new(name.clone(), State::UNAWARE))
        .collect();

    info!("Waiting for a card on {} reader(s)...", reader_names.len());
    loop {
        ctx.get_status_change(None, &mut reader_states)
            .map_err(TransportError::from)?;

        for rs in reader_states.iter_mut() {
            if rs.event_state().intersects(State::PRESENT) {
                info!("Card present on {:?}", rs.name());
                let card = connect(&ctx, rs.name(), config).map_err(TransportError::from)?;
                let mut tag = PcscTag::new(&card);
                let action = TagAction::from(config.on_insert);
                return Ok(perform(&mut tag, &action, config, cards::FORMAT_SETTLE));
            }
            rs.sync_current_state();
        }
    }
}

/// Connect to the card on `reader`, retrying while the tag settles in the field.
fn connect(ctx: &Context, reader: &CStr, config: &ServiceConfig) -> Result<Card, pcsc::Error> {
    let mut attempt = 1;
    loop {
        match ctx.connect(reader, ShareMode::Shared, Protocols::ANY) {
            Ok(card) => return Ok(card),
            Err(err) if attempt < config.connect_retries => {
                debug!("Connect attempt {} on {:?} failed: {}", attempt, reader, err);
                attempt += 1;
                std::thread::sleep(config.retry_delay());
            }
            Err(err) => return Err(err),
        }
    }
}

fn handle_card_insertion(
    ctx: &Context,
    reader_name: &CStr,
    config: &ServiceConfig,
    tx: &Sender<OutgoingMessage>,
) {
    let card = match connect(ctx, reader_name, config) {
        Ok(card) => card,
        Err(err) => {
            error!("Failed to connect to card: {}", err);
            let _ = tx.send(OutgoingMessage::CardStatus {
                success: false,
                message: format!("Card detected but connection failed: {}", err),
                uid: None,
            });
            return;
        }
    };

    let mut tag = PcscTag::new(&card);
    let uid = tag.uid().ok().map(|uid| config.uid_format.format(&uid));
    let _ = tx.send(OutgoingMessage::CardStatus {
        success: true,
        message: "Card detected!".into(),
        uid,
    });

    let action = TagAction::from(config.on_insert);
    if action != TagAction::Uid {
        let _ = tx.send(perform(&mut tag, &action, config, cards::FORMAT_SETTLE));
    }
}

fn handle_tag_command(
    ctx: &Context,
    reader_names: &[CString],
    action: &TagAction,
    config: &ServiceConfig,
    tx: &Sender<OutgoingMessage>,
) {
    if reader_names.is_empty() {
        let _ = tx.send(OutgoingMessage::ReaderError {
            error: "No reader connected".into(),
        });
        return;
    }

    // First reader with a card on it
    for name in reader_names {
        if let Ok(card) = ctx.connect(name, ShareMode::Shared, Protocols::ANY) {
            let mut tag = PcscTag::new(&card);
            let _ = tx.send(perform(&mut tag, action, config, cards::FORMAT_SETTLE));
            return;
        }
    }

    let _ = tx.send(OutgoingMessage::ReaderError {
        error: "No card found on reader".into(),
    });
}

/// Run one action against a connected tag and describe the outcome for clients.
pub fn perform<S: PageStore + ?Sized>(
    store: &mut S,
    action: &TagAction,
    config: &ServiceConfig,
    settle: Duration,
) -> OutgoingMessage {
    match action {
        TagAction::Analyze => match cards::analyze_tag(store) {
            Ok(report) => {
                info!("\n{}", report);
                OutgoingMessage::TagAnalysis {
                    report: Box::new(report),
                }
            }
            Err(err) => OutgoingMessage::ReaderError {
                error: format!("Tag analysis failed: {}", err),
            },
        },
        TagAction::Format => match format::format_tag(store) {
            Ok(()) => OutgoingMessage::DataWriteSuccess {
                message: "Tag formatted".into(),
                url: None,
            },
            Err(err) => OutgoingMessage::DataWriteError {
                error: err.to_string(),
            },
        },
        TagAction::WriteUrl(url) => match cards::write_url(store, url, settle) {
            Ok(()) => OutgoingMessage::DataWriteSuccess {
                message: "Data Written Successfully!".into(),
                url: Some(url.clone()),
            },
            Err(err) => OutgoingMessage::DataWriteError {
                error: err.to_string(),
            },
        },
        TagAction::Provision => match cards::provision_url(store, &config.base_url, settle) {
            Ok(url) => OutgoingMessage::DataWriteSuccess {
                message: "Tag provisioned".into(),
                url: Some(url),
            },
            Err(err) => OutgoingMessage::DataWriteError {
                error: err.to_string(),
            },
        },
        TagAction::Uid => match store.uid() {
            Ok(uid) => OutgoingMessage::CardStatus {
                success: true,
                message: "Card UID".into(),
                uid: Some(config.uid_format.format(&uid)),
            },
            Err(err) => {
                warn!("UID read failed: {}", err);
                OutgoingMessage::ReaderError {
                    error: err.to_string(),
                }
            }
        },
    }
}
