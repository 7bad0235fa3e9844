mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use type2_tag::cards::{self, StopReason};
use type2_tag::cc::CcKind;
use type2_tag::error::Error;
use type2_tag::format;
use type2_tag::ndef::{self, RecordPayload};
use type2_tag::page_store::{Operation, PageStore};
use type2_tag::tlv::{self, TlvEntry};
use type2_tag::topology::{self, TagFamily};
use type2_tag::types::{NdefRecord, Tnf};

use common::*;

#[test]
fn provisioned_tag_analyzes_back_to_its_url() {
    let mut tag = ntag213();
    let url = cards::provision_url(&mut tag, "https://dnd.qrand.me", Duration::ZERO).unwrap();
    assert_eq!(url, format!("https://dnd.qrand.me/r/{}", NXP_UID_HEX));

    let report = cards::analyze_tag(&mut tag).unwrap();
    assert_eq!(report.uid, NXP_UID_HEX);
    assert_eq!(report.profile.family, TagFamily::Ntag213);
    assert_eq!(report.capability.map(|cc| cc.kind()), Some(CcKind::Type2));
    assert_eq!(report.data_area.stop, StopReason::Terminator);
    assert_eq!(report.uris(), vec![url]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert!(report.scanned.is_none());

    let locks = report.locks.unwrap();
    assert!(locks.static_locks.locked_pages().is_empty());
    // 0x29 through 0x2C; the last one is past the end of an NTAG213
    assert_eq!(report.config_pages.len(), 4);
    assert!(report.config_pages[3].error.is_some());
}

#[test]
fn provisioning_writes_format_then_tlv() {
    let mut tag = ntag213();
    cards::write_url(&mut tag, "https://a.io", Duration::ZERO).unwrap();

    let writes = tag.writes();
    assert_eq!(writes[0], (0x02, [0x00, 0x00, 0x00, 0x00]));
    assert_eq!(writes[1], (0x03, [0xE1, 0x10, 0x3F, 0x00]));
    assert_eq!(writes[2], (0x04, [0x00, 0x00, 0x00, 0xFE]));
    // 03 09 | D1 01 05 55 04 'a' '.' 'i' 'o' | FE
    assert_eq!(writes[3], (0x04, [0x03, 0x09, 0xD1, 0x01]));
    assert_eq!(writes[4], (0x05, [0x05, 0x55, 0x04, b'a']));
    assert_eq!(writes[5], (0x06, [b'.', b'i', b'o', 0xFE]));
    assert_eq!(writes.len(), 6);
}

#[test]
fn formatter_failure_leaves_partial_state() {
    let mut tag = ntag213().with_fault(2);
    let result = format::format_tag(&mut tag);
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(tag.page(3), Some([0xE1, 0x10, 0x3F, 0x00]));
    assert_eq!(tag.page(4), Some([0x00; 4]));
}

#[test]
fn topology_for_every_family() {
    for (mut tag, family, top) in [
        (ntag213(), TagFamily::Ntag213, 0x2C),
        (ntag215(), TagFamily::Ntag215, 0x86),
        (ntag216(), TagFamily::Ntag216, 0xE7),
    ] {
        let profile = topology::detect(&mut tag);
        assert_eq!(profile.family, family);
        assert_eq!(profile.top_page, top);
    }
}

#[test]
fn ntag215_classified_from_boundary_reads() {
    let mut tag = ntag215();
    let profile = topology::detect(&mut tag);
    assert_eq!(profile.family, TagFamily::Ntag215);
    assert!(tag.operations.contains(&Operation::Read(0x2C)));
    assert!(tag.operations.contains(&Operation::Read(0x86)));
}

#[test]
fn tlv_decode_stops_at_terminator() {
    let entries: Vec<TlvEntry> = tlv::decode(&[0x03, 0x05, 1, 2, 3, 4, 5, 0xFE, 0x99], 0)
        .map(|(_, entry)| entry)
        .collect();
    assert_eq!(
        entries,
        vec![
            TlvEntry::NdefMessage {
                value: vec![1, 2, 3, 4, 5]
            },
            TlvEntry::Terminator
        ]
    );
}

#[test]
fn tlv_encode_rejects_255_bytes() {
    assert_eq!(tlv::wrap_in_tlv(&[0u8; 255]), Err(Error::UnsupportedLength(255)));
}

#[test]
fn uri_record_message_decodes() {
    let mut bytes = vec![0xD1, 0x01, 0x0C, 0x55, 0x04];
    bytes.extend_from_slice(b"example.com");
    let decoded = ndef::decode_message(&bytes);
    assert!(decoded.is_clean());
    let record = &decoded.value[0];
    assert!(record.flags.mb && record.flags.me);
    assert!(record.is_well_known(ndef::URI_TYPE));
    match ndef::interpret(record).unwrap() {
        RecordPayload::Uri(uri) => assert_eq!(uri.to_uri(), "https://example.com"),
        other => panic!("expected URI payload, got {:?}", other),
    }
}

#[test]
fn analysis_reports_truncated_ndef_tlv() {
    // TLV claims 240 bytes, the readable pages end after 160
    let mut tag = ntag213_with([0xE1, 0x10, 0x12, 0x00], &[0x03, 0xF0, 0xD1, 0x01, 0xFE]);
    let report = cards::analyze_tag(&mut tag).unwrap();
    assert_eq!(report.data_area.stop, StopReason::MemoryBoundary);
    assert!(matches!(
        report.tlvs.first().map(|item| &item.entry),
        Some(TlvEntry::Malformed { tag: 0x03, .. })
    ));
    assert!(!report.diagnostics.is_empty());
}

#[test]
fn unreadable_data_area_is_diagnosed_not_fatal() {
    // UID, two topology probes and four header pages succeed, everything after fails
    let mut tag = ntag213().with_fault(7);
    let report = cards::analyze_tag(&mut tag).unwrap();
    assert_eq!(report.profile.family, TagFamily::Ntag213);
    assert_eq!(report.data_area.stop, StopReason::ReadErrors);
    assert!(report.data_area.bytes.is_empty());
    assert!(report.scanned.is_none());
    assert!(report.locks.is_none());
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d == "No NDEF data found anywhere on the tag")
    );
}

#[test]
fn ndef_outside_data_area_is_found_by_scan() {
    let mut tag = ntag213();
    tag.set_page(0x10, [0x03, 0x02, 0xAA, 0xBB]);
    let found = cards::scan_for_ndef(&mut tag, 0x2C).unwrap();
    assert_eq!((found.page, found.byte), (0x10, 0));
    assert_eq!(found.value, vec![0xAA, 0xBB]);
}

#[test]
fn memory_tag_reports_its_uid() {
    let mut tag = ntag216();
    assert_eq!(tag.uid().unwrap(), NXP_UID.to_vec());
}

#[test]
fn largest_uri_message_reads_back_whole() {
    // 4 header bytes + 250 payload bytes: the TLV length byte is 0xFE
    let url = format!("https://{}", "a".repeat(249));
    let mut tag = ntag215();
    cards::write_url(&mut tag, &url, Duration::ZERO).unwrap();
    assert_eq!(tag.page(4).map(|page| page[1]), Some(0xFE));

    let report = cards::analyze_tag(&mut tag).unwrap();
    assert_eq!(report.data_area.stop, StopReason::Terminator);
    assert_eq!(report.data_area.bytes.len(), 260);
    assert_eq!(report.uris(), vec![url]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn utf16_text_with_byte_order_mark_reads_back_whole() {
    // UTF-16, "en", FE FF byte order mark, "Hi"
    let payload = vec![0x82, b'e', b'n', 0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
    let message = ndef::build_message(&[NdefRecord::new(Tnf::WellKnown, ndef::TEXT_TYPE, payload)])
        .unwrap();
    let mut tag = ntag213();
    format::format_tag(&mut tag).unwrap();
    format::write_ndef(&mut tag, &message).unwrap();

    let report = cards::analyze_tag(&mut tag).unwrap();
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    match &report.messages[0].records[0].payload {
        Some(RecordPayload::Text(text)) => assert_eq!(text.text(), "Hi"),
        other => panic!("expected text payload, got {:?}", other),
    }
}

#[test]
fn url_too_big_for_ntag213_fits_ntag215() {
    let url = format!("https://example.com/{}", "x".repeat(200));
    let mut small = ntag213();
    assert!(matches!(
        cards::write_url(&mut small, &url, Duration::ZERO),
        Err(Error::DataAreaTooSmall { available: 152, .. })
    ));
    assert!(small.writes().is_empty());

    let mut large = ntag215();
    cards::write_url(&mut large, &url, Duration::ZERO).unwrap();
    assert_eq!(cards::analyze_tag(&mut large).unwrap().uris(), vec![url]);
}
