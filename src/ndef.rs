// src/ndef.rs
use serde::Serialize;

use crate::error::{Diagnosed, Error, Result};
use crate::text::{self, TextRecord};
use crate::types::{NdefRecord, RecordFlags, Tnf};
use crate::uri::{self, UriRecord};

pub const URI_TYPE: &[u8] = b"U";
pub const TEXT_TYPE: &[u8] = b"T";

/// One decoded record and how many bytes of the input it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub record: NdefRecord,
    pub consumed: usize,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn shortfall(&self, field: &'static str, required: usize) -> Error {
        Error::MalformedRecord {
            field,
            offset: self.pos,
            required,
            available: self.remaining(),
        }
    }

    fn byte(&mut self, field: &'static str) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.shortfall(field, 1))?;
        self.pos += 1;
        Ok(b)
    }

    fn be_u32(&mut self, field: &'static str) -> Result<u32> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.shortfall(field, 4))?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    // Takes up to `len` bytes; a short read still returns what is there.
    fn take(&mut self, field: &'static str, len: usize) -> (&'a [u8], Option<Error>) {
        let issue = (len > self.remaining()).then(|| self.shortfall(field, len));
        let end = self.pos + len.min(self.remaining());
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        (bytes, issue)
    }
}

/// Decode one record from the start of `data`.
///
/// Never fails outright: a declared length that runs past the buffer produces a
/// `MalformedRecord` issue, and the record keeps whatever bytes were present.
pub fn decode_record(data: &[u8]) -> Diagnosed<DecodedRecord> {
    let mut cursor = Cursor { data, pos: 0 };
    let mut record = NdefRecord::default();

    let issue = match read_fields(&mut cursor, &mut record) {
        Ok(()) => None,
        Err(issue) => Some(issue),
    };

    let decoded = DecodedRecord {
        record,
        consumed: cursor.pos,
    };
    match issue {
        Some(issue) => Diagnosed::with_issue(decoded, issue),
        None => Diagnosed::clean(decoded),
    }
}

fn read_fields(cursor: &mut Cursor<'_>, record: &mut NdefRecord) -> Result<()> {
    // 1. Header: flags + TNF
    let header = cursor.byte("header")?;
    record.flags = RecordFlags::from_header(header);
    record.tnf = Tnf::from_bits(header);

    // 2. Type Length
    let type_len = cursor.byte("type length")? as usize;

    // 3. Payload Length (1 byte for Short Record, 4 bytes otherwise)
    let payload_len = if record.flags.sr {
        cursor.byte("payload length")? as usize
    } else {
        cursor.be_u32("payload length")? as usize
    };

    // 4. ID Length (if present)
    let id_len = if record.flags.il {
        Some(cursor.byte("id length")? as usize)
    } else {
        None
    };

    // 5. Type, ID, Payload in that order
    let (record_type, issue) = cursor.take("type", type_len);
    record.record_type = record_type.to_vec();
    if let Some(issue) = issue {
        return Err(issue);
    }

    if let Some(id_len) = id_len {
        let (id, issue) = cursor.take("id", id_len);
        record.id = Some(id.to_vec());
        if let Some(issue) = issue {
            return Err(issue);
        }
    }

    let (payload, issue) = cursor.take("payload", payload_len);
    record.payload = payload.to_vec();
    match issue {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Encode as a short record. MB/ME come from the record's flags, CF is never set.
pub fn encode_record(record: &NdefRecord) -> Result<Vec<u8>> {
    if record.payload.len() > u8::MAX as usize {
        return Err(Error::PayloadTooLarge(record.payload.len()));
    }
    if record.record_type.len() > u8::MAX as usize {
        return Err(Error::FieldTooLarge {
            field: "type",
            len: record.record_type.len(),
        });
    }
    if let Some(id) = &record.id {
        if id.len() > u8::MAX as usize {
            return Err(Error::FieldTooLarge {
                field: "id",
                len: id.len(),
            });
        }
    }

    // Bit 7: MB, Bit 6: ME, Bit 5: CF(0), Bit 4: SR(1), Bit 3: IL, Bits 2-0: TNF
    let flags = RecordFlags {
        mb: record.flags.mb,
        me: record.flags.me,
        cf: false,
        sr: true,
        il: record.id.is_some(),
    };
    let header = flags.bits() | record.tnf.bits();

    let id_len = record.id.as_ref().map_or(0, Vec::len);
    let mut bytes = Vec::with_capacity(4 + record.record_type.len() + id_len + record.payload.len());
    bytes.push(header);
    bytes.push(record.record_type.len() as u8); // Type Length
    bytes.push(record.payload.len() as u8); // Payload Length
    if let Some(id) = &record.id {
        bytes.push(id.len() as u8); // ID Length
    }
    bytes.extend_from_slice(&record.record_type);
    if let Some(id) = &record.id {
        bytes.extend_from_slice(id);
    }
    bytes.extend_from_slice(&record.payload);
    Ok(bytes)
}

/// Decode records until one carries ME or the buffer runs out.
pub fn decode_message(data: &[u8]) -> Diagnosed<Vec<NdefRecord>> {
    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut cursor = 0;
    let mut ended = false;

    while cursor < data.len() {
        let decoded = decode_record(&data[cursor..]);
        let truncated = !decoded.is_clean();
        issues.extend(decoded.issues.into_iter().map(|issue| shift(issue, cursor)));

        let DecodedRecord { record, consumed } = decoded.value;
        cursor += consumed;
        ended = record.flags.me;
        records.push(record);

        if ended || truncated {
            break;
        }
    }

    if !records.is_empty() && !ended {
        issues.push(Error::UnterminatedMessage {
            records: records.len(),
        });
    }

    Diagnosed {
        value: records,
        issues,
    }
}

// Record-relative offsets become message-relative
fn shift(issue: Error, by: usize) -> Error {
    match issue {
        Error::MalformedRecord {
            field,
            offset,
            required,
            available,
        } => Error::MalformedRecord {
            field,
            offset: offset + by,
            required,
            available,
        },
        other => other,
    }
}

/// Concatenate records into a message, MB on the first and ME on the last.
pub fn build_message(records: &[NdefRecord]) -> Result<Vec<u8>> {
    if records.is_empty() {
        return Err(Error::EmptyMessage);
    }

    let last = records.len() - 1;
    let mut message = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mut record = record.clone();
        record.flags.mb = i == 0;
        record.flags.me = i == last;
        message.extend(encode_record(&record)?);
    }
    Ok(message)
}

pub fn uri_record(uri: &str) -> NdefRecord {
    NdefRecord::new(Tnf::WellKnown, URI_TYPE, uri::encode_uri(uri))
}

pub fn text_record(language: &str, content: &str) -> Result<NdefRecord> {
    Ok(NdefRecord::new(
        Tnf::WellKnown,
        TEXT_TYPE,
        text::encode_text(language, content)?,
    ))
}

/// Single-record NDEF message holding a URI record.
pub fn build_uri_record(uri: &str) -> Result<Vec<u8>> {
    build_message(&[uri_record(uri)])
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    Uri(UriRecord),
    Text(TextRecord),
    Other,
}

/// Interpret the payload of the well-known 'U' and 'T' types.
pub fn interpret(record: &NdefRecord) -> Result<RecordPayload> {
    if record.is_well_known(URI_TYPE) {
        uri::decode_uri(&record.payload).map(RecordPayload::Uri)
    } else if record.is_well_known(TEXT_TYPE) {
        text::decode_text(&record.payload).map(RecordPayload::Text)
    } else {
        Ok(RecordPayload::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn example_message() -> Vec<u8> {
        let mut data = vec![0xD1, 0x01, 0x0C, 0x55, 0x04];
        data.extend_from_slice(b"example.com");
        data
    }

    #[test]
    fn decodes_single_uri_record() {
        let decoded = decode_message(&example_message());
        assert!(decoded.is_clean());
        assert_eq!(decoded.value.len(), 1);

        let record = &decoded.value[0];
        assert_eq!(record.tnf, Tnf::WellKnown);
        assert_eq!(record.record_type, b"U");
        assert!(record.flags.mb && record.flags.me);
        assert_eq!(
            interpret(record).unwrap(),
            RecordPayload::Uri(UriRecord {
                prefix_code: 0x04,
                suffix: "example.com".into()
            })
        );
    }

    #[test]
    fn declared_length_wins_over_trailing_bytes() {
        // Payload length 0x0B is one short of the 12 bytes that follow
        let mut data = vec![0xD1, 0x01, 0x0B, 0x55, 0x04];
        data.extend_from_slice(b"example.com");
        let decoded = decode_message(&data);
        assert_eq!(
            uri::decode_uri_string(&decoded.value[0].payload).unwrap(),
            "https://example.co"
        );
        assert!(decoded.is_clean());
    }

    #[test]
    fn truncated_payload_is_kept() {
        let mut truncated = example_message();
        truncated.truncate(9);
        let decoded = decode_record(&truncated);
        assert_eq!(decoded.value.record.payload, vec![0x04, b'e', b'x', b'a', b'm']);
        assert_eq!(
            decoded.issues,
            vec![Error::MalformedRecord {
                field: "payload",
                offset: 4,
                required: 12,
                available: 5
            }]
        );
    }

    #[test]
    fn missing_header_fields_are_diagnosed() {
        let decoded = decode_record(&[0xD1, 0x01]);
        assert_eq!(decoded.value.consumed, 2);
        assert!(matches!(
            decoded.issues[..],
            [Error::MalformedRecord {
                field: "payload length",
                ..
            }]
        ));
        assert!(!decode_record(&[]).is_clean());
    }

    #[test]
    fn long_record_and_id_are_read() {
        // MB|ME|IL, TNF=2, long payload length
        let data = [
            0xCA, 0x03, 0x00, 0x00, 0x00, 0x02, 0x01, b'a', b'/', b'b', b'#', 0x10, 0x20,
        ];
        let decoded = decode_record(&data);
        assert!(decoded.is_clean());
        let record = decoded.value.record;
        assert!(!record.flags.sr);
        assert_eq!(record.tnf, Tnf::Media);
        assert_eq!(record.record_type, b"a/b");
        assert_eq!(record.id, Some(b"#".to_vec()));
        assert_eq!(record.payload, vec![0x10, 0x20]);
        assert_eq!(decoded.value.consumed, data.len());
    }

    #[test]
    fn chunked_records_are_tolerated() {
        let data = [0xB1, 0x01, 0x01, b'T', 0x00, 0x51, 0x01, 0x01, b'T', 0x00];
        let decoded = decode_message(&data);
        assert!(decoded.is_clean());
        assert_eq!(decoded.value.len(), 2);
        assert!(decoded.value[0].flags.cf);
    }

    #[test]
    fn record_round_trip() {
        let records = [
            NdefRecord::new(Tnf::WellKnown, b"U", uri::encode_uri("https://a.b")),
            NdefRecord::new(Tnf::External, b"android.com:pkg", b"com.example".to_vec())
                .with_id(b"id-1"),
            NdefRecord::new(Tnf::Empty, b"", vec![]),
            NdefRecord::new(Tnf::Media, b"text/plain", vec![0x41; 255]).with_id(b""),
        ];
        for record in records {
            let encoded = encode_record(&record).unwrap();
            let decoded = decode_record(&encoded);
            assert!(decoded.is_clean());
            assert_eq!(decoded.value.record, record);
            assert_eq!(decoded.value.consumed, encoded.len());
        }
    }

    #[test]
    fn encode_refuses_long_payloads() {
        let record = NdefRecord::new(Tnf::WellKnown, b"T", vec![0; 256]);
        assert_eq!(encode_record(&record), Err(Error::PayloadTooLarge(256)));
    }

    #[test]
    fn encode_refuses_long_type_or_id() {
        let long_type = NdefRecord::new(Tnf::External, &[b't'; 256], Vec::new());
        assert_eq!(
            encode_record(&long_type),
            Err(Error::FieldTooLarge {
                field: "type",
                len: 256
            })
        );

        let long_id = NdefRecord::new(Tnf::WellKnown, URI_TYPE, vec![0x04]).with_id(&[0u8; 300]);
        assert_eq!(
            encode_record(&long_id),
            Err(Error::FieldTooLarge {
                field: "id",
                len: 300
            })
        );

        let max_id = NdefRecord::new(Tnf::WellKnown, URI_TYPE, vec![0x04]).with_id(&[0u8; 255]);
        assert!(encode_record(&max_id).is_ok());
    }

    #[test]
    fn build_sets_message_boundaries() {
        let records = [
            uri_record("https://one.example"),
            text_record("en", "two").unwrap(),
            uri_record("https://three.example"),
        ];
        let message = build_message(&records).unwrap();
        let decoded = decode_message(&message);
        assert!(decoded.is_clean());

        let flags: Vec<(bool, bool)> = decoded
            .value
            .iter()
            .map(|r| (r.flags.mb, r.flags.me))
            .collect();
        assert_eq!(flags, vec![(true, false), (false, false), (false, true)]);
        assert!(decoded.value.iter().all(|r| r.flags.sr && !r.flags.cf));
    }

    #[test]
    fn build_rejects_empty_message() {
        assert_eq!(build_message(&[]), Err(Error::EmptyMessage));
    }

    #[test]
    fn uri_record_matches_known_layout() {
        let message = build_uri_record("https://example.com").unwrap();
        assert_eq!(message, example_message());
    }

    #[test]
    fn message_without_me_is_closed_implicitly() {
        let data = [0x91, 0x01, 0x01, b'T', 0x00];
        let decoded = decode_message(&data);
        assert_eq!(decoded.value.len(), 1);
        assert_eq!(
            decoded.issues,
            vec![Error::UnterminatedMessage { records: 1 }]
        );
    }

    #[test]
    fn text_payload_is_interpreted() {
        let record = text_record("en", "hello").unwrap();
        match interpret(&record).unwrap() {
            RecordPayload::Text(text) => {
                assert_eq!(text.language, "en");
                assert_eq!(text.text(), "hello");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
