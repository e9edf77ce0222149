//! Change records and the incremental change-stream decoder.
//!
//! A continuous `_changes` response is an open-ended sequence of JSON
//! objects. CouchDB writes one record per line and a bare newline as a
//! heartbeat, but the decoder only relies on JSON framing: records may
//! also be concatenated without separators.
//!
//! ```
//! use couchwire_protocol::{ChangeDecoder, FeedRecord};
//!
//! let mut decoder = ChangeDecoder::new();
//! decoder.push(b"{\"seq\":1,\"id\":\"a\"}\n\n{\"seq\":2,");
//!
//! match decoder.next_record().unwrap() {
//!     Some(FeedRecord::Change(change)) => assert_eq!(change.id, "a"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! // The second record is still incomplete.
//! assert!(decoder.next_record().unwrap().is_none());
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::response::ErrorResponse;
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A revision listed in a change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRev {
    /// Revision token.
    pub rev: String,
}

/// A single event from the `_changes` feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Sequence number assigned by the server.
    pub seq: u64,
    /// ID of the changed document.
    pub id: String,
    /// Leaf revisions after the change.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeRev>,
    /// Whether the change deleted the document.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    /// The raw document body, present when `include_docs` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Box<RawValue>>,
}

impl Change {
    /// Returns the first listed revision, if any.
    pub fn rev(&self) -> Option<&str> {
        self.changes.first().map(|c| c.rev.as_str())
    }

    /// Decodes the embedded document into `T`.
    ///
    /// Returns `Ok(None)` when the record carries no document.
    pub fn doc_as<T: DeserializeOwned>(&self) -> ProtocolResult<Option<T>> {
        self.doc
            .as_ref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
            .map_err(ProtocolError::from)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A decoded record from a change stream.
#[derive(Debug, Clone)]
pub enum FeedRecord {
    /// A document change.
    Change(Change),
    /// The closing `{"last_seq": N}` record written when the server ends
    /// the feed.
    LastSeq(u64),
    /// An error reported in-band by the server.
    Error {
        /// The parsed `{error, reason}` pair.
        response: ErrorResponse,
        /// The record as received, without surrounding whitespace.
        raw: Bytes,
    },
}

/// Every shape a line of the stream can take.
#[derive(Deserialize)]
struct FeedLine {
    seq: Option<u64>,
    id: Option<String>,
    #[serde(default)]
    changes: Vec<ChangeRev>,
    #[serde(default)]
    deleted: bool,
    doc: Option<Box<RawValue>>,
    last_seq: Option<u64>,
    error: Option<String>,
    reason: Option<String>,
}

impl FeedLine {
    fn into_record(self, raw: Bytes) -> ProtocolResult<FeedRecord> {
        if let Some(error) = self.error {
            return Ok(FeedRecord::Error {
                response: ErrorResponse::new(error, self.reason.unwrap_or_default()),
                raw: raw.slice_ref(raw.trim_ascii()),
            });
        }

        match (self.seq, self.id) {
            (Some(seq), Some(id)) => Ok(FeedRecord::Change(Change {
                seq,
                id,
                changes: self.changes,
                deleted: self.deleted,
                doc: self.doc,
            })),
            (None, None) => self
                .last_seq
                .map(FeedRecord::LastSeq)
                .ok_or_else(|| ProtocolError::malformed("record has neither `seq` nor `last_seq`")),
            (None, Some(_)) => Err(ProtocolError::malformed("change record is missing `seq`")),
            (Some(_), None) => Err(ProtocolError::malformed("change record is missing `id`")),
        }
    }
}

/// Incremental decoder for change streams.
///
/// Push body chunks as they arrive and drain complete records with
/// [`next_record`](Self::next_record). Partial records stay buffered until
/// the rest arrives.
#[derive(Debug, Default)]
pub struct ChangeDecoder {
    buffer: BytesMut,
}

impl ChangeDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete record.
    ///
    /// `Ok(None)` means more input is needed. Whitespace between records is
    /// consumed silently.
    pub fn next_record(&mut self) -> ProtocolResult<Option<FeedRecord>> {
        let (line, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<FeedLine>();
            match stream.next() {
                None => (None, self.buffer.len()),
                Some(Ok(line)) => (Some(line), stream.byte_offset()),
                Some(Err(err)) if err.is_eof() => (None, 0),
                Some(Err(err)) => return Err(err.into()),
            }
        };
        let raw = self.buffer.split_to(consumed).freeze();
        line.map(|line| line.into_record(raw)).transpose()
    }

    /// Checks that the stream ended on a record boundary.
    pub fn finish(&self) -> ProtocolResult<()> {
        let pending = self
            .buffer
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .count();
        if pending == 0 {
            Ok(())
        } else {
            Err(ProtocolError::TruncatedStream {
                pending: self.buffer.len(),
            })
        }
    }

    /// Number of buffered, undecoded bytes.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
