//! Versioned pack/restore of stacks
//!
//! A packet is a JSON envelope `{id, version, extras, compressed, payload}`.
//! The payload holds the stored subject, the command history and the stack
//! configuration; when
//! `compressed` is set it is gzip-compressed and base64-encoded. Peeking only
//! decodes the envelope, so a foreign or outdated packet can be refused before
//! anything inside it is materialized.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::ops::RangeBounds;

use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::command::Entry;
use crate::error::UndoError;
use crate::stack::{Stack, StackConfig};
use crate::Result;

/// Envelope metadata of a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectInfo {
    /// Caller-supplied identity tag
    pub id: String,
    /// Caller-supplied schema version
    pub version: u32,
    /// Auxiliary payloads stored next to the subject
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
    /// Whether the payload is compressed
    #[serde(default)]
    pub compressed: bool,
}

impl SubjectInfo {
    /// Typed view of an extra; `None` when absent or of another shape
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.extras.get(key)?;
        T::deserialize(value).ok()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    info: SubjectInfo,
    payload: String,
}

#[derive(Serialize)]
struct PayloadRef<'a, C> {
    subject: Value,
    entries: &'a [Entry<C>],
    idx: usize,
    clean_idx: Option<usize>,
    config: &'a StackConfig,
}

#[derive(Deserialize)]
struct Payload<C> {
    subject: Value,
    entries: Vec<Entry<C>>,
    idx: usize,
    clean_idx: Option<usize>,
    #[serde(default)]
    config: StackConfig,
}

/// Outcome code of an unpack attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnpackCode {
    /// The stack was fully restored
    Success,
    /// The packet identity is not the expected one
    IdMismatch,
    /// The packet version cannot be handled
    VersionUnsupported,
    /// The packet could not be decoded
    CorruptPayload,
    /// The subject was not restored and no default factory exists
    MissingDefaultFactory,
    /// The peek predicate refused the packet
    Refused,
}

/// Code plus human-readable detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackResult {
    /// Outcome code
    pub code: UnpackCode,
    /// Detail message, empty on success
    pub msg: String,
}

impl UnpackResult {
    fn success() -> Self {
        UnpackResult {
            code: UnpackCode::Success,
            msg: String::new(),
        }
    }

    /// Whether the stack was fully restored
    pub fn is_success(&self) -> bool {
        self.code == UnpackCode::Success
    }
}

/// Why a packet was refused by [`Packet::peek`]
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Reason code
    pub code: UnpackCode,
    /// Envelope metadata, when the envelope could be decoded
    pub info: Option<SubjectInfo>,
    /// Detail message
    pub msg: String,
}

impl Rejection {
    fn new(code: UnpackCode, info: Option<SubjectInfo>, msg: impl Into<String>) -> Self {
        Rejection {
            code,
            info,
            msg: msg.into(),
        }
    }
}

/// Entry point for packing and peeking
pub struct Packet;

impl Packet {
    /// Start packing a stack under an identity and schema version
    pub fn make<'a, S, C>(
        stack: &'a Stack<S, C>,
        id: impl Into<String>,
        version: u32,
    ) -> PacketBuilder<'a, S, C> {
        PacketBuilder {
            stack,
            id: id.into(),
            version,
            extras: BTreeMap::new(),
            compressed: false,
            on_store: None,
            error: None,
        }
    }

    /// Decode only the envelope and let `predicate` accept or refuse it
    pub fn peek(
        blob: &str,
        predicate: impl FnOnce(&SubjectInfo) -> bool,
    ) -> std::result::Result<Peeked, Rejection> {
        let envelope = decode_envelope(blob)?;
        if !predicate(&envelope.info) {
            warn!(id = %envelope.info.id, version = envelope.info.version, "packet refused");
            return Err(Rejection::new(
                UnpackCode::Refused,
                Some(envelope.info),
                "refused by predicate",
            ));
        }
        debug!(id = %envelope.info.id, version = envelope.info.version, "packet accepted");
        Ok(Peeked { envelope })
    }

    /// Peek, accepting only the given identity and a version inside `versions`
    pub fn peek_expecting(
        blob: &str,
        id: &str,
        versions: impl RangeBounds<u32>,
    ) -> std::result::Result<Peeked, Rejection> {
        let envelope = decode_envelope(blob)?;
        let info = &envelope.info;
        if info.id != id {
            let msg = UndoError::IdMismatch {
                expected: id.to_string(),
                found: info.id.clone(),
            }
            .to_string();
            warn!(%msg, "packet refused");
            return Err(Rejection::new(UnpackCode::IdMismatch, Some(envelope.info), msg));
        }
        if !versions.contains(&info.version) {
            let msg = UndoError::VersionUnsupported(info.version).to_string();
            warn!(%msg, "packet refused");
            return Err(Rejection::new(
                UnpackCode::VersionUnsupported,
                Some(envelope.info),
                msg,
            ));
        }
        Ok(Peeked { envelope })
    }
}

fn decode_envelope(blob: &str) -> std::result::Result<Envelope, Rejection> {
    serde_json::from_str(blob).map_err(|e| {
        warn!(error = %e, "packet envelope unreadable");
        Rejection::new(UnpackCode::CorruptPayload, None, e.to_string())
    })
}

type StoreHook<'a, S> = Box<dyn Fn(&S) -> Result<Value> + 'a>;

/// Builder returned by [`Packet::make`]
pub struct PacketBuilder<'a, S, C> {
    stack: &'a Stack<S, C>,
    id: String,
    version: u32,
    extras: BTreeMap<String, Value>,
    compressed: bool,
    on_store: Option<StoreHook<'a, S>>,
    error: Option<UndoError>,
}

impl<'a, S, C> PacketBuilder<'a, S, C> {
    /// Store the subject through a projection, for subjects that are not serializable
    pub fn on_store<T, F>(mut self, f: F) -> Self
    where
        T: Serialize,
        F: Fn(&S) -> T + 'a,
    {
        self.on_store = Some(Box::new(move |subject: &S| -> Result<Value> {
            Ok(serde_json::to_value(f(subject))?)
        }));
        self
    }

    /// Attach an auxiliary payload stored verbatim
    pub fn extra<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.extras.insert(key.into(), v);
            }
            Err(e) => {
                self.error.get_or_insert(UndoError::SerializationError(e));
            }
        }
        self
    }

    /// Compress the payload
    pub fn zipped(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}

impl<'a, S: Serialize, C> PacketBuilder<'a, S, C> {
    /// Store the subject with its own `Serialize` implementation
    pub fn native(mut self) -> Self {
        self.on_store = Some(Box::new(|subject: &S| -> Result<Value> {
            Ok(serde_json::to_value(subject)?)
        }));
        self
    }
}

impl<'a, S, C: Serialize> PacketBuilder<'a, S, C> {
    /// Produce the packet
    pub fn store(self) -> Result<String> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let on_store = self.on_store.ok_or(UndoError::MissingStoreHook)?;
        let stack = self.stack;

        let payload = PayloadRef {
            subject: on_store(stack.subject())?,
            entries: stack.entries(),
            idx: stack.idx(),
            clean_idx: stack.clean_idx(),
            config: stack.config(),
        };
        let json = serde_json::to_string(&payload)?;
        let payload = if self.compressed {
            compress(&json)?
        } else {
            json
        };

        let envelope = Envelope {
            info: SubjectInfo {
                id: self.id,
                version: self.version,
                extras: self.extras,
                compressed: self.compressed,
            },
            payload,
        };
        info!(
            id = %envelope.info.id,
            version = envelope.info.version,
            entries = stack.len(),
            compressed = envelope.info.compressed,
            "stack packed"
        );
        Ok(serde_json::to_string(&envelope)?)
    }
}

fn compress(json: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    let bytes = encoder.finish()?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

fn decompress(payload: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| UndoError::corrupt_payload(e.to_string()))?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut json = String::new();
    decoder
        .read_to_string(&mut json)
        .map_err(|e| UndoError::corrupt_payload(e.to_string()))?;
    Ok(json)
}

/// A packet whose envelope passed the peek predicate
#[derive(Debug)]
pub struct Peeked {
    envelope: Envelope,
}

type RestoreHook<'a, S> = Box<dyn FnOnce(Value, &SubjectInfo) -> Option<S> + 'a>;
type DefaultFactory<'a, S, C> = Box<dyn FnOnce() -> Stack<S, C> + 'a>;

impl Peeked {
    /// Envelope metadata
    pub fn info(&self) -> &SubjectInfo {
        &self.envelope.info
    }

    /// Prepare a full restore
    ///
    /// `on_restore` receives the stored subject and the envelope and returns
    /// the live subject for the current schema, or `None` to fall back to the
    /// default factory. It is the migration point and always runs before the
    /// [`Restore::prepare`] hook.
    pub fn restore<'a, S, C>(
        self,
        on_restore: impl FnOnce(Value, &SubjectInfo) -> Option<S> + 'a,
    ) -> Restore<'a, S, C> {
        Restore {
            envelope: self.envelope,
            on_restore: Box::new(on_restore),
            default_factory: None,
        }
    }
}

/// Pending restore returned by [`Peeked::restore`]
pub struct Restore<'a, S, C> {
    envelope: Envelope,
    on_restore: RestoreHook<'a, S>,
    default_factory: Option<DefaultFactory<'a, S, C>>,
}

impl<'a, S, C: DeserializeOwned> Restore<'a, S, C> {
    /// Stack to use when the subject cannot be restored
    pub fn with_default(mut self, factory: impl FnOnce() -> Stack<S, C> + 'a) -> Self {
        self.default_factory = Some(Box::new(factory));
        self
    }

    /// Restore, then run `hook` to rebind contexts and watcher
    ///
    /// The hook sees the outcome code, so a fallback stack can be told apart
    /// from a fully restored one.
    pub fn prepare(
        self,
        hook: impl FnOnce(&mut Stack<S, C>, &SubjectInfo, &UnpackResult),
    ) -> Result<Stack<S, C>> {
        let Restore {
            envelope,
            on_restore,
            default_factory,
        } = self;
        let Envelope { info, payload } = envelope;

        let (mut stack, result) = match decode_payload::<C>(&payload, &info) {
            Ok(p) => match on_restore(p.subject, &info) {
                Some(subject) => (
                    Stack::from_parts(subject, p.entries, p.idx, p.clean_idx, p.config),
                    UnpackResult::success(),
                ),
                None => {
                    let msg = format!(
                        "subject of {} version {} was not restored",
                        info.id, info.version
                    );
                    let factory = default_factory
                        .ok_or_else(|| UndoError::missing_default_factory(info.id.as_str()))?;
                    (
                        factory(),
                        UnpackResult {
                            code: UnpackCode::VersionUnsupported,
                            msg,
                        },
                    )
                }
            },
            Err(err) => {
                let factory = default_factory.ok_or_else(|| {
                    UndoError::corrupt_payload(format!("{}: {}", info.id, err))
                })?;
                (
                    factory(),
                    UnpackResult {
                        code: UnpackCode::CorruptPayload,
                        msg: err.to_string(),
                    },
                )
            }
        };

        if result.is_success() {
            info!(id = %info.id, version = info.version, entries = stack.len(), "stack restored");
        } else {
            warn!(id = %info.id, code = ?result.code, msg = %result.msg, "restored default stack");
        }
        hook(&mut stack, &info, &result);
        Ok(stack)
    }

    /// Restore without a post-restore hook
    pub fn into_stack(self) -> Result<Stack<S, C>> {
        self.prepare(|_, _, _| {})
    }
}

fn decode_payload<C: DeserializeOwned>(payload: &str, info: &SubjectInfo) -> Result<Payload<C>> {
    let decoded;
    let json = if info.compressed {
        decoded = decompress(payload)?;
        decoded.as_str()
    } else {
        payload
    };
    let p: Payload<C> =
        serde_json::from_str(json).map_err(|e| UndoError::corrupt_payload(e.to_string()))?;

    if p.idx > p.entries.len() || p.clean_idx.is_some_and(|c| c > p.entries.len()) {
        return Err(UndoError::corrupt_payload(format!(
            "index {} out of range for {} entries",
            p.idx,
            p.entries.len()
        )));
    }
    Ok(p)
}
