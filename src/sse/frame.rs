//! SSE wire framing
//!
//! Frames are written exactly as they go on the wire:
//!
//! ```text
//! event: <name>\n
//! data: <json>\n
//! \n
//! ```
//!
//! Heartbeats are SSE comments (`: heartbeat\n\n`) that clients ignore but
//! that keep proxies from closing an idle connection.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Keep-alive comment frame
pub const HEARTBEAT: &[u8] = b": heartbeat\n\n";

/// Event name of the handshake frame
pub const READY_EVENT: &str = "ready";

/// Response headers an HTTP layer should send with an event stream
pub const RESPONSE_HEADERS: [(&str, &str); 5] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("Access-Control-Allow-Origin", "*"),
    // Disables response buffering in nginx
    ("X-Accel-Buffering", "no"),
];

/// Encode a named event
///
/// Multi-line data is split into one `data:` field per line, as the SSE
/// format requires.
pub fn encode(event: &str, data: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(event.len() + data.len() + 16);

    buf.put_slice(b"event: ");
    buf.put_slice(event.as_bytes());
    buf.put_u8(b'\n');

    for line in data.split('\n') {
        buf.put_slice(b"data: ");
        buf.put_slice(line.trim_end_matches('\r').as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');

    buf.freeze()
}

/// Encode a value as JSON and wrap it in an event frame
pub fn encode_json<T: Serialize>(event: &str, value: &T) -> Result<Bytes, serde_json::Error> {
    let data = serde_json::to_string(value)?;
    Ok(encode(event, &data))
}

#[derive(Serialize)]
struct Handshake<'a> {
    code: u16,
    stream_id: &'a str,
    ts: u64,
}

/// Handshake frame sent once when a consumer connects
pub fn handshake(stream_id: &str) -> Result<Bytes, serde_json::Error> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    handshake_at(stream_id, ts)
}

/// Handshake frame with an explicit unix timestamp (seconds)
pub fn handshake_at(stream_id: &str, ts: u64) -> Result<Bytes, serde_json::Error> {
    encode_json(
        READY_EVENT,
        &Handshake {
            code: 200,
            stream_id,
            ts,
        },
    )
}
