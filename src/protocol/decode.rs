//! Protocol message decoding

use super::constants::{
    CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, MAX_STARTUP_PACKET_LEN, SSL_REQUEST_CODE,
};
use super::message::InitialMessage;
use super::startup::StartupParameters;
use std::io;

/// Decode the first message a client sends on a new connection.
///
/// Initial messages have no type byte: a 4-byte length (including itself)
/// followed by a 4-byte code that is either a protocol version or one of the
/// special request codes.
///
/// # Returns
/// `Ok(Some((msg, consumed)))` - Message and number of bytes consumed
/// `Ok(None)` - More bytes are needed
/// `Err(e)` - The bytes cannot be a valid initial message
pub fn decode_initial_message(data: &[u8]) -> io::Result<Option<(InitialMessage, usize)>> {
    if data.len() < 4 {
        return Ok(None);
    }

    let len = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if len < 8 || len as usize > MAX_STARTUP_PACKET_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid startup packet length {}", len),
        ));
    }
    let len = len as usize;

    if data.len() < len {
        return Ok(None);
    }

    let code = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let body = &data[8..len];

    let msg = match code {
        SSL_REQUEST_CODE => {
            expect_empty(body, "SSLRequest")?;
            InitialMessage::SslRequest
        }
        GSSENC_REQUEST_CODE => {
            expect_empty(body, "GSSENCRequest")?;
            InitialMessage::GssEncRequest
        }
        CANCEL_REQUEST_CODE => decode_cancel_request(body)?,
        version => decode_startup(version, body)?,
    };

    Ok(Some((msg, len)))
}

fn expect_empty(body: &[u8], what: &str) -> io::Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} must be exactly 8 bytes", what),
        ))
    }
}

fn decode_cancel_request(body: &[u8]) -> io::Result<InitialMessage> {
    if body.len() != 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "CancelRequest must be exactly 16 bytes",
        ));
    }
    let process_id = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let secret_key = i32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    Ok(InitialMessage::CancelRequest {
        process_id,
        secret_key,
    })
}

fn decode_startup(version: i32, body: &[u8]) -> io::Result<InitialMessage> {
    let mut params = Vec::new();
    let mut rest = body;

    loop {
        let key = read_cstring(&mut rest)?;
        if key.is_empty() {
            break;
        }
        let value = read_cstring(&mut rest)?;
        params.push((key, value));
    }

    if !rest.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes after startup parameters",
        ));
    }

    StartupParameters::from_parts(version, params)
        .map(InitialMessage::Startup)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn read_cstring(data: &mut &[u8]) -> io::Result<String> {
    let end = data.iter().position(|&b| b == 0).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "unterminated startup parameter")
    })?;
    let s = std::str::from_utf8(&data[..end])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .to_string();
    *data = &data[end + 1..];
    Ok(s)
}
