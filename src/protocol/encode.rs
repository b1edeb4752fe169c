//! Protocol message encoding

use super::constants::{SSL_REQUEST_CODE, SSL_REQUEST_LEN};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage<'_>) -> BytesMut {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::Startup(params) => {
            encode_startup(&mut buf, params.version(), params.iter());
        }
        FrontendMessage::SslRequest => {
            encode_ssl_request(&mut buf);
        }
    }

    buf
}

pub(crate) fn encode_startup<'a>(
    buf: &mut BytesMut,
    version: i32,
    params: impl Iterator<Item = (&'a str, &'a str)>,
) {
    // Startup messages don't have a type byte
    // Reserve space for length (will be filled at end)
    let len_pos = buf.len();
    buf.put_i32(0);

    buf.put_i32(version);

    // Parameters (key-value pairs, null-terminated)
    for (key, value) in params {
        buf.put(key.as_bytes());
        buf.put_u8(0);
        buf.put(value.as_bytes());
        buf.put_u8(0);
    }

    // Final null terminator
    buf.put_u8(0);

    let len = buf.len() - len_pos;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as i32).to_be_bytes());
}

fn encode_ssl_request(buf: &mut BytesMut) {
    buf.put_i32(SSL_REQUEST_LEN); // Length (includes itself)
    buf.put_i32(SSL_REQUEST_CODE);
}
