#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlproxy_backend::protocol::{decode_initial_message, InitialMessage};

fuzz_target!(|data: &[u8]| {
    // Anything accepted as a startup message must re-encode to the same bytes
    if let Ok(Some((InitialMessage::Startup(params), consumed))) = decode_initial_message(data) {
        assert!(consumed <= data.len());
        assert_eq!(&params.encode()[..], &data[..consumed]);
    }
});
