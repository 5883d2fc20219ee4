#![no_main]

use libfuzzer_sys::fuzz_target;
use porthole_core::{FromAppChannel, FromAppMsg};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(rest) else {
        return;
    };
    let channel = FromAppChannel::ALL[usize::from(selector) % FromAppChannel::ALL.len()];
    if let Ok(msg) = FromAppMsg::decode(channel, payload) {
        assert_eq!(msg.channel(), channel);
    }
});
