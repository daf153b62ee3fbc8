#![no_main]

use chatpoll::channels::twitch::parse_privmsg;
use libfuzzer_sys::fuzz_target;

// Socket frames are split on CRLF before parsing
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for raw in text.split("\r\n") {
        if let Some(event) = parse_privmsg(raw, "somechannel", "justinfan1") {
            assert!(raw.contains(event.text.as_str()));
            assert!(raw.contains(event.voter_id.as_str()));
        }
    }
});
