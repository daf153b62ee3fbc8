#![no_main]

use chatpoll::channels::{normalize_channel, ChatEvent, MemoryChatSource};
use chatpoll::polls::{parse_vote, PollSession, VoteOutcome};
use libfuzzer_sys::fuzz_target;
use std::future::Future;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    if let Ok(channel) = normalize_channel(&text) {
        assert!(!channel.is_empty() && channel.len() <= 25);
    }

    let session = PollSession::new("somechannel", Arc::new(MemoryChatSource::new()));
    let started = start_now(&session);
    if !started {
        return;
    }

    let outcome = session.handle_event(&ChatEvent::new("fuzzer", text.as_ref()));
    let total: u64 = session.tally().total();
    match outcome {
        VoteOutcome::Counted(choice) => {
            assert_eq!(parse_vote(&text), Some(choice as i64));
            assert_eq!(total, 1);
        }
        _ => assert_eq!(total, 0),
    }
});

/// Start a four-choice poll; the memory source never awaits
fn start_now(session: &PollSession) -> bool {
    let waker = std::task::Waker::noop();
    let mut cx = std::task::Context::from_waker(waker);
    let mut start = std::pin::pin!(session.start(4));
    matches!(
        start.as_mut().poll(&mut cx),
        std::task::Poll::Ready(Ok(()))
    )
}
