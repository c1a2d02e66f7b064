//! End-to-end scenario for the ring at its contract boundary.
//!
//! A 64-byte arena with native 8-byte length prefixes, fed payloads of
//! 10, 40, and 10 bytes: the second write must report Full until the
//! first frame is drained, and the 40-byte payload must wrap past the end
//! of the arena mid-copy and come back intact.

use packet_relay::ring::{FrameRing, PopError, PushError, WORD};

#[test]
fn sixty_four_byte_arena_backpressure_and_wraparound() {
    // The scenario is specified for 8-byte machine words.
    assert_eq!(WORD, 8, "scenario assumes a 64-bit host");

    let ring = FrameRing::new(64);
    let first = [b'a'; 10];
    let second = [b'b'; 40];
    let third = [b'c'; 10];
    let mut out = [0u8; 64];

    // Frame one occupies 18 of the 63 usable bytes.
    ring.try_push(&first).unwrap();
    assert_eq!(ring.occupied(), 18);

    // Frame two needs 48 bytes but only 45 remain: backpressure, not an
    // error, and nothing is written.
    assert_eq!(ring.try_push(&second), Err(PushError::Full));
    assert_eq!(ring.occupied(), 18);

    // Draining frame one frees the space; the retry succeeds and the
    // payload wraps across the arena end (write cursor was at 18, the
    // frame spans to logical offset 66).
    assert_eq!(ring.try_pop(&mut out), Ok(10));
    assert_eq!(&out[..10], &first);

    ring.try_push(&second).unwrap();
    assert_eq!(ring.occupied(), 48);

    // Frame three hits Full the same way until frame two is drained.
    assert_eq!(ring.try_push(&third), Err(PushError::Full));
    assert_eq!(ring.try_pop(&mut out), Ok(40));
    assert_eq!(&out[..40], &second);

    ring.try_push(&third).unwrap();
    assert_eq!(ring.try_pop(&mut out), Ok(10));
    assert_eq!(&out[..10], &third);

    assert!(ring.is_empty());
    assert_eq!(ring.try_pop(&mut out), Err(PopError::Empty));
}
