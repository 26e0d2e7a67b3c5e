//! Property-based tests for the frame codec.
//!
//! These tests use proptest to fuzz framing and incremental parsing and find
//! edge cases around length encodings and chunk boundaries.

use proptest::prelude::*;

use wscore::protocol::mask::apply_mask;
use wscore::protocol::receiver::{FrameReceiver, ReceiverEvent};
use wscore::protocol::sender::{FrameSender, SendOptions, make_frame};
use wscore::protocol::OpCode;

fn drain(rx: &mut FrameReceiver) -> Vec<ReceiverEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.next_event() {
        events.push(ev);
    }
    events
}

proptest! {
    // =========================================================================
    // Property 1: Masking is an involution (XOR is self-inverse)
    // =========================================================================
    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    // =========================================================================
    // Property 2: Sender output parses back to the same message (unmasked)
    // =========================================================================
    #[test]
    fn test_roundtrip_unmasked(
        binary in any::<bool>(),
        payload in prop::collection::vec(any::<u8>(), 0..2000)
    ) {
        let opcode = if binary { OpCode::Binary } else { OpCode::Text };
        let (header, body) = make_frame(payload.clone(), true, opcode, None);

        let mut wire = header;
        wire.extend_from_slice(&body);

        let mut rx = FrameReceiver::new(0, 1 << 20);
        prop_assert!(rx.feed(wire).is_ok());

        let events = drain(&mut rx);
        prop_assert_eq!(events, vec![ReceiverEvent::Message { payload, is_binary: binary }]);
    }

    // =========================================================================
    // Property 3: Roundtrip with masking
    // =========================================================================
    #[test]
    fn test_roundtrip_masked(
        binary in any::<bool>(),
        payload in prop::collection::vec(any::<u8>(), 0..1000),
        mask in any::<[u8; 4]>()
    ) {
        let opcode = if binary { OpCode::Binary } else { OpCode::Text };
        let (header, body) = make_frame(payload.clone(), true, opcode, Some(mask));

        let mut wire = header;
        wire.extend_from_slice(&body);

        let mut rx = FrameReceiver::new(0, 1 << 20);
        prop_assert!(rx.feed(wire).is_ok());

        let events = drain(&mut rx);
        prop_assert_eq!(events, vec![ReceiverEvent::Message { payload, is_binary: binary }]);
    }

    // =========================================================================
    // Property 4: Length-indicator selection matches the payload size
    // =========================================================================
    #[test]
    fn test_payload_length_encoding(
        payload in prop::collection::vec(any::<u8>(), 0..70000)
    ) {
        let len = payload.len();
        let (header, _) = make_frame(payload, true, OpCode::Binary, None);

        if len >= 65536 {
            prop_assert_eq!(header[1], 127);
            prop_assert_eq!(header.len(), 10);
            let mut be = [0u8; 8];
            be.copy_from_slice(&header[2..10]);
            prop_assert_eq!(u64::from_be_bytes(be), len as u64);
        } else if len > 125 {
            prop_assert_eq!(header[1], 126);
            prop_assert_eq!(header.len(), 4);
            prop_assert_eq!(u16::from_be_bytes([header[2], header[3]]), len as u16);
        } else {
            prop_assert_eq!(header[1], len as u8);
            prop_assert_eq!(header.len(), 2);
        }
    }

    // =========================================================================
    // Property 5: Feeding a wire stream in arbitrary pieces emits the same
    // events as feeding it whole
    // =========================================================================
    #[test]
    fn test_chunking_equivalence(
        payload in prop::collection::vec(any::<u8>(), 0..500),
        mask in any::<[u8; 4]>(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8)
    ) {
        let (header, body) = make_frame(payload, true, OpCode::Binary, Some(mask));
        let mut wire = header;
        wire.extend_from_slice(&body);

        let mut whole = FrameReceiver::new(0, 1 << 20);
        prop_assert!(whole.feed(wire.clone()).is_ok());

        let mut offsets: Vec<usize> = cuts.iter().map(|ix| ix.index(wire.len() + 1)).collect();
        offsets.push(0);
        offsets.push(wire.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut pieces = FrameReceiver::new(0, 1 << 20);
        for pair in offsets.windows(2) {
            prop_assert!(pieces.feed(wire[pair[0]..pair[1]].to_vec()).is_ok());
        }

        prop_assert_eq!(drain(&mut whole), drain(&mut pieces));
    }

    // =========================================================================
    // Property 6: Any partition of a message into fragments reassembles to
    // one message equal to the concatenation
    // =========================================================================
    #[test]
    fn test_fragmentation_reassembly(
        binary in any::<bool>(),
        fragments in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..10)
    ) {
        let mut sender = FrameSender::new(false);
        let mut wire = Vec::new();
        let last = fragments.len() - 1;

        for (i, fragment) in fragments.iter().enumerate() {
            let (header, body) = sender.data_frame(
                fragment.clone(),
                SendOptions { binary, fin: i == last },
            );
            wire.extend_from_slice(&header);
            wire.extend_from_slice(&body);
        }

        let mut rx = FrameReceiver::new(0, 1 << 20);
        prop_assert!(rx.feed(wire).is_ok());

        let expected: Vec<u8> = fragments.concat();
        prop_assert_eq!(
            drain(&mut rx),
            vec![ReceiverEvent::Message { payload: expected, is_binary: binary }]
        );
    }

    // =========================================================================
    // Property 7: Sent control frames survive the receiver
    // =========================================================================
    #[test]
    fn test_ping_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..=125),
        masked in any::<bool>()
    ) {
        let mut sender = FrameSender::new(masked);
        let (header, body) = sender.ping_frame(payload.clone()).unwrap();

        let mut wire = header;
        wire.extend_from_slice(&body);

        let mut rx = FrameReceiver::new(0, 1 << 20);
        prop_assert!(rx.feed(wire).is_ok());
        prop_assert_eq!(drain(&mut rx), vec![ReceiverEvent::Ping(payload)]);
    }
}
