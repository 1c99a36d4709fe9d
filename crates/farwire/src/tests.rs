use crate::*;

fn printer_request(seq: u64) -> RequestFrame {
    let args = pack(&("hello".to_string(), 3u32)).expect("pack args");
    let mut frame = RequestFrame::new("Printer", "print", Mode::Twoway, args);
    frame.seq = seq;
    frame
}

// ============================================================================
//  FRAMES
// ============================================================================

#[test]
fn request_survives_the_wire_with_args_intact() -> anyhow::Result<()> {
    let frame = Frame::Request(printer_request(7).idempotent(true));
    let bytes = frame.to_bytes()?;

    let Frame::Request(decoded) = Frame::from_bytes(&bytes)? else {
        anyhow::bail!("expected a request frame");
    };
    assert_eq!(decoded.seq, 7);
    assert_eq!(decoded.identity, "Printer");
    assert_eq!(decoded.operation, "print");
    assert!(decoded.idempotent);
    assert!(decoded.expects_reply());

    let (text, copies): (String, u32) = unpack(&decoded.args)?;
    assert_eq!(text, "hello");
    assert_eq!(copies, 3);
    Ok(())
}

#[test]
fn batch_preserves_request_order() {
    let batch: Vec<RequestFrame> = (1..=4)
        .map(|n| RequestFrame::new("Log", format!("op{}", n), Mode::BatchOneway, vec![n as u8]))
        .collect();
    let bytes = encode(&Frame::Batch(batch.clone())).unwrap();

    let Frame::Batch(decoded) = decode(&bytes).unwrap() else {
        panic!("expected a batch frame");
    };
    let ops: Vec<&str> = decoded.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(ops, ["op1", "op2", "op3", "op4"]);
    assert!(decoded.iter().all(|r| !r.expects_reply()));
}

#[test]
fn location_forward_carries_the_new_target() {
    let target = WireReference {
        identity: "Printer".into(),
        endpoints: vec![Endpoint::tcp("backup", 10001), Endpoint::udp("backup", 10002)],
        mode: Mode::Twoway,
        secure: false,
        timeout_ms: Some(250),
        collocation_allowed: true,
    };
    let reply = Frame::Reply(ReplyFrame { seq: 9, status: ReplyStatus::LocationForward(target.clone()) });

    let decoded = decode(&encode(&reply).unwrap()).unwrap();
    assert_eq!(decoded, Frame::Reply(ReplyFrame { seq: 9, status: ReplyStatus::LocationForward(target) }));
}

#[test]
fn oneway_requests_never_expect_a_reply() {
    let mut frame = RequestFrame::new("Printer", "print", Mode::Oneway, Vec::new());
    frame.seq = 3;
    assert!(!frame.expects_reply());

    // seq 0 marks "no reply" even for twoway mode
    let frame = RequestFrame::new("Printer", "print", Mode::Twoway, Vec::new());
    assert!(!frame.expects_reply());
}

#[test]
fn truncated_frame_is_a_decode_error() {
    let bytes = encode(&Frame::Request(printer_request(1))).unwrap();
    let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "got {:?}", err);
}

#[test]
fn empty_input_is_a_decode_error() {
    assert!(matches!(decode(&[]), Err(Error::Decode(_))));
}

#[test]
fn unpack_with_wrong_type_fails() {
    let bytes = pack(&7u8).unwrap();
    let err = unpack::<String>(&bytes).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

// ============================================================================
//  VOCABULARY
// ============================================================================

#[test]
fn mode_predicates() {
    assert!(Mode::Twoway.expects_reply());
    for mode in [Mode::Oneway, Mode::BatchOneway, Mode::Datagram, Mode::BatchDatagram] {
        assert!(!mode.expects_reply(), "{} must not expect a reply", mode);
    }
    assert!(Mode::BatchOneway.is_batch() && Mode::BatchDatagram.is_batch());
    assert!(!Mode::Oneway.is_batch() && !Mode::Datagram.is_batch());
    assert!(Mode::Datagram.is_datagram() && Mode::BatchDatagram.is_datagram());
    assert!(!Mode::BatchOneway.is_datagram());
    assert_eq!(Mode::default(), Mode::Twoway);
}

#[test]
fn endpoint_capabilities_and_display() {
    let tcp = Endpoint::tcp("host", 10000);
    assert_eq!(tcp.to_string(), "tcp:host:10000");
    assert!(!tcp.is_secure());
    assert!(tcp.supports_stream() && !tcp.supports_datagram());

    let udp = Endpoint::udp("host", 10000);
    assert!(udp.supports_datagram() && !udp.supports_stream());

    let ssl = Endpoint::ssl("host", 10001);
    assert!(ssl.is_secure());

    let mem = Endpoint::mem("printer-server");
    assert_eq!(mem.to_string(), "mem:printer-server");
    assert!(mem.is_secure() && mem.supports_stream() && mem.supports_datagram());
}

#[test]
fn error_display_names_the_failure() {
    let err = Error::ProtocolViolation("reply without request".into());
    assert_eq!(err.to_string(), "Protocol violation: reply without request");
}
