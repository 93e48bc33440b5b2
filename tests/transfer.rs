//! Black-box test of a sender and a receiver talking over a pair of
//! in-memory mock radios, each exercised only through the public
//! [`lora_image_transfer::SerialLink`] trait.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lora_image_transfer::{codec, CancelFlag, LinkError, NullSink, ReceiverFsm, SenderFsm, SerialLink};

/// One endpoint's view of a shared two-radio bus: frames this side writes
/// are hex-encoded and delivered as `+TEST: RX "..."` lines to the peer;
/// frames the peer writes arrive the same way here. `drop_once` lets a test
/// simulate a single lost chunk without touching the protocol under test.
struct MockRadioLink {
    own_reads: VecDeque<Vec<u8>>,
    inbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
    outbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
    drop_once: Arc<Mutex<HashSet<u16>>>,
}

fn radio_pair(drop_once_on_a_side: HashSet<u16>) -> (MockRadioLink, MockRadioLink) {
    let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
    let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
    let a = MockRadioLink {
        own_reads: VecDeque::new(),
        inbox: b_to_a.clone(),
        outbox: a_to_b.clone(),
        drop_once: Arc::new(Mutex::new(drop_once_on_a_side)),
    };
    let b = MockRadioLink {
        own_reads: VecDeque::new(),
        inbox: a_to_b,
        outbox: b_to_a,
        drop_once: Arc::new(Mutex::new(HashSet::new())),
    };
    (a, b)
}

impl SerialLink for MockRadioLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_end();
        if text.starts_with("AT+TEST=RXLRPKT") {
            return Ok(());
        }
        if let Some(rest) = text.strip_prefix("AT+TEST=TXLRPKT, \"") {
            let hex_digits = rest.trim_end_matches('"');
            let frame = hex::decode(hex_digits).unwrap_or_default();
            let is_plain_chunk = !frame.starts_with(&codec::PREAMBLE) && !frame.starts_with(&codec::NACK_TAG);
            let dropped = is_plain_chunk
                && codec::decode_chunk(&frame)
                    .map(|(seq, _)| self.drop_once.lock().unwrap().remove(&seq))
                    .unwrap_or(false);
            if !dropped {
                let line = format!("+TEST: RX \"{}\"\r\n", hex::encode_upper(&frame));
                self.outbox.lock().unwrap().push_back(line.into_bytes());
            }
            self.own_reads.push_back(b"TX DONE\r\n".to_vec());
            return Ok(());
        }
        self.own_reads.push_back(b"OK\r\n".to_vec());
        Ok(())
    }

    fn read_until(&mut self, _delimiter: &[u8], _max_bytes: usize) -> Result<Vec<u8>, LinkError> {
        if let Some(line) = self.own_reads.pop_front() {
            return Ok(line);
        }
        let deadline = Instant::now() + Duration::from_millis(500);
        loop {
            if let Some(line) = self.inbox.lock().unwrap().pop_front() {
                return Ok(line);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), LinkError> {
        Ok(())
    }
}

fn sample_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[test]
fn lossless_multi_chunk_transfer_completes() {
    let _ = env_logger::try_init();
    let (sender_link, receiver_link) = radio_pair(HashSet::new());
    let mut sender = SenderFsm::new(sender_link);
    let mut receiver = ReceiverFsm::new(receiver_link);
    let payload = sample_payload(550);
    let expected = payload.clone();

    let receiver_thread = std::thread::spawn(move || {
        let cancel = CancelFlag::new();
        let mut sink = NullSink;
        receiver.receive(&cancel, &mut sink)
    });

    let cancel = CancelFlag::new();
    let mut sink = NullSink;
    let stats = sender
        .transmit(&payload, 10, 55, &cancel, &mut sink)
        .expect("transmit completes");
    assert_eq!(stats.segments, 3);

    let (received, width, height, _recv_stats) = receiver_thread
        .join()
        .unwrap()
        .expect("receive completes");
    assert_eq!(received, expected);
    assert_eq!((width, height), (10, 55));
}

#[test]
fn single_lost_middle_chunk_is_repaired() {
    let _ = env_logger::try_init();
    let mut drop_once = HashSet::new();
    drop_once.insert(1u16);
    let (sender_link, receiver_link) = radio_pair(drop_once);
    let mut sender = SenderFsm::new(sender_link);
    let mut receiver = ReceiverFsm::new(receiver_link);
    let payload = sample_payload(550);
    let expected = payload.clone();

    let receiver_thread = std::thread::spawn(move || {
        let cancel = CancelFlag::new();
        let mut sink = NullSink;
        receiver.receive(&cancel, &mut sink)
    });

    let cancel = CancelFlag::new();
    let mut sink = NullSink;
    let stats = sender
        .transmit(&payload, 10, 55, &cancel, &mut sink)
        .expect("transmit completes despite one dropped chunk");
    assert!(stats.retransmissions >= 1);

    let (received, ..) = receiver_thread
        .join()
        .unwrap()
        .expect("receive recovers the dropped chunk");
    assert_eq!(received, expected);
}

#[test]
fn sender_reports_cancellation_without_touching_the_link() {
    let (sender_link, _receiver_link) = radio_pair(HashSet::new());
    let mut sender = SenderFsm::new(sender_link);
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut sink = NullSink;
    let payload = sample_payload(10);
    let err = sender
        .transmit(&payload, 1, 1, &cancel, &mut sink)
        .unwrap_err();
    assert!(matches!(err, lora_image_transfer::TransmitError::Cancelled));
}
