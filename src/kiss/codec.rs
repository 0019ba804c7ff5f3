//! KISS byte-stream framing: FEND-delimited frames with FESC byte-stuffing.
//!
//! Standard TNC KISS framing. A frame on the wire is:
//! `FEND ‖ command(1) ‖ data ‖ FEND`, with `FEND`/`FESC` bytes inside `data` escaped.
//! Only command `0x00` (data frame, port 0) is interpreted as carrying an AX.25 frame;
//! other command nibbles are passed through unparsed by `KissDecoder::push` (this node
//! has no use for KISS command frames such as TXDELAY or hardware-specific extensions).

const FEND: u8 = 0xC0;
const FESC: u8 = 0xDB;
const TFEND: u8 = 0xDC;
const TFESC: u8 = 0xDD;

const DATA_FRAME_COMMAND: u8 = 0x00;

/// Wrap `frame` (an AX.25 frame) as a KISS data frame on port 0.
pub fn encode(frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() + 4);
    out.push(FEND);
    out.push(DATA_FRAME_COMMAND);
    for &b in frame {
        match b {
            FEND => {
                out.push(FESC);
                out.push(TFEND);
            }
            FESC => {
                out.push(FESC);
                out.push(TFESC);
            }
            _ => out.push(b),
        }
    }
    out.push(FEND);
    out
}

/// Streaming KISS decoder: feed it arbitrary byte chunks, get back zero or more
/// fully-deframed data-frame payloads, with partial-frame state carried across calls.
#[derive(Default)]
pub struct KissDecoder {
    in_frame: bool,
    escaped: bool,
    saw_command: bool,
    buf: Vec<u8>,
}

impl KissDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes read from the transport; returns any frames completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for &b in bytes {
            if b == FEND {
                if self.in_frame && self.saw_command && !self.buf.is_empty() {
                    out.push(std::mem::take(&mut self.buf));
                }
                self.in_frame = true;
                self.saw_command = false;
                self.escaped = false;
                self.buf.clear();
                continue;
            }
            if !self.in_frame {
                continue;
            }
            if !self.saw_command {
                self.saw_command = true;
                if b != DATA_FRAME_COMMAND {
                    // Not a data frame; stop collecting until the next FEND.
                    self.in_frame = false;
                }
                continue;
            }
            if self.escaped {
                self.escaped = false;
                match b {
                    TFEND => self.buf.push(FEND),
                    TFESC => self.buf.push(FESC),
                    other => self.buf.push(other),
                }
                continue;
            }
            if b == FESC {
                self.escaped = true;
                continue;
            }
            self.buf.push(b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_plain_frame() {
        let frame = vec![1, 2, 3, 4, 5];
        let wire = encode(&frame);
        let mut dec = KissDecoder::new();
        let frames = dec.push(&wire);
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn round_trip_with_fend_and_fesc_bytes() {
        let frame = vec![0x00, FEND, 0xAA, FESC, 0xBB, FEND];
        let wire = encode(&frame);
        let mut dec = KissDecoder::new();
        let frames = dec.push(&wire);
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn decoder_handles_byte_at_a_time_chunks() {
        let frame = vec![10, FEND, 20, FESC, 30];
        let wire = encode(&frame);
        let mut dec = KissDecoder::new();
        let mut got = Vec::new();
        for b in &wire {
            got.extend(dec.push(&[*b]));
        }
        assert_eq!(got, vec![frame]);
    }

    #[test]
    fn decoder_emits_multiple_frames_from_one_chunk() {
        let f1 = vec![1, 2, 3];
        let f2 = vec![4, 5, 6];
        let mut wire = encode(&f1);
        wire.extend(encode(&f2));
        let mut dec = KissDecoder::new();
        let frames = dec.push(&wire);
        assert_eq!(frames, vec![f1, f2]);
    }

    #[test]
    fn non_data_command_is_ignored() {
        let mut wire = vec![FEND, 0x06]; // TXDELAY command, not a data frame
        wire.extend_from_slice(&[1, 2, 3]);
        wire.push(FEND);
        let mut dec = KissDecoder::new();
        let frames = dec.push(&wire);
        assert!(frames.is_empty());
    }
}
