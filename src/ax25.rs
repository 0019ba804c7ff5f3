//! AX.25 UI (unnumbered information) frame encode/decode.
//!
//! Only the fixed two-address UI frame shape this node needs is supported:
//! `dest_addr(7) ‖ src_addr(7) ‖ control(0x03) ‖ pid(0xF0) ‖ info(variable)`.

/// Control field value for an unnumbered information frame, no poll/final bit.
const UI_CONTROL: u8 = 0x03;
/// PID meaning "no layer 3 protocol" (the mesh header rides directly in `info`).
const UI_PID: u8 = 0xF0;

/// Number of bytes occupied by the two address fields, control and PID, before `info` starts.
const HEADER_LEN: usize = 7 + 7 + 1 + 1;

/// Encode a single AX.25 address field (7 bytes) from a `CALL[-SSID]` string.
///
/// The base callsign is uppercased, left-truncated to 6 characters, and right-padded
/// with ASCII spaces. Each of those 6 bytes is left-shifted by one bit, per the AX.25
/// address encoding. The 7th byte carries the SSID shifted into bits 1-4; `last` sets
/// the address-extension bit (bit 0), which AX.25 uses to mark the final address in
/// the address field (here, always the source address).
pub fn encode_address(callsign: &str, last: bool) -> [u8; 7] {
    let (base, ssid) = match callsign.split_once('-') {
        Some((base, ssid_str)) => (base, ssid_str.parse::<u8>().unwrap_or(0)),
        None => (callsign, 0u8),
    };

    let base_upper = base.to_ascii_uppercase();
    let mut padded = [b' '; 6];
    for (slot, b) in padded.iter_mut().zip(base_upper.as_bytes().iter().take(6)) {
        *slot = *b;
    }

    let mut addr = [0u8; 7];
    for (i, b) in padded.iter().enumerate() {
        addr[i] = b << 1;
    }

    let mut ssid_field = 0x60 | ((ssid & 0x0F) << 1);
    if last {
        ssid_field |= 0x01;
    }
    addr[6] = ssid_field;
    addr
}

/// Build a complete AX.25 UI frame carrying `info` as the information field.
///
/// `dest_callsign` is the mesh broadcast/destination callsign; `src_callsign` is this
/// node's own callsign (with optional `-SSID`), encoded as the final (source) address.
pub fn build_ui_frame(dest_callsign: &str, src_callsign: &str, info: &[u8]) -> Vec<u8> {
    let dest = encode_address(dest_callsign, false);
    let src = encode_address(src_callsign, true);

    let mut frame = Vec::with_capacity(HEADER_LEN + info.len());
    frame.extend_from_slice(&dest);
    frame.extend_from_slice(&src);
    frame.push(UI_CONTROL);
    frame.push(UI_PID);
    frame.extend_from_slice(info);
    frame
}

/// Extract the information field from a received AX.25 UI frame.
///
/// Per the mesh layer's simplifying assumption, byte index 16 (two 7-byte addresses
/// plus control plus PID) is always the start of `info`; frames at or below that
/// length carry no payload and are dropped.
pub fn extract_info(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() <= HEADER_LEN {
        None
    } else {
        Some(&frame[HEADER_LEN..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_address_pads_and_shifts() {
        let addr = encode_address("N0CALL", false);
        assert_eq!(addr[6] & 0x01, 0);
        // 'N' == 0x4E, shifted left by one is 0x9C.
        assert_eq!(addr[0], 0x4E << 1);
    }

    #[test]
    fn encode_address_truncates_and_carries_ssid() {
        let addr = encode_address("toolongcall-7", true);
        // Truncated to 6 chars, uppercased: "TOOLON".
        assert_eq!(addr[0], b'T' << 1);
        assert_eq!(addr[5], b'N' << 1);
        let ssid_field = addr[6];
        assert_eq!(ssid_field & 0x01, 0x01);
        assert_eq!((ssid_field >> 1) & 0x0F, 7);
    }

    #[test]
    fn encode_address_short_call_is_space_padded() {
        let addr = encode_address("AB", false);
        assert_eq!(addr[2], b' ' << 1);
    }

    #[test]
    fn build_and_extract_round_trip() {
        let info = b"mesh-payload-bytes";
        let frame = build_ui_frame("QMESH-0", "N0CALL-1", info);
        assert_eq!(frame.len(), HEADER_LEN + info.len());
        assert_eq!(extract_info(&frame), Some(&info[..]));
    }

    #[test]
    fn extract_info_drops_short_frames() {
        let short = vec![0u8; HEADER_LEN];
        assert_eq!(extract_info(&short), None);
    }
}
