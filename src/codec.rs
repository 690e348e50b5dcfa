//! Decoders and encoders for the standard GATT measurement payloads.
//!
//! Everything in this module is a pure function over byte slices. Decoding
//! never fails: a malformed or truncated payload produces an all-absent
//! [`RealTimeData`] and a log line, and the notification stream stays open.
//! The byte layouts are normative for interoperability; see the tests.

use bytes::Buf;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    types::RealTimeData, CYCLING_POWER_MEASUREMENT_UUID, HEART_RATE_MEASUREMENT_UUID,
};

/// Set Target Power opcode on the Fitness Machine Control Point
pub const OPCODE_SET_TARGET_POWER: u8 = 0x05;

/// Decode a Cycling Power Measurement notification (0x2A63)
///
/// Layout of the subset used here:
/// - Bytes 0–1: flags, little-endian u16 (presence checks only)
/// - Bytes 2–3: instantaneous power, little-endian i16, watts
/// - Byte 6: crank cadence proxy, u8, rpm (only when the payload is longer
///   than 6 bytes)
///
/// Payloads shorter than 4 bytes decode to an all-absent sample; this
/// function never panics.
#[must_use]
pub fn decode_cycling_power(data: &[u8]) -> RealTimeData {
    if data.len() < 4 {
        warn!(len = data.len(), "Cycling power payload too short, dropping");
        return RealTimeData::empty();
    }

    let mut buf = data;
    let _flags = buf.get_u16_le();
    let power = buf.get_i16_le();

    let cadence = if data.len() > 6 { Some(data[6]) } else { None };

    debug!(power, ?cadence, "Decoded cycling power measurement");

    RealTimeData {
        power: Some(power),
        cadence,
        ..RealTimeData::empty()
    }
}

/// Decode a Heart Rate Measurement notification (0x2A37)
///
/// Byte 0 is the flags field; its bit 0 selects the value encoding:
/// `0` means byte 1 is a u8 BPM value, `1` means bytes 1-2 are a
/// little-endian u16 BPM value. Empty or truncated payloads decode to an
/// absent heart rate.
#[must_use]
pub fn decode_heart_rate(data: &[u8]) -> RealTimeData {
    if data.is_empty() {
        warn!("Heart rate payload empty, dropping");
        return RealTimeData::empty();
    }

    let flags = data[0];
    let heart_rate = if flags & 0x01 == 0 {
        data.get(1).map(|&bpm| u16::from(bpm))
    } else if data.len() >= 3 {
        Some(u16::from_le_bytes([data[1], data[2]]))
    } else {
        warn!(len = data.len(), "16-bit heart rate payload truncated");
        None
    };

    debug!(?heart_rate, "Decoded heart rate measurement");

    RealTimeData {
        heart_rate,
        ..RealTimeData::empty()
    }
}

/// Encode a Set Target Power command for the Fitness Machine Control Point
///
/// Produces the 3-byte command `[0x05, lo, hi]` with the target in watts as
/// a little-endian u16. The write is fire-and-forget; there is no response
/// payload to parse.
#[must_use]
pub fn encode_set_target_power(watts: u16) -> [u8; 3] {
    let le = watts.to_le_bytes();
    [OPCODE_SET_TARGET_POWER, le[0], le[1]]
}

/// Dispatch a characteristic notification to the matching decoder
///
/// Returns `None` for characteristics the codec does not understand, which
/// the connection manager treats as traffic to ignore rather than an error.
#[must_use]
pub fn decode_notification(characteristic: Uuid, data: &[u8]) -> Option<RealTimeData> {
    match characteristic {
        CYCLING_POWER_MEASUREMENT_UUID => Some(decode_cycling_power(data)),
        HEART_RATE_MEASUREMENT_UUID => Some(decode_heart_rate(data)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_short_payloads_decode_to_absent() {
        for len in 0..4 {
            let data = vec![0u8; len];
            let sample = decode_cycling_power(&data);
            assert_eq!(sample.power, None, "len {len}");
            assert_eq!(sample.cadence, None, "len {len}");
        }
    }

    #[test]
    fn test_power_with_cadence_byte() {
        // flags, power = 100 W LE, filler, cadence = 90 rpm at byte 6
        let data = [0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x5A];
        let sample = decode_cycling_power(&data);

        assert_eq!(sample.power, Some(100));
        assert_eq!(sample.cadence, Some(90));
        assert_eq!(sample.heart_rate, None);
    }

    #[test]
    fn test_power_without_cadence_byte() {
        let data = [0x00, 0x00, 0xFA, 0x00];
        let sample = decode_cycling_power(&data);

        assert_eq!(sample.power, Some(250));
        assert_eq!(sample.cadence, None);
    }

    #[test]
    fn test_power_is_signed() {
        // -10 W (braking/drivetrain loss readings exist on some meters)
        let data = [0x00, 0x00, 0xF6, 0xFF];
        let sample = decode_cycling_power(&data);
        assert_eq!(sample.power, Some(-10));
    }

    #[test]
    fn test_heart_rate_u8_and_u16_agree() {
        let narrow = decode_heart_rate(&[0x00, 0x48]);
        let wide = decode_heart_rate(&[0x01, 0x48, 0x00]);

        assert_eq!(narrow.heart_rate, Some(72));
        assert_eq!(wide.heart_rate, Some(72));
    }

    #[test]
    fn test_heart_rate_empty_payload() {
        let sample = decode_heart_rate(&[]);
        assert_eq!(sample.heart_rate, None);
    }

    #[test]
    fn test_heart_rate_truncated_u16_payload() {
        let sample = decode_heart_rate(&[0x01, 0x48]);
        assert_eq!(sample.heart_rate, None);
    }

    #[test]
    fn test_encode_set_target_power() {
        assert_eq!(encode_set_target_power(250), [0x05, 0xFA, 0x00]);
        assert_eq!(encode_set_target_power(0), [0x05, 0x00, 0x00]);
        assert_eq!(encode_set_target_power(1000), [0x05, 0xE8, 0x03]);
    }

    #[test]
    fn test_notification_dispatch_by_uuid() {
        let power = decode_notification(CYCLING_POWER_MEASUREMENT_UUID, &[0, 0, 0x64, 0]).unwrap();
        assert_eq!(power.power, Some(100));

        let hr = decode_notification(HEART_RATE_MEASUREMENT_UUID, &[0x00, 0x48]).unwrap();
        assert_eq!(hr.heart_rate, Some(72));

        let unknown = decode_notification(crate::CLIENT_CHARACTERISTIC_CONFIG_UUID, &[0, 0]);
        assert!(unknown.is_none());
    }
}
