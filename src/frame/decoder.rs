use chrono::Local;

use super::{RawFrame, FRAME_LENGTH};
use crate::error::DecodeError;
use crate::measurement::{DeviceAddress, Measurement};

/// Frame header sent by the UM24C, voltage in V/100
const HEADER_UM24C: [u8; 2] = [0x09, 0x63];
/// Frame header sent by the UM25C, voltage in V/1000
const HEADER_UM25C: [u8; 2] = [0x09, 0xc9];

const OFFSET_VOLTAGE: usize = 2;
const OFFSET_CURRENT: usize = 4;
const OFFSET_POWER: usize = 6;
const OFFSET_TEMP_C: usize = 10;
const OFFSET_TEMP_F: usize = 12;

/// Decode a data dump into a [`Measurement`].
///
/// The frame format is (all fields big endian):
///
/// Start Byte | End Byte | Meaning
/// 0          | 1        | Model header, `09 63` (UM24C) or `09 c9` (UM25C)
/// 2          | 3        | Voltage, V/100 (UM24C) or V/1000 (UM25C)
/// 4          | 5        | Current in mA
/// 6          | 9        | Power in mW as computed by the meter
/// 10         | 11       | Temperature in °C, signed
/// 12         | 13       | Temperature in °F, signed
/// 14         | 129      | Counters, data groups and settings, not decoded
///
/// Power and °F are recomputed from the other fields rather than read.
pub fn decode(raw: &RawFrame, address: &DeviceAddress) -> Result<Measurement, DecodeError> {
    let bytes = raw.as_bytes();
    let header = [bytes[0], bytes[1]];

    let voltage_cv = match header {
        HEADER_UM24C => u32::from(u16_at(bytes, OFFSET_VOLTAGE)),
        // rounded half up to the UM24C resolution
        HEADER_UM25C => (u32::from(u16_at(bytes, OFFSET_VOLTAGE)) + 5) / 10,
        _ => {
            return Err(DecodeError::UnknownHeader {
                header,
                address: address.clone(),
            })
        }
    };
    let current_ma = u32::from(u16_at(bytes, OFFSET_CURRENT));
    let temp_c = i32::from(i16_at(bytes, OFFSET_TEMP_C));

    Ok(Measurement {
        address: address.clone(),
        voltage: f64::from(voltage_cv) / 100.0,
        current: f64::from(current_ma) / 1000.0,
        // cV * mA = 1e-5 W
        power_mw: (u64::from(voltage_cv) * u64::from(current_ma)) as f64 / 100_000.0,
        temperature_c: f64::from(temp_c),
        temperature_f: f64::from(temp_c * 9 + 160) / 5.0,
        timestamp: Local::now(),
    })
}

/// Build a UM24C data dump carrying the given values. The trailing
/// counters are left zeroed.
pub fn encode(voltage_cv: u16, current_ma: u16, temperature_c: i16) -> RawFrame {
    let mut bytes = [0u8; FRAME_LENGTH];
    bytes[0..2].copy_from_slice(&HEADER_UM24C);
    bytes[OFFSET_VOLTAGE..OFFSET_VOLTAGE + 2].copy_from_slice(&voltage_cv.to_be_bytes());
    bytes[OFFSET_CURRENT..OFFSET_CURRENT + 2].copy_from_slice(&current_ma.to_be_bytes());

    let power_mw = u32::from(voltage_cv) * u32::from(current_ma) / 100;
    bytes[OFFSET_POWER..OFFSET_POWER + 4].copy_from_slice(&power_mw.to_be_bytes());

    let temperature_f = (i32::from(temperature_c) * 9 / 5 + 32) as i16;
    bytes[OFFSET_TEMP_C..OFFSET_TEMP_C + 2].copy_from_slice(&temperature_c.to_be_bytes());
    bytes[OFFSET_TEMP_F..OFFSET_TEMP_F + 2].copy_from_slice(&temperature_f.to_be_bytes());

    RawFrame::new(bytes)
}

fn u16_at(bytes: &[u8; FRAME_LENGTH], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn i16_at(bytes: &[u8; FRAME_LENGTH], offset: usize) -> i16 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}
