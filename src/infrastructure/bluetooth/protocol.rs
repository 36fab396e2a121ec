//! Wristband GATT Protocol
//!
//! UUIDs, command bytes and the fixed byte layouts exchanged with the
//! wristband firmware. The layouts are consumed by fixed firmware and must
//! stay bit-exact.

use tracing::trace;

/// Wristband BLE service UUID (shared by the kids and adults models)
pub const SERVICE_UUID: &str = "0000FED0-494C-4F47-4943-544543480000";

/// Settings/history characteristic UUID. Settings writes, history page
/// requests and the clear command go here, and history pages are notified back
/// on it.
pub const HISTORY_CHAR_UUID: &str = "0000FED1-494C-4F47-4943-544543480000";

/// Steps characteristic UUID - read for today's totals
pub const STEPS_CHAR_UUID: &str = "0000FED2-494C-4F47-4943-544543480000";

/// Single-byte command that wipes the stored history on the wristband
pub const CLEAR_HISTORY_COMMAND: u8 = 0xA1;

/// Length of the clock and user settings command
pub const SETTINGS_LEN: usize = 16;

/// High bit used for every flag packed into the settings command
const FLAG_BIT: u8 = 0x80;

/// Compare two UUID strings the way the BLE stacks report them (case varies).
pub fn uuid_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Decoded "today" payload read from the steps characteristic.
///
/// # Layout
///
/// ```text
/// [0-2] : Steps today (24-bit little-endian)
/// [3-4] : Exercise time in minutes (16-bit little-endian)
/// [5]   : Number of stored history days
/// [6-7] : Number of sleep records (high byte first)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodayRecord {
    pub steps: u32,
    pub exercise_time: u16,
    pub nr_step_records: u8,
    pub nr_sleep_records: u16,
}

/// Decoded history page, one per stored day.
///
/// Steps and exercise time default to 0 when the page is too short; every
/// other field is `None` when its bytes are missing.
///
/// # Layout
///
/// ```text
/// [0]     : bit 7 - days-ago flag
/// [1-3]   : Steps (24-bit little-endian)
/// [4-5]   : Exercise time (16-bit little-endian)
/// [6-8]   : Goal steps (23 bits), byte 8 bit 7 = goal unit
/// [9-10]  : Distance (16-bit little-endian)
/// [11-13] : Calories per step (23 bits), byte 13 bit 7 = distance unit
/// [14-16] : BMR (24-bit little-endian)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryDay {
    pub days_ago_flag: Option<bool>,
    pub steps: u32,
    pub exercise_time: u16,
    pub goal_steps: Option<u32>,
    pub goal_unit_flag: Option<bool>,
    pub distance: Option<u16>,
    pub calories_per_step: Option<u32>,
    pub distance_unit_flag: Option<bool>,
    pub bmr: Option<u32>,
}

/// A field is present only when the buffer reaches its highest byte.
fn has(bytes: &[u8], last: usize) -> bool {
    bytes.len() > last
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le24(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], 0])
}

/// Decode the "today" payload. Missing fields decode to 0.
pub fn decode_today(bytes: &[u8]) -> TodayRecord {
    #[cfg(debug_assertions)]
    trace!("Today payload: {:02X?}", bytes);

    TodayRecord {
        steps: if has(bytes, 2) { le24(bytes, 0) } else { 0 },
        exercise_time: if has(bytes, 4) { le16(bytes, 3) } else { 0 },
        nr_step_records: if has(bytes, 5) { bytes[5] } else { 0 },
        nr_sleep_records: if has(bytes, 7) {
            u16::from_be_bytes([bytes[6], bytes[7]])
        } else {
            0
        },
    }
}

/// Decode one history page.
pub fn decode_history_day(bytes: &[u8]) -> HistoryDay {
    #[cfg(debug_assertions)]
    trace!("History payload: {:02X?}", bytes);

    HistoryDay {
        days_ago_flag: has(bytes, 0).then(|| bytes[0] & FLAG_BIT != 0),
        steps: if has(bytes, 3) { le24(bytes, 1) } else { 0 },
        exercise_time: if has(bytes, 5) { le16(bytes, 4) } else { 0 },
        goal_steps: has(bytes, 8).then(|| le24(bytes, 6) & 0x7F_FFFF),
        goal_unit_flag: has(bytes, 8).then(|| bytes[8] & FLAG_BIT != 0),
        distance: has(bytes, 10).then(|| le16(bytes, 9)),
        calories_per_step: has(bytes, 13).then(|| le24(bytes, 11) & 0x7F_FFFF),
        distance_unit_flag: has(bytes, 13).then(|| bytes[13] & FLAG_BIT != 0),
        bmr: has(bytes, 16).then(|| le24(bytes, 14)),
    }
}

/// Clock and user settings written to the settings characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsCommand {
    pub hour24: bool,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 23 bits are transmitted
    pub goal_steps: u32,
    pub goal_unit: bool,
    /// Micrometers per step, 16 bits are transmitted
    pub distance_per_step: u32,
    pub distance_unit: bool,
    /// 31 bits are transmitted
    pub calories_per_step: i32,
    /// 24 bits are transmitted
    pub bmr: i32,
    pub over_100_goal: bool,
}

impl SettingsCommand {
    pub fn encode(&self) -> [u8; SETTINGS_LEN] {
        encode_settings(self)
    }
}

fn flag(set: bool) -> u8 {
    if set {
        FLAG_BIT
    } else {
        0
    }
}

/// Pack a settings command into its 16-byte wire form.
///
/// # Layout
///
/// ```text
/// [0]     : Hour, bit 7 = 24h clock
/// [1]     : Minute
/// [2]     : Second
/// [3-5]   : Goal (23 bits), byte 5 bit 7 = goal unit
/// [6-7]   : Distance per step (16 bits)
/// [8-11]  : Calories per step (31 bits), byte 11 bit 7 = distance unit
/// [12-14] : BMR (24 bits)
/// [15]    : Over-100%-goal status byte
/// ```
pub fn encode_settings(cmd: &SettingsCommand) -> [u8; SETTINGS_LEN] {
    let goal = cmd.goal_steps.to_le_bytes();
    let distance = cmd.distance_per_step.to_le_bytes();
    let calories = cmd.calories_per_step.to_le_bytes();
    let bmr = cmd.bmr.to_le_bytes();

    [
        (cmd.hour & 0x7F) | flag(cmd.hour24),
        cmd.minute,
        cmd.second,
        goal[0],
        goal[1],
        (goal[2] & 0x7F) | flag(cmd.goal_unit),
        distance[0],
        distance[1],
        calories[0],
        calories[1],
        calories[2],
        (calories[3] & 0x7F) | flag(cmd.distance_unit),
        bmr[0],
        bmr[1],
        bmr[2],
        flag(cmd.over_100_goal),
    ]
}

/// Single-byte request for the history page of `day` (0 = most recent).
pub fn history_request(day: u8) -> [u8; 1] {
    [day]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_today() {
        let record = decode_today(&[0x10, 0x00, 0x00, 0x05, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(record.steps, 16);
        assert_eq!(record.exercise_time, 5);
        assert_eq!(record.nr_step_records, 2);
        assert_eq!(record.nr_sleep_records, 0);
    }

    #[test]
    fn test_decode_today_bit_packing() {
        let record = decode_today(&[0x56, 0x34, 0x12, 0xCD, 0xAB, 0x1E, 0x01, 0x02]);
        assert_eq!(record.steps, 0x12_3456);
        assert_eq!(record.exercise_time, 0xABCD);
        assert_eq!(record.nr_step_records, 30);
        assert_eq!(record.nr_sleep_records, 0x0102);
    }

    #[test]
    fn test_decode_today_short_buffer_is_zero() {
        assert_eq!(decode_today(&[]), TodayRecord::default());

        let record = decode_today(&[0x10, 0x00, 0x00, 0x05]);
        assert_eq!(record.steps, 16);
        assert_eq!(record.exercise_time, 0);
        assert_eq!(record.nr_step_records, 0);
    }

    #[test]
    fn test_decode_history_day() {
        let page = [
            0x80, // days-ago flag
            0x10, 0x27, 0x00, // 10000 steps
            0x3C, 0x00, // 60 minutes
            0x10, 0x27, 0x80, // goal 10000, goal unit set
            0xE8, 0x03, // 1000 distance
            0xB0, 0x04, 0x80, // 1200 calories, distance unit set
            0xF0, 0x49, 0x02, // bmr 150000
        ];
        let day = decode_history_day(&page);
        assert_eq!(day.days_ago_flag, Some(true));
        assert_eq!(day.steps, 10_000);
        assert_eq!(day.exercise_time, 60);
        assert_eq!(day.goal_steps, Some(10_000));
        assert_eq!(day.goal_unit_flag, Some(true));
        assert_eq!(day.distance, Some(1000));
        assert_eq!(day.calories_per_step, Some(1200));
        assert_eq!(day.distance_unit_flag, Some(true));
        assert_eq!(day.bmr, Some(150_000));
    }

    #[test]
    fn test_decode_history_day_absent_fields() {
        // Steps and exercise time present, nothing after
        let day = decode_history_day(&[0x00, 0x05, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(day.days_ago_flag, Some(false));
        assert_eq!(day.steps, 5);
        assert_eq!(day.exercise_time, 2);
        assert_eq!(day.goal_steps, None);
        assert_eq!(day.goal_unit_flag, None);
        assert_eq!(day.distance, None);
        assert_eq!(day.calories_per_step, None);
        assert_eq!(day.distance_unit_flag, None);
        assert_eq!(day.bmr, None);

        let empty = decode_history_day(&[]);
        assert_eq!(empty.steps, 0);
        assert_eq!(empty.exercise_time, 0);
        assert_eq!(empty.days_ago_flag, None);
        assert_eq!(empty.bmr, None);
    }

    #[test]
    fn test_encode_settings_golden() {
        let cmd = SettingsCommand {
            hour24: true,
            hour: 14,
            minute: 30,
            second: 0,
            goal_steps: 10_000,
            goal_unit: false,
            distance_per_step: 500_000,
            distance_unit: true,
            calories_per_step: 1200,
            bmr: 150_000,
            over_100_goal: true,
        };
        assert_eq!(
            cmd.encode(),
            [
                0x8E, 0x1E, 0x00, // 14:30:00, 24h
                0x10, 0x27, 0x00, // goal 10000
                0x20, 0xA1, // distance truncated to 16 bits
                0xB0, 0x04, 0x00, 0x80, // calories 1200, distance unit
                0xF0, 0x49, 0x02, // bmr 150000
                0x80, // status
            ]
        );
    }

    #[test]
    fn test_encode_settings_flag_bits_share_bytes() {
        let cmd = SettingsCommand {
            hour24: false,
            hour: 7,
            minute: 5,
            second: 59,
            goal_steps: 0x7F_FFFF,
            goal_unit: true,
            distance_per_step: 0xBEEF,
            distance_unit: false,
            calories_per_step: 0x7FFF_FFFF,
            bmr: 0,
            over_100_goal: false,
        };
        let bytes = encode_settings(&cmd);
        assert_eq!(bytes[0], 0x07);
        assert_eq!(&bytes[3..6], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[6..8], &[0xEF, 0xBE]);
        assert_eq!(&bytes[8..12], &[0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(bytes[15], 0x00);
    }

    #[test]
    fn test_uuid_eq_ignores_case() {
        assert!(uuid_eq(
            "0000fed1-494c-4f47-4943-544543480000",
            HISTORY_CHAR_UUID
        ));
        assert!(!uuid_eq(STEPS_CHAR_UUID, HISTORY_CHAR_UUID));
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(history_request(3), [0x03]);
        assert_eq!(CLEAR_HISTORY_COMMAND, 0xA1);
    }
}
