// SPDX-License-Identifier: MIT

//! Timestamp helpers.
//!
//! FAT stores local-less timestamps as packed 16-bit date and time words
//! (two-second resolution) plus a creation "tenths" byte. Everything written
//! by this crate uses UTC.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

#[inline]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Packs `ts` into FAT `(date, time, tenths)`.
///
/// Years are clamped to the representable 1980..=2107 range.
pub fn fat_datetime(ts: OffsetDateTime) -> (u16, u16, u8) {
    let year = ts.year().clamp(1980, 2107) as u16;
    let month = ts.month() as u16;
    let day = ts.day() as u16;

    let hour = ts.hour() as u16;
    let minute = ts.minute() as u16;
    let second = ts.second() as u16;

    let date = ((year - 1980) << 9) | (month << 5) | day;
    let time = (hour << 11) | (minute << 5) | (second / 2);
    // Tenths carry the odd second plus the sub-second part (0..=199).
    let tenths = (second % 2) as u32 * 100 + ts.millisecond() as u32 / 10;

    (date, time, tenths as u8)
}

/// Current time as FAT `(date, time, tenths)`.
pub fn fat_datetime_now() -> (u16, u16, u8) {
    fat_datetime(now_utc())
}

/// Unpacks a FAT date/time pair. Returns `None` for zeroed or invalid fields.
pub fn decode_fat_datetime(date: u16, time: u16) -> Option<PrimitiveDateTime> {
    let year = 1980 + (date >> 9) as i32;
    let month = Month::try_from(((date >> 5) & 0x0F) as u8).ok()?;
    let day = (date & 0x1F) as u8;
    let hour = (time >> 11) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let second = ((time & 0x1F) * 2) as u8;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// 32-bit volume serial derived from the clock.
pub fn volume_id_now() -> u32 {
    let now = now_utc();
    let seconds = now.unix_timestamp() as u32;
    let nanos = now.nanosecond();
    seconds.rotate_left(16) ^ nanos
}
