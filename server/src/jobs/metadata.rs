use std::io::Cursor;

use exif::{In, Tag, Value};
use time::format_description::FormatItem;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::jobs::PlateProcessError;

/// Reads the capture timestamp embedded in the image bytes.
///
/// Returns the fallback when the image carries no usable capture field:
/// no metadata segment at all, the field is absent, or its value does
/// not parse as a date. Bytes that are not a recognizable image at all
/// are an error instead.
pub(crate) fn extract_capture_timestamp(
    bytes: &[u8],
    fallback: PrimitiveDateTime,
) -> Result<PrimitiveDateTime, PlateProcessError> {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(fallback),
        Err(err) => return Err(PlateProcessError::InvalidImageData(err.to_string())),
    };

    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        return Ok(fallback);
    };
    let Value::Ascii(ref lines) = field.value else {
        return Ok(fallback);
    };
    let Some(raw) = lines.first().filter(|raw| !raw.is_empty()) else {
        return Ok(fallback);
    };
    let Ok(parsed) = exif::DateTime::from_ascii(raw) else {
        return Ok(fallback);
    };

    Ok(to_timestamp(&parsed).unwrap_or(fallback))
}

fn to_timestamp(parsed: &exif::DateTime) -> Option<PrimitiveDateTime> {
    let month = Month::try_from(parsed.month).ok()?;
    let date = Date::from_calendar_date(i32::from(parsed.year), month, parsed.day).ok()?;
    let time = Time::from_hms(parsed.hour, parsed.minute, parsed.second).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Local wall-clock time truncated to whole seconds, the precision the
/// stored timestamps use.
pub(crate) fn now_timestamp() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let now = now.replace_nanosecond(0).unwrap_or(now);
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_timestamp(timestamp: PrimitiveDateTime) -> String {
    timestamp
        .format(iso_format())
        .unwrap_or_else(|_| timestamp.to_string())
}

fn iso_format() -> &'static [FormatItem<'static>] {
    static ISO_FORMAT: std::sync::OnceLock<Vec<FormatItem<'static>>> = std::sync::OnceLock::new();
    ISO_FORMAT.get_or_init(|| {
        time::format_description::parse("[year]-[month]-[day]T[hour]:[minute]:[second]")
            .expect("invalid time format")
    })
}

/// Minimal TIFF byte stream carrying a capture timestamp, for tests.
#[cfg(test)]
pub(crate) fn tiff_with_capture_time(ascii: &[u8]) -> Vec<u8> {
    use exif::experimental::Writer;

    let field = exif::Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![ascii.to_vec()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);
    let mut cursor = Cursor::new(Vec::new());
    writer.write(&mut cursor, false).expect("fixture encodes");
    cursor.into_inner()
}
