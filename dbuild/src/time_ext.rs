use std::sync::OnceLock;

use log::debug;

/// Returns the local offset, or UTC when it can not be determined. The offset is determined upon the first call and
/// cached. The first call should happen before the program spawns threads, see [`time::UtcOffset::current_local_offset`]
/// for why.
pub fn local_offset() -> time::UtcOffset {
    static CACHE: OnceLock<time::UtcOffset> = OnceLock::new();
    *CACHE.get_or_init(|| {
        time::UtcOffset::current_local_offset().unwrap_or_else(|error| {
            debug!("falling back to UTC: {error}");
            time::UtcOffset::UTC
        })
    })
}

pub fn format_local(value: time::OffsetDateTime) -> Result<String, time::error::Format> {
    let fd = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    value.to_offset(local_offset()).format(fd)
}

pub fn format_offset(value: time::UtcOffset) -> Result<String, time::error::Format> {
    let fd = time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    value.format(fd)
}
