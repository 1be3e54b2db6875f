pub mod format;

pub use format::{format_hours, format_raw_schedule, format_schedule, FormattedSchedule, NOT_SCHEDULED};
