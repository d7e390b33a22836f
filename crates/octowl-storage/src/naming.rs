//! Dataset file names: `<prefix>_<YYYYMMDD>_<HHMMSS>_<millis>.dcm`.

use octowl_core::time::{file_stamp, from_unix_millis, unix_millis};
use time::OffsetDateTime;

pub const DEFAULT_PREFIX: &str = "dataset";
pub const FILE_EXTENSION: &str = "dcm";

/// Issues time-derived file names that never repeat within one namer.
#[derive(Debug, Clone)]
pub struct FileNamer {
    prefix: String,
    last_millis: Option<i64>,
}

impl FileNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last_millis: None,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name for the current instant, moved forward one millisecond at a time
    /// past the previously issued stamp and past any name `taken` reports.
    pub fn next_name(&mut self, taken: impl Fn(&str) -> bool) -> String {
        let mut millis = unix_millis(OffsetDateTime::now_utc());
        if let Some(last) = self.last_millis {
            millis = millis.max(last + 1);
        }
        loop {
            let name = self.name_at(millis);
            if !taken(&name) {
                self.last_millis = Some(millis);
                return name;
            }
            millis += 1;
        }
    }

    fn name_at(&self, millis: i64) -> String {
        let stamp = from_unix_millis(millis)
            .map(file_stamp)
            .unwrap_or_else(|_| millis.to_string());
        format!("{}_{stamp}.{FILE_EXTENSION}", self.prefix)
    }
}

impl Default for FileNamer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
