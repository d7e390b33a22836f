pub mod dataset;
pub mod dictionary;
pub mod error;
pub mod part10;
pub mod status;
pub mod time;

pub use dataset::{Dataset, Element, Tag, Value, Vr};
pub use dictionary::{generate_uid, tags, uids};
pub use error::{CoreError, ErrorCategory, Result};
pub use part10::FileMeta;
pub use status::{IDLE, ScopedStatus, ServerStatus, StatusSnapshot};
pub use time::{init_local_offset, now_local};
