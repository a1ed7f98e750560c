mod time;

pub use time::{format_local, now_local};
