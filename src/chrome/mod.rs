//! Chrome session over the DevTools protocol
//!
//! One browser process with one page. Downloads are allowed without prompting
//! and land in whatever directory the last `set_download_dir` call named.

mod session;

pub use session::{ChromeLauncher, ChromeSession};
