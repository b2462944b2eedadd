pub mod log_tailer;

pub use log_tailer::{read_log_file, InputError, LoginLogTailer};
