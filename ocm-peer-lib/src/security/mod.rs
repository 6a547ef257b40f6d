pub mod ip_filter;

pub use ip_filter::{classify_ip, is_blocked_hostname, is_blocked_ip, normalize_host, BlockReason};
