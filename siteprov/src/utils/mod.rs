//! Small helpers shared across the crate: timestamps, secrets, naming.

mod secrets;
pub mod timestamps;

pub use secrets::{generate_password, Secret};
pub use timestamps::{file_stamp, iso_timestamp, now_utc, parse_file_stamp, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_generated_password_is_alphanumeric() {
        let password = generate_password(24);
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
