//! The `utils` module provides the pieces shared across `pullsub`: the crate
//! error type, logging setup and clock helpers.

pub mod error;
pub mod logging;

pub use error::{Error, ErrorKind, Result};

/// Milliseconds since the UNIX epoch, the timestamp unit used by every record.
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::error::{Error, ErrorKind};
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        assert_eq!(Error::TopicNotFound("t".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::SubscriptionAlreadyExists("s".into()).kind().status_code(),
            409
        );
        assert_eq!(Error::InvalidArgument("x".into()).kind().status_code(), 400);
        assert_eq!(Error::EmptyMessage.kind(), ErrorKind::EmptyBacklog);
        assert_eq!(
            Error::storage("get", "k", "boom").kind().status_code(),
            500
        );
    }

    #[test]
    fn non_storage_failures_are_internal() {
        assert_eq!(
            Error::storage("get", "k", "boom").kind(),
            ErrorKind::StorageUnavailable
        );
        let rejected = Error::PushRejected {
            endpoint: "http://localhost/hook".into(),
            status: 503,
        };
        assert_eq!(rejected.kind(), ErrorKind::Internal);
        let io = Error::Io(std::io::Error::other("disk"));
        assert_eq!(io.kind(), ErrorKind::Internal);
        let config = Error::Config(::config::ConfigError::Message("bad".into()));
        assert_eq!(config.kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
    }
}
