use odr_port::PortError;

/// Normalized failure categories surfaced to callers and observers.
///
/// Every platform error code maps into exactly one category; the rendered
/// message is what lands on the record's `error` field, in `Failed`
/// updates, and on the status board.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("there is not enough space available to download the resources")]
    OutOfSpace,
    #[error("the resources exceed the maximum allowed download size")]
    ExceededMaximumSize,
    #[error("the requested tag does not match any resource group")]
    InvalidTag,
    #[error("resource loading has not been configured")]
    ConfigurationMissing,
    #[error("the download session could not be created: {0}")]
    NotRequestable(String),
    #[error("{0}")]
    Unknown(String),
}

impl LoadError {
    /// Short machine-readable code used in bus payloads.
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::OutOfSpace => "out-of-space",
            LoadError::ExceededMaximumSize => "exceeded-maximum-size",
            LoadError::InvalidTag => "invalid-tag",
            LoadError::ConfigurationMissing => "configuration-missing",
            LoadError::NotRequestable(_) => "not-requestable",
            LoadError::Unknown(_) => "unknown",
        }
    }
}

impl From<PortError> for LoadError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::OutOfSpace => LoadError::OutOfSpace,
            PortError::ExceededMaximumSize => LoadError::ExceededMaximumSize,
            PortError::InvalidTag => LoadError::InvalidTag,
            PortError::NotConfigured => LoadError::ConfigurationMissing,
            PortError::Other(msg) => LoadError::Unknown(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_codes_map_to_distinct_categories() {
        assert_eq!(LoadError::from(PortError::OutOfSpace), LoadError::OutOfSpace);
        assert_eq!(
            LoadError::from(PortError::ExceededMaximumSize),
            LoadError::ExceededMaximumSize
        );
        assert_eq!(LoadError::from(PortError::InvalidTag), LoadError::InvalidTag);
        assert_eq!(
            LoadError::from(PortError::NotConfigured),
            LoadError::ConfigurationMissing
        );
        assert_eq!(
            LoadError::from(PortError::Other("socket reset".into())),
            LoadError::Unknown("socket reset".into())
        );
    }

    #[test]
    fn unknown_passes_platform_message_through() {
        let err = LoadError::from(PortError::Other("mysterious code 42".into()));
        assert_eq!(err.to_string(), "mysterious code 42");
        assert_eq!(err.code(), "unknown");
    }
}
