use std::fmt;

/// Errors reported by the point cloud data model and its GPU upload path.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PointCloudError {
    #[error("{channel} array has {actual} entries but the cloud has {expected} points")]
    LengthMismatch {
        channel: Channel,
        expected: usize,
        actual: usize,
    },

    #[error("flat position array length {0} is not a multiple of 3")]
    FlatLength(usize),

    #[error("buffer {label} needs {size} bytes but the device allows {limit}")]
    BufferTooLarge { label: String, size: u64, limit: u64 },

    #[error("settings error: {0}")]
    Settings(String),
}

impl PointCloudError {
    pub fn settings<T: ToString>(msg: T) -> Self {
        PointCloudError::Settings(msg.to_string())
    }
}

/// Per-point data channel named in length errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Scale,
    Color,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Scale => f.write_str("scale"),
            Channel::Color => f.write_str("color"),
        }
    }
}

pub type Result<T, E = PointCloudError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_channel() {
        let err = PointCloudError::LengthMismatch {
            channel: Channel::Color,
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "color array has 3 entries but the cloud has 4 points"
        );
    }
}
