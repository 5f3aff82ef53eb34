use std::{io, num::ParseIntError, path::PathBuf};

use thiserror::Error;

/// Possible errors that could happen while running a `Follower`
#[derive(Error, Debug)]
pub enum FollowError {
    #[error("failed to open `{}`", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat `{}` while checking for rotation", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("while working with followed file")]
    IO(#[from] io::Error),

    #[error("while saving read position")]
    Persistence(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Reasons why persisted position text could not be understood
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateParseError {
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("field is not an unsigned integer")]
    Number(#[from] ParseIntError),
}

#[cfg(test)]
mod tests {
    use std::{error::Error as _, io, path::PathBuf};

    use super::{FollowError, StateParseError};

    #[test]
    fn open_error_names_path_and_keeps_cause() {
        let err = FollowError::Open {
            path: PathBuf::from("/var/log/app.log"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "failed to open `/var/log/app.log`");
        assert_eq!(err.source().unwrap().to_string(), "gone");
    }

    #[test]
    fn io_error_converts() {
        let err: FollowError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, FollowError::IO(_)));
    }

    #[test]
    fn parse_error_messages() {
        assert_eq!(
            StateParseError::FieldCount(2).to_string(),
            "expected 3 fields, found 2"
        );
        let err: StateParseError = "x".parse::<u64>().unwrap_err().into();
        assert!(matches!(err, StateParseError::Number(_)));
    }
}
