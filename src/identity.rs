use std::{fs::File, io, os::unix::prelude::MetadataExt, path::Path};

use serde::{Deserialize, Serialize};

/// Identity of a concrete file instance, independent of the path it is reachable by.
///
/// Two identities are equal only if they refer to the same inode on the same device. A log file that was rotated
/// away and recreated under the same name will have a different identity.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FileIdentity {
    /// Ask the filesystem for metadata of whatever `path` currently refers to
    pub fn of_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Identity of an already opened handle, unaffected by renames or deletion of its path
    pub fn of_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self::from_metadata(&metadata))
    }

    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}
