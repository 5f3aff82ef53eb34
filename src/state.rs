use std::{
    ffi::OsString,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{FileIdentity, StateParseError};

/// Read cursor inside a specific file instance.
///
/// Textual form is a single line `<dev> <inode> <offset>`.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionRecord {
    pub dev: u64,
    pub inode: u64,
    pub offset: u64,
}

impl PositionRecord {
    pub fn new(identity: FileIdentity, offset: u64) -> Self {
        Self {
            dev: identity.dev,
            inode: identity.ino,
            offset,
        }
    }

    /// File instance this record points into
    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            dev: self.dev,
            ino: self.inode,
        }
    }
}

impl fmt::Display for PositionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dev, self.inode, self.offset)
    }
}

impl FromStr for PositionRecord {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [dev, inode, offset] = fields[..] else {
            return Err(StateParseError::FieldCount(fields.len()));
        };
        Ok(Self {
            dev: dev.parse()?,
            inode: inode.parse()?,
            offset: offset.parse()?,
        })
    }
}

/// Storage for the read position of a `Follower`.
///
/// `load` is consulted once when the follower first opens its file; `save` is called after every consumed line.
/// Implementations should treat anything they cannot make sense of as "no prior state" rather than failing.
pub trait StateStore: Send {
    fn load(&mut self) -> Option<PositionRecord>;

    fn save(&mut self, record: PositionRecord) -> io::Result<()>;
}

/// `StateStore` keeping a single `PositionRecord` as text in a file.
///
/// Each save writes a sibling `<path>.tmp` and renames it over `path`, so a reader never observes a half-written
/// record; a crash can at worst leave the previous record or a stray temporary file behind.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let temp_path = with_tmp_suffix(&path);
        Self { path, temp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `/a/b.pos` -> `/a/b.pos.tmp`, staying in the same directory so rename never crosses filesystems
fn with_tmp_suffix(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

impl StateStore for FileStateStore {
    fn load(&mut self) -> Option<PositionRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file unreadable, starting without saved position"
                );
                return None;
            }
        };

        match content.parse::<PositionRecord>() {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file malformed, starting without saved position"
                );
                None
            }
        }
    }

    fn save(&mut self, record: PositionRecord) -> io::Result<()> {
        let mut file = fs::File::create(&self.temp_path)?;
        writeln!(file, "{record}")?;
        drop(file);
        fs::rename(&self.temp_path, &self.path)
    }
}
