use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{FileIdentity, FileStateStore, FollowError, PositionRecord, StateStore};

/// Configuration of a `Follower` that is not a callback
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowOptions {
    /// Start at the end of the file on the very first open. Never applied to re-opens after rotation.
    pub skip_to_end: bool,
    /// Where to persist read position. Persistence is disabled when `None`.
    pub state_file: Option<PathBuf>,
    /// Wait between passes that found nothing new
    pub poll_interval: Duration,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            skip_to_end: false,
            state_file: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl FollowOptions {
    pub fn skip_to_end(mut self, skip: bool) -> Self {
        self.skip_to_end = skip;
        self
    }

    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

type LineHandler = Box<dyn FnMut(&mut FollowContext<'_>, &[u8]) + Send>;
type EventHandler = Box<dyn FnMut(&mut FollowContext<'_>) + Send>;

/// Callbacks invoked by the follow loop.
///
/// Only `on_line` is always present; by default it writes each line verbatim to stdout.
pub struct Handlers {
    on_line: LineHandler,
    on_open: Option<EventHandler>,
    on_close: Option<EventHandler>,
    on_periodic: Option<EventHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            on_line: Box::new(print_line),
            on_open: None,
            on_close: None,
            on_periodic: None,
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_periodic", &self.on_periodic.is_some())
            .finish_non_exhaustive()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every line, terminator included if the file had one
    pub fn on_line<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut FollowContext<'_>, &[u8]) + Send + 'static,
    {
        self.on_line = Box::new(f);
        self
    }

    /// Called after every successful open, initial or after rotation
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut FollowContext<'_>) + Send + 'static,
    {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called right before the handle is closed
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut FollowContext<'_>) + Send + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Called after each pass that exhausted currently available lines
    pub fn on_periodic<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut FollowContext<'_>) + Send + 'static,
    {
        self.on_periodic = Some(Box::new(f));
        self
    }
}

fn print_line(_: &mut FollowContext<'_>, line: &[u8]) {
    if let Err(e) = io::stdout().lock().write_all(line) {
        tracing::debug!(error = %e, "failed to write line to stdout");
    }
}

/// Cloneable handle to request a `Follower` to stop from another thread.
///
/// The loop observes the request at its next check point, at the latest after the current poll interval.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct OpenFile {
    reader: BufReader<File>,
    identity: FileIdentity,
}

/// View of the follower handed to every callback.
///
/// The underlying reader may be repositioned freely; the loop picks up from wherever the handle points when the
/// callback returns.
pub struct FollowContext<'a> {
    path: &'a Path,
    file: &'a mut OpenFile,
    stop: &'a StopHandle,
}

impl FollowContext<'_> {
    pub fn path(&self) -> &Path {
        self.path
    }

    /// Identity of the currently open file, which may differ from what the path points to after rotation
    pub fn identity(&self) -> FileIdentity {
        self.file.identity
    }

    pub fn reader(&mut self) -> &mut BufReader<File> {
        &mut self.file.reader
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.file.reader.stream_position()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.reader.seek(pos)
    }

    /// Read one more line directly, bypassing `on_line`. Returns number of bytes read, 0 meaning no data available.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.file.reader.read_until(b'\n', buf)
    }

    pub fn request_stop(&mut self) {
        self.stop.stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Position of a `Follower` in its open/read/rotate lifecycle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FollowState {
    /// No handle open; next step opens the path
    Closed,
    /// Handle open, consuming lines as they appear
    OpenReading,
    /// Path was seen pointing to another file; next step reads what is left and closes
    Draining,
    /// Terminal
    Stopped,
}

/// Follows a single growing file, surviving rotations and (with a state file) restarts.
///
/// ## Usage
///
/// Construct with a path, `FollowOptions` and `Handlers`, then call `.run()`, which blocks until a callback or a
/// `StopHandle` requests stop. Construction is cheap and does not touch the followed file.
///
/// ```rust no_run
/// # use logfollow::{Follower, FollowOptions, Handlers, FollowError};
/// let handlers = Handlers::new().on_line(|ctx, line| {
///     if line.starts_with(b"FATAL") {
///         ctx.request_stop();
///     }
/// });
/// let options = FollowOptions::default().state_file("/var/lib/app/syslog.pos");
/// let mut follower = Follower::new("/var/log/syslog", options, handlers)?;
/// follower.run()?;
/// # Ok::<(), FollowError>(())
/// ```
///
/// ## Working principles
///
/// The follower polls: after reading everything currently available it fires `on_periodic`, then compares the
/// identity (device, inode) of whatever the path now points to with that of the open handle. On mismatch it waits one
/// more poll interval, reads any last lines still written into the old file, fires `on_close` and re-opens the path.
/// If the path is truncated in place the reader rewinds to the start.
///
/// With a state file, (device, inode, offset) is saved after every line. On startup a saved record is applied only if
/// it names the file that is actually opened; otherwise the follower starts as configured (beginning, or end with
/// `skip_to_end`).
///
/// ## Limitations
///
/// * If the filesystem hands the inode of a deleted log straight to its replacement, the rotation goes unnoticed.
/// * Truncation in place is only noticed while the file is shorter than the read position. A file truncated and
///   rewritten past the old offset within one poll interval is read on from the old offset.
/// * A line without terminator is held back for one poll interval in case the writer is mid-line. If it has not
///   grown by then (or the rotated file is being drained) it is delivered as-is, and whatever the writer appends
///   later arrives as a separate line. Stopping before that interval passes leaves the tail undelivered; the saved
///   position still points at its start.
pub struct Follower {
    path: PathBuf,
    options: FollowOptions,
    handlers: Handlers,
    store: Option<Box<dyn StateStore>>,
    current: Option<OpenFile>,
    state: FollowState,
    opened_once: bool,
    /// Start offset and length of an unterminated tail seen on the previous pass
    held_tail: Option<(u64, usize)>,
    stop: StopHandle,
}

impl Follower {
    /// Validate configuration and prepare a follower. No filesystem access happens until the first `step`.
    pub fn new(
        path: impl AsRef<Path>,
        options: FollowOptions,
        handlers: Handlers,
    ) -> Result<Self, FollowError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(FollowError::Config("path to follow is empty".to_string()));
        }
        if options.poll_interval.is_zero() {
            return Err(FollowError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        let store = options
            .state_file
            .as_ref()
            .map(|state_path| Box::new(FileStateStore::new(state_path)) as Box<dyn StateStore>);

        Ok(Self {
            path,
            options,
            handlers,
            store,
            current: None,
            state: FollowState::Closed,
            opened_once: false,
            held_tail: None,
            stop: StopHandle::default(),
        })
    }

    /// Replace the state store, e.g. with one backed by something other than a local file
    pub fn with_state_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Drive the loop until stop is requested. Returns on the first fatal error.
    pub fn run(&mut self) -> Result<(), FollowError> {
        while self.step()? != FollowState::Stopped {}
        Ok(())
    }

    /// Perform a single transition and return the resulting state.
    ///
    /// `OpenReading` steps end with a poll-interval sleep, other steps do not sleep unless waiting for a rotated path
    /// to reappear.
    pub fn step(&mut self) -> Result<FollowState, FollowError> {
        self.state = match self.state {
            FollowState::Closed => self.open()?,
            FollowState::OpenReading => self.poll()?,
            FollowState::Draining => self.drain()?,
            FollowState::Stopped => FollowState::Stopped,
        };
        Ok(self.state)
    }

    fn open(&mut self) -> Result<FollowState, FollowError> {
        let first_open = !self.opened_once;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if !first_open && e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.path.display(),
                    "waiting for rotated file to reappear"
                );
                if self.sleep() {
                    return Ok(FollowState::Stopped);
                }
                return Ok(FollowState::Closed);
            }
            Err(source) => {
                return Err(FollowError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let identity = FileIdentity::of_file(&file)?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let saved = match self.store.as_mut() {
            Some(store) if first_open => store.load(),
            _ => None,
        };
        match saved {
            Some(record) if record.identity() == identity && record.offset <= len => {
                tracing::debug!(
                    path = %self.path.display(),
                    offset = record.offset,
                    "resuming from saved position"
                );
                reader.seek(SeekFrom::Start(record.offset))?;
            }
            _ => {
                if let Some(record) = saved {
                    tracing::warn!(
                        path = %self.path.display(),
                        saved = %record,
                        "saved position does not apply to current file, ignoring"
                    );
                }
                if first_open && self.options.skip_to_end {
                    tracing::debug!(path = %self.path.display(), offset = len, "skipping to end");
                    reader.seek(SeekFrom::End(0))?;
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            dev = identity.dev,
            ino = identity.ino,
            "opened file"
        );
        self.opened_once = true;
        self.current = Some(OpenFile { reader, identity });

        self.notify(|h| h.on_open.as_mut());
        if self.stop.is_stopped() {
            return Ok(self.shutdown());
        }
        Ok(FollowState::OpenReading)
    }

    fn poll(&mut self) -> Result<FollowState, FollowError> {
        if self.read_available(false)? {
            return Ok(self.shutdown());
        }
        self.notify(|h| h.on_periodic.as_mut());
        if self.stop.is_stopped() {
            return Ok(self.shutdown());
        }

        let next = if self.rotated()? {
            tracing::info!(path = %self.path.display(), "rotation detected, draining on next pass");
            FollowState::Draining
        } else {
            FollowState::OpenReading
        };
        if self.sleep() {
            return Ok(self.shutdown());
        }
        Ok(next)
    }

    fn drain(&mut self) -> Result<FollowState, FollowError> {
        if self.read_available(true)? {
            return Ok(self.shutdown());
        }
        self.notify(|h| h.on_periodic.as_mut());
        if self.stop.is_stopped() {
            return Ok(self.shutdown());
        }

        self.close();
        if self.stop.is_stopped() {
            return Ok(FollowState::Stopped);
        }
        Ok(FollowState::Closed)
    }

    /// Feed currently available lines to `on_line`. Returns `true` if a callback asked to stop.
    fn read_available(&mut self, draining: bool) -> Result<bool, FollowError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(false);
        };
        let mut line = Vec::new();
        loop {
            line.clear();
            let size = current.reader.read_until(b'\n', &mut line)?;
            if size == 0 {
                return Ok(false);
            }
            if !draining && !line.ends_with(b"\n") {
                let start = current.reader.stream_position()? - size as u64;
                if self.held_tail != Some((start, size)) {
                    // writer may be mid-line, give it one more poll interval
                    self.held_tail = Some((start, size));
                    current.reader.seek(SeekFrom::Start(start))?;
                    return Ok(false);
                }
                tracing::debug!(
                    path = %self.path.display(),
                    offset = start,
                    "unterminated line did not grow, delivering it"
                );
            }
            self.held_tail = None;

            let mut ctx = FollowContext {
                path: &self.path,
                file: &mut *current,
                stop: &self.stop,
            };
            (self.handlers.on_line)(&mut ctx, &line);

            if let Some(store) = self.store.as_mut() {
                let offset = current.reader.stream_position()?;
                store
                    .save(PositionRecord::new(current.identity, offset))
                    .map_err(FollowError::Persistence)?;
            }
            if self.stop.is_stopped() {
                return Ok(true);
            }
        }
    }

    /// Whether the path now names a different file than the open one. Rewinds on truncation in place.
    fn rotated(&mut self) -> Result<bool, FollowError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(false);
        };
        let on_disk = match FileIdentity::of_path(&self.path) {
            Ok(identity) => identity,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(source) => {
                return Err(FollowError::Stat {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if on_disk != current.identity {
            return Ok(true);
        }

        let len = current.reader.get_ref().metadata()?.len();
        let position = current.reader.stream_position()?;
        if len < position {
            tracing::warn!(
                path = %self.path.display(),
                position,
                len,
                "file truncated, reading from start"
            );
            current.reader.seek(SeekFrom::Start(0))?;
        }
        Ok(false)
    }

    /// Wait one poll interval. Returns `true` if stop was requested meanwhile.
    fn sleep(&self) -> bool {
        std::thread::sleep(self.options.poll_interval);
        self.stop.is_stopped()
    }

    fn notify(&mut self, select: impl FnOnce(&mut Handlers) -> Option<&mut EventHandler>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if let Some(handler) = select(&mut self.handlers) {
            let mut ctx = FollowContext {
                path: &self.path,
                file: &mut *current,
                stop: &self.stop,
            };
            handler(&mut ctx);
        }
    }

    /// Fire `on_close` and drop the handle, if one is open
    fn close(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.notify(|h| h.on_close.as_mut());
        self.held_tail = None;
        if let Some(current) = self.current.take() {
            tracing::info!(
                path = %self.path.display(),
                dev = current.identity.dev,
                ino = current.identity.ino,
                "closed file"
            );
        }
    }

    fn shutdown(&mut self) -> FollowState {
        self.close();
        tracing::debug!(path = %self.path.display(), "follower stopped");
        FollowState::Stopped
    }
}

/// Fires `on_close` if a file is still open, so an embedder that drops the follower mid-run sees a balanced
/// open/close sequence.
impl Drop for Follower {
    fn drop(&mut self) {
        self.close();
    }
}
