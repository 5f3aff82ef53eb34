//! # Logfollow
//!
//! Logfollow continuously reads lines appended to a log file, notices when the file gets rotated away (replaced,
//! recreated or truncated) and carries on with the new one. Optionally it persists its read position so that a
//! restarted process continues exactly where the previous one stopped. Its main intention is to be the reading core of
//! custom log shippers and processors: everything that happens to a line is up to the callbacks you provide.
//!
//! * `Follower` owns the followed file and runs the poll loop, invoking `Handlers` for every line, after every open,
//! before every close and after every pass over currently available data.
//!
//! ```rust no_run
//! # use logfollow::{Follower, FollowOptions, Handlers, FollowError};
//! // prints every new line of syslog, remembering position across restarts
//! let handlers = Handlers::new()
//!     .on_line(|_, line| print!("{}", String::from_utf8_lossy(line)))
//!     .on_open(|ctx| eprintln!("now reading {:?}", ctx.identity()));
//! let options = FollowOptions::default()
//!     .skip_to_end(true)
//!     .state_file("/var/lib/myapp/syslog.pos");
//! let mut follower = Follower::new("/var/log/syslog", options, handlers)?;
//! follower.run()?;
//! # Ok::<(), FollowError>(())
//! ```
//!
//! * `StateStore` abstracts where the position (`PositionRecord`) lives. `FileStateStore` keeps it as one line of text
//! `<dev> <inode> <offset>` and is used automatically when `FollowOptions::state_file` is set.
//!
//! ```rust
//! # use logfollow::{FileStateStore, PositionRecord, StateStore};
//! # let dir = tempfile::tempdir()?;
//! let mut store = FileStateStore::new(dir.path().join("app.pos"));
//! assert_eq!(store.load(), None);
//! store.save(PositionRecord { dev: 2049, inode: 1312, offset: 80 })?;
//! assert_eq!(std::fs::read_to_string(store.path())?, "2049 1312 80\n");
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! * `StopHandle` lets another thread end a running follower.
//!
//! ```rust no_run
//! # use logfollow::{Follower, FollowOptions, Handlers};
//! # use std::time::Duration;
//! let mut follower = Follower::new("/var/log/syslog", FollowOptions::default(), Handlers::new())?;
//! let stop = follower.stop_handle();
//! let worker = std::thread::spawn(move || follower.run());
//! std::thread::sleep(Duration::from_secs(10));
//! stop.stop();
//! worker.join().unwrap()?;
//! # Ok::<(), logfollow::FollowError>(())
//! ```
//!

mod error;
mod follower;
mod identity;
mod state;

pub use error::{FollowError, StateParseError};
pub use follower::{FollowContext, FollowOptions, FollowState, Follower, Handlers, StopHandle};
pub use identity::FileIdentity;
pub use state::{FileStateStore, PositionRecord, StateStore};
