use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use logfollow::{FollowOptions, Follower, Handlers};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let app = Command::new(clap::crate_name!())
        .arg(
            Arg::new("FILE_PATH")
                .long("path")
                .short('p')
                .required(true)
                .help("path to file that is possibly rotated"),
        )
        .arg(
            Arg::new("STATE_FILE")
                .long("state-file")
                .short('s')
                .help("path to file used to remember read position across restarts"),
        )
        .arg(
            Arg::new("SKIP_TO_END")
                .long("skip-to-end")
                .action(ArgAction::SetTrue)
                .help("ignore content already present when starting without saved position"),
        )
        .arg(
            Arg::new("POLL_MS")
                .long("poll-ms")
                .value_parser(clap::value_parser!(u64))
                .default_value("1000")
                .help("milliseconds to wait between checks for new lines"),
        )
        .arg(
            Arg::new("MAX_LINES")
                .long("max-lines")
                .short('n')
                .value_parser(clap::value_parser!(u64))
                .help("stop after printing this many lines"),
        );

    let args = app.get_matches();

    let mut options = FollowOptions::default()
        .skip_to_end(args.get_flag("SKIP_TO_END"))
        .poll_interval(Duration::from_millis(*args.get_one::<u64>("POLL_MS").unwrap()));
    if let Some(state_file) = args.get_one::<String>("STATE_FILE") {
        options = options.state_file(state_file);
    }

    let max_lines = args.get_one::<u64>("MAX_LINES").copied();
    let mut printed = 0;
    let handlers = Handlers::new()
        .on_line(move |ctx, line| {
            print!("{}", String::from_utf8_lossy(line));
            printed += 1;
            if max_lines.is_some_and(|max| printed >= max) {
                ctx.request_stop();
            }
        })
        .on_open(|ctx| eprintln!("following {} ({:?})", ctx.path().display(), ctx.identity()))
        .on_close(|ctx| eprintln!("done with {:?}", ctx.identity()));

    let path = args.get_one::<String>("FILE_PATH").unwrap();
    let mut follower = Follower::new(path, options, handlers)?;
    follower.run()?;

    Ok(())
}
