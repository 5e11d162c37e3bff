use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use buildmaster_db_snapshot::{Candidates, Encoding, Snapshot};
use buildmaster_db_store::{schema::Manager, Connector, DbSpec, Error};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(about = "Creates, upgrades and inspects the build master database.")]
struct Opt {
    #[structopt(
        short,
        long,
        default_value = ".",
        parse(from_os_str),
        help = "build master base directory; relative database paths and legacy files are resolved against it"
    )]
    basedir: PathBuf,

    #[structopt(
        long,
        default_value = "sqlite:///state.sqlite",
        help = "database URL"
    )]
    db_url: String,

    #[structopt(
        long,
        default_value = "5s",
        parse(try_from_str = parse_duration::parse::parse),
        help = "how long to wait for a locked database before giving up"
    )]
    busy_timeout: Duration,

    #[structopt(long, default_value = "4", help = "maximum number of pooled connections")]
    pool_size: u32,

    #[structopt(short, long, parse(from_occurrences), help = "log more; may be repeated")]
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(about = "upgrade the database schema to the newest version")]
    Upgrade {
        #[structopt(
            long,
            help = "encoding to try for legacy text that isn't valid UTF-8, such as utf-16 or latin-1"
        )]
        encoding: Option<Encoding>,
    },

    #[structopt(about = "show the current and newest schema versions")]
    Status,

    #[structopt(about = "rewrite a legacy snapshot so all of its text is UTF-8")]
    FixSnapshotEncoding {
        #[structopt(parse(from_os_str), help = "legacy snapshot file")]
        path: PathBuf,

        #[structopt(long, help = "encoding to try for text that isn't valid UTF-8")]
        encoding: Encoding,
    },
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _logger = flexi_logger::Logger::try_with_env_or_str(level)?
        .format(flexi_logger::colored_default_format)
        .start()?;

    match opt.cmd {
        Command::Upgrade { encoding } => {
            let connector = connect(&opt.basedir, &opt.db_url, opt.busy_timeout, opt.pool_size)?;

            let mut manager = Manager::new(&connector, &opt.basedir);
            if let Some(encoding) = encoding {
                manager = manager.with_encoding_hint(encoding);
            }

            if let Err(e) = manager.upgrade() {
                if e.is_decode() {
                    log::error!(
                        "the legacy snapshot contains text that isn't valid UTF-8; \
                         retry with --encoding, or rewrite it with fix-snapshot-encoding"
                    );
                }
                return Err(e.into());
            }
        }
        Command::Status => {
            let connector = connect(&opt.basedir, &opt.db_url, opt.busy_timeout, opt.pool_size)?;
            let manager = Manager::new(&connector, &opt.basedir);

            let current = manager.current_version()?;
            let target = manager.target_version();
            println!("current schema version: {}", current);
            println!("newest schema version: {}", target);
            if current < target {
                println!("an upgrade is required");
            }
        }
        Command::FixSnapshotEncoding { path, encoding } => {
            let mut snapshot = match Snapshot::load(&path)? {
                Some(snapshot) => snapshot,
                None => anyhow::bail!("no snapshot at {}", path.display()),
            };

            let recoded = snapshot.recode(&Candidates::default().with_hint(encoding))?;
            snapshot.save(&path)?;
            log::info!(
                "rewrote {} fields across {} changes in {} as UTF-8",
                recoded,
                snapshot.changes.len(),
                path.display()
            );
        }
    }

    Ok(())
}

fn connect(
    basedir: &Path,
    url: &str,
    busy_timeout: Duration,
    pool_size: u32,
) -> Result<Connector, Error> {
    let spec = DbSpec::from_url(url, basedir)?
        .with_busy_timeout(busy_timeout)
        .with_max_connections(pool_size);

    let connector = Connector::new(spec);
    connector.start()?;

    Ok(connector)
}
