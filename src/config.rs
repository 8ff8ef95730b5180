use crate::focus::Designator;
use crate::render::OutputFormat;
use clap::Parser;
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = "\
Filters (-f) narrow the graph to interesting locks:
  deadlock   processes waiting for a lock and the relations they wait on
  conflicts  contended relations and every process holding or awaiting them

Designators for --include and --exclude:
  pid:<pid>         the process with PID <pid>
  pid:/<regexp>/    processes running a query matching <regexp>
  rel:<oid>         the relation with OID <oid>
  rel:<name>        the relation with name <name>

--include keeps everything connected to a designated process or relation.
--exclude removes the designated processes and relations.";

/// Get lock graph from PostgreSQL instance
#[derive(Parser, Debug, Clone)]
#[command(name = "pg-lock-graph", version, disable_help_flag = true, after_help = AFTER_HELP)]
pub struct Cli {
    /// User name to connect as
    #[arg(short = 'U', long = "username", env = "PGUSER")]
    pub user: Option<String>,

    /// Password of the user to connect as
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Name of the database to read locking information from
    #[arg(short = 'd', long, env = "PGDATABASE")]
    pub dbname: Option<String>,

    /// Database server host or socket directory
    #[arg(short = 'h', long, env = "PGHOST")]
    pub host: Option<String>,

    /// Database server port number
    #[arg(short = 'p', long, env = "PGPORT")]
    pub port: Option<u16>,

    /// Apply filter to graph, in the order given
    #[arg(short = 'f', long = "filter", value_name = "FILTER", num_args = 1..)]
    pub filters: Vec<String>,

    /// Include processes or relations connected to this designator (repeatable)
    #[arg(short = 'i', long, value_name = "INCLUSION")]
    pub include: Vec<Designator>,

    /// Exclude this process or relation from the graph (repeatable)
    #[arg(short = 'x', long, value_name = "EXCLUSION")]
    pub exclude: Vec<Designator>,

    /// Format for emitted graph
    #[arg(long, value_name = "FORMAT", default_value = "png")]
    pub format: OutputFormat,

    /// Output file, `-` for stdout [default: <DBNAME>_lock_graph.gv.<FORMAT>]
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Emit an empty graph instead of failing when there are no locks
    #[arg(long)]
    pub allow_empty: bool,

    /// Log debug output to stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Show this help message and exit
    #[arg(long, action = clap::ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    /// Connection options. Anything not given falls back to the libpq
    /// environment and defaults.
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new().application_name("pg-lock-graph");
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(dbname) = &self.dbname {
            options = options.database(dbname);
        }
        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        options
    }
}

/// Log filter from `RUST_LOG` when set, else `warn` (`debug` when verbose).
pub fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(rust_log.unwrap_or_default())
}
