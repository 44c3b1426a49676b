use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use console::{style, Term};
use eyre::{OptionExt, WrapErr};
use rpclient_core::{
    logging, masking::mask_token, Config, FinishItem, Issue, LogEntry, Session, Status,
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::*;

/// Build the CLI with clap's builder pattern
fn build_cli() -> ClapCommand {
    ClapCommand::new("rpclient")
        .about("rpclient talks to a ReportPortal style reporting service from the command line")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(Arg::new("log-level")
            .long("log-level")
            .help("Log level filter. Overrides \"log_level\" of rpclient.toml [env: RUST_LOG wins when set]")
            .global(true))
        .arg(Arg::new("color")
            .long("color")
            .help("Produce color output. Default is \"auto\"")
            .value_parser(["auto", "always", "never"])
            .global(true))
        .subcommand(
            ClapCommand::new("item")
                .about("Print the numeric id of the item with the given unique id")
                .arg(Arg::new("uuid")
                    .help("Unique id of the item")
                    .required(true))
        )
        .subcommand(
            ClapCommand::new("link-issue")
                .about("Link a bug tracker ticket to an item")
                .arg(Arg::new("item")
                    .long("item")
                    .help("Numeric id of the item")
                    .required(true)
                    .value_parser(value_parser!(i64)))
                .arg(Arg::new("ticket")
                    .long("ticket")
                    .help("Ticket id in the bug tracker, e.g. PRJ-123")
                    .required(true))
                .arg(Arg::new("url")
                    .long("url")
                    .help("Link to the ticket")
                    .required(true))
        )
        .subcommand(
            ClapCommand::new("log-batch")
                .about("Send a JSON array of log entries in one request")
                .arg(Arg::new("file")
                    .help("JSON file holding entries of the form {\"item_id\", \"time\", \"message\", \"level\"}")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)))
        )
        .subcommand(
            ClapCommand::new("finish-item")
                .about("Finish an item by id")
                .arg(Arg::new("id")
                    .help("Id of the item")
                    .required(true))
                .arg(Arg::new("status")
                    .long("status")
                    .help("Final status of the item")
                    .default_value("PASSED")
                    .value_parser(|s: &str| Status::from_str(s)))
                .arg(Arg::new("issue")
                    .long("issue")
                    .help("Issue type locator, e.g. PB001. Skipped items default to NOT_ISSUE")
                    .action(ArgAction::Set))
        )
        .subcommand(
            ClapCommand::new("config")
                .about("Print the effective configuration")
        )
}

/// rpclient CLI.
#[derive(Default)]
pub struct App {}

impl App {
    pub fn new() -> App {
        App {}
    }

    /// Parse command-line args and run the sub command.
    pub async fn run(self) -> eyre::Result<()> {
        let matches = build_cli().get_matches();
        let cfg = Config::load().wrap_err("failed to load rpclient configuration")?;

        let log_level = matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| cfg.log_level.clone());
        logging::init(&log_level);

        if let Some(color) = matches
            .get_one::<String>("color")
            .and_then(|s| Color::from_str(s).ok())
        {
            color.apply();
        }

        self.dispatch(cfg, &matches).await
    }

    async fn dispatch(self, cfg: Config, matches: &ArgMatches) -> eyre::Result<()> {
        let term = Term::stdout();

        match matches.subcommand() {
            Some(("item", item_matches)) => {
                let uuid = item_matches
                    .get_one::<String>("uuid")
                    .ok_or_eyre("uuid is required")?;
                let session = Session::new(cfg)?;
                let res = session.get_item_by_uuid(uuid).await?;
                term.write_line(&res.id.to_string())?;
                Ok(())
            }
            Some(("link-issue", link_matches)) => {
                let item = *link_matches
                    .get_one::<i64>("item")
                    .ok_or_eyre("item is required")?;
                let ticket = link_matches
                    .get_one::<String>("ticket")
                    .ok_or_eyre("ticket is required")?;
                let url = link_matches
                    .get_one::<String>("url")
                    .ok_or_eyre("url is required")?;
                let session = Session::new(cfg)?;
                let msg = session.link_issue(item, ticket, url).await?;
                term.write_line(&format!("{} {msg}", style("✓").green()))?;
                Ok(())
            }
            Some(("log-batch", batch_matches)) => {
                let path = batch_matches
                    .get_one::<PathBuf>("file")
                    .ok_or_eyre("file is required")?;
                let entries = read_entries(path)?;
                debug!("read {} log entries from {}", entries.len(), path.display());
                let session = Session::new(cfg)?;
                let res = session.log_batch(&entries).await?;
                term.write_line(&format!(
                    "{} sent {} log entries: {}",
                    style("✓").green(),
                    entries.len(),
                    res.id
                ))?;
                Ok(())
            }
            Some(("finish-item", finish_matches)) => {
                let id = finish_matches
                    .get_one::<String>("id")
                    .ok_or_eyre("id is required")?;
                let status = *finish_matches
                    .get_one::<Status>("status")
                    .ok_or_eyre("status is required")?;
                let mut finish = FinishItem::new(status);
                if let Some(issue) = finish_matches.get_one::<String>("issue") {
                    finish = finish.issue(Issue::new(issue));
                }
                let session = Session::new(cfg)?;
                let msg = session.finish_item_by_id(id, finish).await?;
                term.write_line(&format!("{} {msg}", style("✓").green()))?;
                Ok(())
            }
            Some(("config", _)) => {
                for line in render_config(&cfg) {
                    term.write_line(&line)?;
                }
                Ok(())
            }
            _ => unreachable!("Subcommand required is set to true"),
        }
    }
}

fn read_entries(path: &Path) -> eyre::Result<Vec<LogEntry>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("{} is not a list of log entries", path.display()))
}

/// Effective configuration as `key = value` lines, credentials masked.
fn render_config(cfg: &Config) -> Vec<String> {
    vec![
        format!("endpoint = {}", cfg.endpoint),
        format!("project = {}", cfg.project),
        format!("token = {}", mask_token(&cfg.token)),
        format!("bts_project = {}", cfg.bts_project),
        format!("bts_url = {}", cfg.bts_url),
        format!("api_path = {}", cfg.api_path),
        format!("user_agent = {}", cfg.user_agent),
        format!("timeout = {:?}", cfg.timeout),
        format!("log_level = {}", cfg.log_level),
        format!("dump_transport = {}", cfg.dump_transport),
        format!("retry.count = {}", cfg.retry.count),
        format!("retry.factor = {}", cfg.retry.factor),
        format!("retry.jitter = {}", cfg.retry.jitter),
        format!("retry.min_delay = {:?}", cfg.retry.min_delay),
        format!("retry.max_delay = {:?}", cfg.retry.max_delay),
    ]
}

#[derive(Debug, Clone, Default, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    fn apply(&self) {
        match self {
            Color::Always => {
                console::set_colors_enabled(true);
                console::set_colors_enabled_stderr(true);
            }
            Color::Never => {
                console::set_colors_enabled(false);
                console::set_colors_enabled_stderr(false);
            }
            Color::Auto => {}
        }
    }
}
