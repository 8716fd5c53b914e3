use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("vectorify")
        .about("Vectorify API client with shared rate limiting")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("query")
                .about("Run a semantic query")
                .arg(Arg::new("text").required(true).help("Query text"))
                .arg(
                    Arg::new("collection")
                        .long("collection")
                        .action(ArgAction::Append)
                        .help("Restrict to a collection slug (repeatable)"),
                )
                .arg(
                    Arg::new("tenant")
                        .long("tenant")
                        .value_parser(clap::value_parser!(i64))
                        .help("Tenant id"),
                ),
        )
        .subcommand(
            Command::new("upsert")
                .about("Upsert items from a JSON file")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .help("Path to an upsert payload (collection + items)"),
                ),
        )
        .subcommand(Command::new("list").about("List upserts"))
        .subcommand(
            Command::new("fetch")
                .about("Fetch a single upsert")
                .arg(Arg::new("id").required(true)),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Respect explicit level, else default to info, allow env override via RUST_LOG
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.init();
}
