use clap::{Parser as ClapParser, Subcommand};
use jx::cli::{self, CliError, CommandOptions};
use jx::{Value, to_json, to_json_pretty};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "jx")]
#[command(about = "jx - query, aggregate and window JSON rows in memory")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `debug` or `jx=trace`
    #[arg(long, global = true, env = "JX_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON query over an array of rows
    Query {
        /// The query, e.g. '{"select": "id", "where": {"eq": {"status": "open"}}}'
        query: String,

        #[command(flatten)]
        io: IoArgs,
    },

    /// Print the schema inferred from the rows
    Schema {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Apply an update command and print the resulting rows
    Update {
        /// The command, e.g. '{"set": {"status": "closed"}, "where": {"eq": {"id": 3}}}'
        command: String,

        #[command(flatten)]
        io: IoArgs,
    },
}

#[derive(clap::Args)]
struct IoArgs {
    /// JSON input (reads from stdin if not provided)
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output
    #[arg(short, long, env = "JX_PRETTY")]
    pretty: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Query { query, io: args } => {
            options(args).and_then(|opts| print(cli::execute_query(&query, &opts)?, opts.pretty))
        }
        Commands::Schema { io: args } => options(args).and_then(|opts| print(cli::execute_schema(&opts)?, opts.pretty)),
        Commands::Update { command, io: args } => {
            options(args).and_then(|opts| print(cli::execute_update(&command, &opts)?, opts.pretty))
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn options(args: IoArgs) -> Result<CommandOptions, CliError> {
    let input = match args.input {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(CliError::Io)?;
            Some(buffer)
        }
        None => None,
    };

    Ok(CommandOptions {
        input,
        pretty: args.pretty,
    })
}

fn print(output: Value, pretty: bool) -> Result<(), CliError> {
    let json = if pretty { to_json_pretty(&output) } else { to_json(&output) };
    println!("{}", json);
    Ok(())
}
