use clap::Parser;
use credvault::cli::{commands, output, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout stays clean for `get` and
    // `hash-password`.
    let filter =
        EnvFilter::try_from_env("CREDVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli),
        Commands::Status => commands::status::execute(&cli),
        Commands::Set {
            ref name,
            ref value,
            kind,
        } => commands::set::execute(&cli, name, value.as_deref(), kind),
        Commands::Get { ref name } => commands::get::execute(&cli, name),
        Commands::List => commands::list::execute(&cli),
        Commands::Delete { ref name, force } => commands::delete::execute(&cli, name, force),
        Commands::ChangePassword => commands::change_password::execute(&cli),
        Commands::Rekey => commands::rekey::execute(&cli),
        Commands::Reset { force } => commands::reset::execute(&cli, force),
        Commands::Encrypt {
            ref alias,
            algorithm,
            ref input,
            ref output,
        } => commands::encrypt::execute(&cli, alias, algorithm, input, output),
        Commands::Decrypt {
            ref alias,
            ref input,
            ref output,
        } => commands::decrypt::execute(&cli, alias, input, output),
        Commands::HashPassword { ref verify } => {
            commands::hash_password::execute(&cli, verify.as_deref())
        }
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
