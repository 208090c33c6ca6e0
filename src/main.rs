use clap::Parser;
use keysafe::cli::commands::{add, completions, list, pending, remove, show, sync, update};
use keysafe::cli::{output, Cli, Commands, Context};
use keysafe::errors::{KeysafeError, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Completions need neither config nor a runtime.
    if let Commands::Completions { shell } = cli.command {
        return completions::execute(shell);
    }

    let ctx = Context::load(&cli)?;

    #[cfg(feature = "audit-log")]
    if let Commands::Audit {
        last,
        ref since,
        ref item,
    } = cli.command
    {
        return keysafe::cli::commands::audit_cmd::execute(
            &ctx,
            last,
            since.as_deref(),
            item.as_deref(),
        );
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| KeysafeError::CommandFailed(format!("failed to start runtime: {e}")))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Add {
                ref label,
                ref username,
                ref value,
                ref strength,
            } => {
                add::execute(
                    &ctx,
                    label,
                    username.as_deref(),
                    value.as_deref(),
                    strength.as_deref(),
                )
                .await
            }
            Commands::Update {
                ref id,
                ref label,
                ref username,
                clear_username,
                ref value,
                ref strength,
            } => {
                let args = update::UpdateArgs {
                    label: label.as_deref(),
                    username: username.as_deref(),
                    clear_username,
                    value: value.as_deref(),
                    strength: strength.as_deref(),
                };
                update::execute(&ctx, id, args).await
            }
            Commands::Remove { ref id, force } => remove::execute(&ctx, id, force).await,
            Commands::List => list::execute(&ctx).await,
            Commands::Show { ref id } => show::execute(&ctx, id).await,
            Commands::Sync => sync::execute(&ctx).await,
            Commands::Pending => pending::execute(&ctx).await,
            #[cfg(feature = "audit-log")]
            Commands::Audit { .. } => Ok(()),
            Commands::Completions { .. } => Ok(()),
        }
    })
}
