use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use trello2cards::trello::DEFAULT_API_URL;
use trello2cards::{convert_board, ConvertError, Options, TrelloClient};

#[derive(Parser)]
#[command(
    name = "trello2cards",
    about = "Convert a Trello board into JSON card records"
)]
struct Cli {
    /// Board id, as in https://trello.com/b/<BOARD_ID>
    board_id: String,

    /// Trello application key
    #[arg(long, env = "TRELLO_APP_KEY", hide_env_values = true)]
    key: String,

    /// Trello authorization token
    #[arg(long, env = "TRELLO_AUTH_TOKEN", hide_env_values = true)]
    token: String,

    /// Include archived lists and cards
    #[arg(long)]
    archived: bool,

    /// Skip fetching cover attachment URLs
    #[arg(long)]
    no_covers: bool,

    /// Report warnings on stderr instead of failing
    #[arg(long)]
    permissive: bool,

    /// Trello API base URL
    #[arg(long, env = "TRELLO_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Write the records to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// One-line JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let options = Options {
        get_archived: cli.archived,
        get_covers: !cli.no_covers,
        ..Options::default()
    }
    .strict(!cli.permissive);

    let client = TrelloClient::with_base_url(&cli.api_url, &cli.key, &cli.token);
    let conversion = match convert_board(&client, &cli.board_id, &options).await {
        Ok(conversion) => conversion,
        Err(ConvertError::Warnings(warnings)) => {
            for warning in &warnings {
                eprintln!("warning: {}", warning);
            }
            anyhow::bail!(
                "{} warning(s) generated during conversion of board {} (use --permissive to ignore)",
                warnings.len(),
                cli.board_id
            );
        }
        Err(e) => return Err(e.into()),
    };

    let json = if cli.compact {
        serde_json::to_string(&conversion.cards)?
    } else {
        serde_json::to_string_pretty(&conversion.cards)?
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {} cards to {}", conversion.cards.len(), path.display());
        }
        None => println!("{}", json),
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_elapsed(elapsed));
    }

    Ok(())
}

/// `4.2s`, `3m07s`, `1h02m07s`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, mins, secs) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (hours, mins) {
        (0, 0) => format!("{:.1}s", elapsed.as_secs_f64()),
        (0, _) => format!("{}m{:02}s", mins, secs),
        _ => format!("{}h{:02}m{:02}s", hours, mins, secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_elapsed(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m07s");
        assert_eq!(format_elapsed(Duration::from_secs(3727)), "1h02m07s");
    }

    #[test]
    fn cli_reads_flags() {
        let cli = Cli::try_parse_from([
            "trello2cards",
            "dMFueFPQ",
            "--key",
            "k",
            "--token",
            "t",
            "--permissive",
            "--no-covers",
        ])
        .unwrap();
        assert_eq!(cli.board_id, "dMFueFPQ");
        assert!(cli.permissive);
        assert!(cli.no_covers);
        assert!(!cli.archived);
    }
}
