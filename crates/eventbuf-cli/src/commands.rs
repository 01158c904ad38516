//! Subcommand execution against an opened store.

use std::io::Write;
use std::time::Duration;

use eventbuf_store::{EventStore, StoreError};
use serde_json::json;
use thiserror::Error;

use crate::args::Command;
use crate::config::Config;

/// Errors reported by the `eventbuf` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Opens the configured store and runs `command`, writing results to `out`.
///
/// # Errors
///
/// Returns `CliError` if the store cannot be opened, the operation fails,
/// or output cannot be written.
pub fn run(command: &Command, config: &Config, out: &mut impl Write) -> Result<(), CliError> {
    let store = EventStore::open(&config.database.path, config.store_options())?;

    match command {
        Command::Add { payload } => {
            let id = store.add(payload)?;
            writeln!(out, "{id}")?;
        }
        Command::Take { max } => {
            let max = max.unwrap_or(config.upload.batch_size);
            let batch = store.take_ready_batch(max)?;
            for event in &batch {
                let line = json!({
                    "id": event.id,
                    "attempts": event.attempts,
                    "created_at": event.created_at,
                    "payload": String::from_utf8_lossy(&event.payload),
                });
                writeln!(out, "{}", serde_json::to_string(&line)?)?;
            }
            tracing::info!(taken = batch.len(), "took batch");
        }
        Command::Purge { ids } => {
            let purged = store.purge_taken_batch(ids)?;
            writeln!(out, "{purged}")?;
        }
        Command::Abandon { ids } => {
            let reset = store.abandon(ids)?;
            writeln!(out, "{reset}")?;
        }
        Command::Recover { stale_secs } => {
            let reset = match stale_secs {
                Some(secs) => store.reset_stale(Duration::from_secs(*secs))?,
                None => store.reset_pending()?,
            };
            writeln!(out, "{reset}")?;
        }
        Command::Stats => {
            let stats = store.stats()?;
            writeln!(out, "{}", serde_json::to_string(&stats)?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventbuf_store::{EventId, StoreStats};

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir
            .path()
            .join("events.db")
            .to_str()
            .expect("utf-8 path")
            .to_string();
        config
    }

    fn run_to_string(command: Command, config: &Config) -> String {
        let mut out = Vec::new();
        run(&command, config, &mut out).expect("command should succeed");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn add_take_purge_cycle() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = test_config(&dir);

        let id = run_to_string(
            Command::Add {
                payload: "e1".to_string(),
            },
            &config,
        );
        assert_eq!(id.trim(), "1");

        let taken = run_to_string(Command::Take { max: None }, &config);
        let line: serde_json::Value =
            serde_json::from_str(taken.trim()).expect("take output should be json");
        assert_eq!(line["id"], 1);
        assert_eq!(line["payload"], "e1");
        assert_eq!(line["attempts"], 1);

        let purged = run_to_string(
            Command::Purge {
                ids: vec![EventId::new(1)],
            },
            &config,
        );
        assert_eq!(purged.trim(), "1");

        let stats: StoreStats =
            serde_json::from_str(run_to_string(Command::Stats, &config).trim())
                .expect("stats output should be json");
        assert_eq!(stats, StoreStats::default());
    }

    #[test]
    fn batch_taken_by_one_invocation_stays_pending_for_the_next() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = test_config(&dir);

        run_to_string(
            Command::Add {
                payload: "e1".to_string(),
            },
            &config,
        );
        let first = run_to_string(Command::Take { max: None }, &config);
        assert_eq!(first.lines().count(), 1);

        let second = run_to_string(Command::Take { max: None }, &config);
        assert!(second.is_empty(), "event handed out twice: {second}");

        let stats: StoreStats =
            serde_json::from_str(run_to_string(Command::Stats, &config).trim())
                .expect("stats output should be json");
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn recover_resets_pending_events() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = test_config(&dir);

        for payload in ["a", "b"] {
            run_to_string(
                Command::Add {
                    payload: payload.to_string(),
                },
                &config,
            );
        }
        run_to_string(Command::Take { max: Some(2) }, &config);

        let stale = run_to_string(
            Command::Recover {
                stale_secs: Some(3_600),
            },
            &config,
        );
        assert_eq!(stale.trim(), "0", "fresh batch is not stale");

        let reset = run_to_string(Command::Recover { stale_secs: None }, &config);
        assert_eq!(reset.trim(), "2");
    }

    #[test]
    fn take_with_zero_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = test_config(&dir);

        let mut out = Vec::new();
        let err = run(&Command::Take { max: Some(0) }, &config, &mut out)
            .expect_err("zero batch should fail");
        assert!(matches!(
            err,
            CliError::Store(StoreError::InvalidArgument(_))
        ));
    }
}
