//! Periodic reloading of the rate limit rules file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ratelimit::{RateLimitOptions, RateLimiter};

/// Spawn a task that re-reads `path` every `interval` and applies it to `limiter`.
///
/// A file that fails to load is logged and skipped, leaving the previous
/// rules in place. The task exits when `cancel` fires.
pub fn spawn_reloader(
    limiter: Arc<RateLimiter>,
    path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(path = %path.display(), interval_secs = interval.as_secs(), "Starting rules reloader");

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the rules were loaded at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match RateLimitOptions::from_file(&path) {
                Ok(options) => {
                    debug!(path = %path.display(), "Reloaded rate limit rules");
                    limiter.config_change(&options);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to reload rate limit rules, keeping previous rules");
                }
            }
        }

        info!("Rules reloader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ONE_RULE: &str = r#"
rules:
  - description: example
    match_string: example.com
    requests_per_second: 2
"#;

    const TWO_RULES: &str = r#"
rules:
  - description: example
    match_string: example.com
    requests_per_second: 2
  - description: other
    match_string: example.org
    requests_per_second: 1
"#;

    fn write_rules(file: &mut NamedTempFile, contents: &str) {
        let f = file.as_file_mut();
        f.set_len(0).unwrap();
        std::io::Seek::rewind(f).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.sync_all().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloader_applies_changes() {
        let mut file = NamedTempFile::new().unwrap();
        write_rules(&mut file, ONE_RULE);

        let limiter = Arc::new(RateLimiter::with_options(
            &RateLimitOptions::from_file(file.path()).unwrap(),
        ));
        let cancel = CancellationToken::new();
        let handle = spawn_reloader(
            Arc::clone(&limiter),
            file.path().to_path_buf(),
            Duration::from_secs(10),
            cancel.clone(),
        );
        assert_eq!(limiter.rules().len(), 1);

        write_rules(&mut file, TWO_RULES);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(limiter.rules().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloader_keeps_rules_on_bad_file() {
        let mut file = NamedTempFile::new().unwrap();
        write_rules(&mut file, TWO_RULES);

        let limiter = Arc::new(RateLimiter::with_options(
            &RateLimitOptions::from_file(file.path()).unwrap(),
        ));
        let cancel = CancellationToken::new();
        let handle = spawn_reloader(
            Arc::clone(&limiter),
            file.path().to_path_buf(),
            Duration::from_secs(10),
            cancel.clone(),
        );

        write_rules(&mut file, "rules: [ {");
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(limiter.rules().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
