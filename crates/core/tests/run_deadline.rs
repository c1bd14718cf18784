//! The run timeout must bound the git work itself, not only the wait for it.
//!
//! A stub `git` that hangs is put first on `PATH`. This binary holds a single
//! test so the `PATH` change cannot leak into others.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

use rebasebot_core::bot;
use rebasebot_core::config::AppConfig;
use rebasebot_core::errors::{BotError, EscalationKind};

#[test]
fn test_hung_git_is_killed_at_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let bin = tmp.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    let stub = bin.join("git");
    std::fs::write(&stub, "#!/bin/sh\nexec sleep 6\n").unwrap();
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{path}", bin.display()));

    let mut config = AppConfig::default();
    config.source.reference = Some("https://github.com/upstream/project:main".parse().unwrap());
    config.dest.branch = Some("fork/project:main".parse().unwrap());
    config.rebase.branch = Some("bot/project:rebase-bot-main".parse().unwrap());
    config.git.working_dir = tmp.path().join("work");
    config.run.dry_run = true;
    config.run.timeout_secs = 1;

    let started = Instant::now();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let result = runtime.block_on(bot::run(&config));
    // Dropping the runtime waits for the blocking worker.
    drop(runtime);
    let elapsed = started.elapsed();

    let err = result.unwrap_err();
    let BotError::Escalation(escalation) = &err else {
        panic!("expected escalation, got {err:?}");
    };
    assert_eq!(escalation.kind, EscalationKind::Timeout);
    assert!(err.to_string().starts_with("I got an error trying to merge"));
    assert!(
        elapsed < Duration::from_secs(4),
        "worker outlived the timeout: {elapsed:?}"
    );
}
