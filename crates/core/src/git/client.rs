//! [`WorkingCopy`] implementation that shells out to the `git` binary.
//!
//! A client may carry a deadline. Commands started after it has passed fail
//! immediately, and a command still running when it passes is killed. Either
//! way the caller sees [`GitError::TimedOut`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::working_copy::{FetchTarget, MergeOutcome, Side, WorkingCopy};
use crate::errors::GitError;

/// Synchronous `git` CLI client bound to one working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    deadline: Option<Instant>,
}

/// How often a running command is checked against the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl GitCli {
    /// Bind to an existing working copy.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        if !path.join(".git").exists() {
            return Err(GitError::RepositoryNotFound(path.display().to_string()));
        }
        debug!(path = %path.display(), "bound git working copy");
        Ok(Self {
            repo_path: path.to_path_buf(),
            deadline: None,
        })
    }

    /// Bound every subsequent command by `deadline` (`None` lifts the bound).
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Push `refspec` to `remote`.
    #[instrument(skip(self))]
    pub fn push(&self, remote: &str, refspec: &str, force: bool) -> Result<(), GitError> {
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([remote, refspec]);
        self.run_git(&args)?;
        info!(remote, refspec, "push completed");
        Ok(())
    }

    /// Whether `remote` advertises `refs/heads/<branch>`.
    #[instrument(skip(self))]
    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool, GitError> {
        let out = self.run_git(&["ls-remote", "--heads", remote, branch])?;
        Ok(!out.trim().is_empty())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn output(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        let Some(deadline) = self.deadline else {
            return self.command(args).output().map_err(spawn_error);
        };
        if Instant::now() >= deadline {
            return Err(timed_out(args));
        }

        let mut child = self.command(args).spawn().map_err(spawn_error)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Output {
                    status,
                    stdout: stdout.join().unwrap_or_default(),
                    stderr: stderr.join().unwrap_or_default(),
                });
            }
            if Instant::now() >= deadline {
                warn!(cmd = ?format!("git {}", args.join(" ")), "deadline passed, killing git");
                // Readers are left detached: a grandchild may still hold the pipes.
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out(args));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn spawn_error(e: std::io::Error) -> GitError {
    if e.kind() == std::io::ErrorKind::NotFound {
        GitError::BinaryNotFound("git".into())
    } else {
        GitError::IoError(e)
    }
}

fn timed_out(args: &[&str]) -> GitError {
    GitError::TimedOut {
        command: format!("git {}", args.join(" ")),
    }
}

/// Read a child pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn command_failed(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let exit_code = output.status.code().unwrap_or(-1);
    warn!(exit_code, %stderr, "git command failed");
    GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        exit_code,
        stderr,
    }
}

impl WorkingCopy for GitCli {
    #[instrument(skip(self))]
    fn fetch(&self, remote: &str, target: FetchTarget<'_>) -> Result<(), GitError> {
        match target {
            FetchTarget::Ref(reference) => self.run_git(&["fetch", remote, reference])?,
            FetchTarget::AllTags => self.run_git(&["fetch", "--tags", remote])?,
        };
        debug!("fetch completed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError> {
        let args = ["merge", "--no-edit", reference];
        let output = self.output(&args)?;
        if output.status.success() {
            info!(reference, "merge completed");
            return Ok(MergeOutcome::Merged);
        }
        // Exit 1 with MERGE_HEAD left behind is git's conflict signal.
        if output.status.code() == Some(1) && self.merge_in_progress()? {
            info!(reference, "merge stopped with conflicts");
            return Ok(MergeOutcome::Conflicted);
        }
        Err(command_failed(&args, &output))
    }

    fn checkout_side(&self, path: &str, side: Side) -> Result<(), GitError> {
        self.run_git(&["checkout", side.as_flag(), "--", path])?;
        debug!(path, %side, "checked out side");
        Ok(())
    }

    fn stage(&self, path: &str) -> Result<(), GitError> {
        self.run_git(&["add", "--", path])?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), GitError> {
        self.run_git(&["rm", "--quiet", "--", path])?;
        debug!(path, "removed path");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn commit(&self, message: Option<&str>, allow_empty: bool) -> Result<(), GitError> {
        let mut args = vec!["commit"];
        match message {
            Some(msg) => args.extend(["-m", msg]),
            None => args.push("--no-edit"),
        }
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run_git(&args)?;
        info!("commit created");
        Ok(())
    }

    #[instrument(skip(self))]
    fn abort_merge(&self) -> Result<(), GitError> {
        self.run_git(&["merge", "--abort"])?;
        info!("merge aborted");
        Ok(())
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        let output = self.output(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])?;
        Ok(output.status.success())
    }

    fn status_porcelain(&self) -> Result<String, GitError> {
        self.run_git(&["status", "--porcelain"])
    }

    fn resolve_ref(&self, candidate: &str) -> Result<bool, GitError> {
        let spec = format!("{candidate}^{{commit}}");
        let output = self.output(&["rev-parse", "-q", "--verify", &spec])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_failed(&["rev-parse", "-q", "--verify", &spec], &output)),
        }
    }

    fn head(&self) -> Result<String, GitError> {
        Ok(self.run_git(&["rev-parse", "HEAD"])?.trim().to_string())
    }
}
