//! Low-level engine process: spawn, line I/O, the `uci`/`uciok` and
//! `isready`/`readyok` handshakes. Process plumbing only; the
//! higher-level state machine lives separately in `driver.rs`.

use std::path::Path;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::uci::types::{UciEngineOption, ENGINE_INIT_TIMEOUT};

/// A spawned engine subprocess with its stdin writer and a line reader
/// over stdout. `id`/`author` and the advertised options are captured
/// during the handshake.
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    pub id_name: Option<String>,
    pub id_author: Option<String>,
    pub options: Vec<UciEngineOption>,
}

impl EngineProcess {
    /// Spawns `path`, performs the `uci`/`uciok` handshake, and
    /// returns the process plus a line reader over its stdout.
    pub async fn spawn(path: &Path) -> Result<(EngineProcess, Lines<BufReader<ChildStdout>>)> {
        info!("spawning engine process: {path:?}");
        let mut command = Command::new(path);
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env("TERM", "dumb");

        let mut child = command.spawn().map_err(|e| {
            error!("failed to spawn engine process {path:?}: {e}");
            Error::EngineNotFound(path.display().to_string())
        })?;

        let stdin = child.stdin.take().ok_or(Error::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(Error::ProcessExited)?;
        let mut lines = BufReader::new(stdout).lines();

        let mut process = EngineProcess {
            child,
            stdin,
            id_name: None,
            id_author: None,
            options: Vec::new(),
        };

        timeout(ENGINE_INIT_TIMEOUT, process.handshake(&mut lines))
            .await
            .map_err(|_| Error::Timeout)??;

        info!("engine initialized: {:?}", process.id_name);
        Ok((process, lines))
    }

    async fn handshake(&mut self, lines: &mut Lines<BufReader<ChildStdout>>) -> Result<()> {
        self.send_line("uci").await?;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(Error::Io)?
                .ok_or(Error::ProcessExited)?;
            debug!("< {line}");
            if let Some(rest) = line.strip_prefix("id name ") {
                self.id_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("id author ") {
                self.id_author = Some(rest.trim().to_string());
            } else if line.starts_with("option name ") {
                if let Some(opt) = UciEngineOption::parse(&line) {
                    self.options.push(opt);
                }
            } else if line.trim() == "uciok" {
                return Ok(());
            }
        }
    }

    /// Sends `isready` and blocks until `readyok` is observed.
    pub async fn wait_ready(&mut self, lines: &mut Lines<BufReader<ChildStdout>>) -> Result<()> {
        self.send_line("isready").await?;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(Error::Io)?
                .ok_or(Error::ProcessExited)?;
            if line.trim() == "readyok" {
                return Ok(());
            }
        }
    }

    /// Writes one line, appending `\n`, to the engine's stdin.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        debug!("> {line}");
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| {
                warn!("write to engine stdin failed: {e}");
                Error::Io(e)
            })?;
        self.stdin.flush().await.map_err(Error::Io)
    }

    /// Terminates the process: `quit`, then a 1-second bound on a
    /// graceful exit, then a hard kill if it hasn't exited by then
    ///.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down engine process");
        let _ = self.send_line("quit").await;
        if timeout(std::time::Duration::from_secs(1), self.child.wait())
            .await
            .is_err()
        {
            warn!("engine process did not exit within 1s of quit, killing");
            let _ = self.child.kill().await;
            let _ = self.child.wait().await;
        }
        Ok(())
    }
}
