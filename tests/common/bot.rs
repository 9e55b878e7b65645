//! Test bot management.
//!
//! Spawns the `sopel` binary with a temporary configuration.

use std::process::{Child, Command, Stdio};
use tempfile::TempDir;

/// A running bot process, killed on drop.
pub struct TestBot {
    child: Child,
    _dir: TempDir,
}

impl TestBot {
    /// Spawn a bot named `TestBot` connecting to `127.0.0.1:port`.
    ///
    /// `extra` is appended to the `[core]` section.
    pub fn spawn(port: u16, extra: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.toml");
        let config_content = format!(
            r##"
[core]
nick = "TestBot"
user = "sopel"
host = "127.0.0.1"
port = {}
channels = ["#test"]
reconnect_delay = 1
timeout = 30
{}

[logging]
level = "debug"
"##,
            port, extra
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_sopel"))
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, _dir: dir })
    }

    /// Wait up to `secs` seconds for the process to exit by itself.
    pub fn wait_exit(&mut self, secs: u64) -> Option<std::process::ExitStatus> {
        for _ in 0..secs * 10 {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        None
    }
}

impl Drop for TestBot {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
