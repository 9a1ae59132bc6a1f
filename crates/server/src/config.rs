//! Startup configuration.
//!
//! Resolved once at startup from: CLI flag > `PAIRPAD_*` env > default, then
//! handed to `AppState`. Nothing here is global; callers receive a `Config`.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "pairpad",
    version,
    about = "Live shared documents and terminals for a collaborative editor"
)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, env = "PAIRPAD_BIND", default_value = "127.0.0.1:4000")]
    pub bind: SocketAddr,

    /// Data directory for logs (default: ~/.pairpad).
    #[arg(long, env = "PAIRPAD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding one sub-directory per workspace
    /// (default: <data-dir>/project-data).
    #[arg(long, env = "PAIRPAD_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Shell used when a terminal start command does not name one.
    #[arg(long, env = "PAIRPAD_SHELL")]
    pub shell: Option<String>,

    /// Write logs to stderr instead of <data-dir>/logs/server.log.
    #[arg(long)]
    pub log_stderr: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub default_shell: String,
    pub log_stderr: bool,
}

impl Config {
    pub fn from_args(args: Args) -> io::Result<Self> {
        let data_dir = match args.data_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME directory not found"))?
                .join(".pairpad"),
        };
        let workspace_root = args
            .workspace_root
            .unwrap_or_else(|| data_dir.join("project-data"));
        let default_shell = args
            .shell
            .filter(|shell| !shell.trim().is_empty())
            .unwrap_or_else(platform_shell);

        Ok(Self {
            bind: args.bind,
            data_dir,
            workspace_root,
            default_shell,
            log_stderr: args.log_stderr,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Create the data, log and workspace directories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(&self.workspace_root)?;
        Ok(())
    }

    /// Config rooted entirely inside `dir`, for tests.
    #[cfg(test)]
    pub fn for_dir(dir: &std::path::Path) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: dir.to_path_buf(),
            workspace_root: dir.join("project-data"),
            default_shell: "/bin/sh".to_string(),
            log_stderr: true,
        }
    }
}

/// Shell spawned when neither the client nor the operator picked one.
pub fn platform_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        "bash".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pairpad").chain(args.iter().copied()))
            .expect("args should parse")
    }

    #[test]
    fn workspace_root_defaults_under_data_dir() {
        let config = Config::from_args(parse(&["--data-dir", "/srv/pairpad"])).expect("config");
        assert_eq!(config.data_dir, PathBuf::from("/srv/pairpad"));
        assert_eq!(
            config.workspace_root,
            PathBuf::from("/srv/pairpad/project-data")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/srv/pairpad/logs"));
    }

    #[test]
    fn explicit_flags_win() {
        let config = Config::from_args(parse(&[
            "--data-dir",
            "/srv/pairpad",
            "--workspace-root",
            "/srv/projects",
            "--shell",
            "/bin/zsh",
            "--bind",
            "0.0.0.0:9000",
        ]))
        .expect("config");
        assert_eq!(config.workspace_root, PathBuf::from("/srv/projects"));
        assert_eq!(config.default_shell, "/bin/zsh");
        assert_eq!(config.bind.port(), 9000);
    }

    #[test]
    fn blank_shell_falls_back_to_platform_default() {
        let config = Config::from_args(parse(&["--data-dir", "/tmp/x", "--shell", "  "]))
            .expect("config");
        assert_eq!(config.default_shell, platform_shell());
    }
}
