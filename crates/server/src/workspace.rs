//! Workspace directory: one sub-directory per workspace under a single root.
//!
//! Workspace names are single path segments. File paths inside a workspace
//! are relative and may not climb out of it. The terminal side only ever
//! calls [`WorkspaceDir::resolve_existing`], which never creates anything.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid workspace name: {0:?}")]
    InvalidName(String),

    #[error("invalid file path: {0:?}")]
    InvalidPath(String),

    #[error("workspace not found: {0}")]
    NotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Files written into a freshly created workspace, only when absent.
const STARTER_FILES: &[(&str, &str)] = &[
    (
        "app.ts",
        r#"// Simple TypeScript file used for testing the editor
export function greet(name: string) {
  return 'Hello, ' + name + '!';
}

console.log(greet("team"));"#,
    ),
    (
        "index.html",
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <title>My First Project</title>
    <link rel="stylesheet" href="./style.css" />
  </head>
  <body>
    <h1>Hi team 👋</h1>
    <p>Edit me from the collaborative editor!</p>
    <script type="module">
      import { greet } from "./app.ts";
      console.log(greet("from index.html"));
    </script>
  </body>
</html>"#,
    ),
    (
        "style.css",
        r#":root {
  --fg: #0f172a;
  --bg: #f8fafc;
  --accent: #3b82f6;
}

html, body {
  margin: 0;
  padding: 0;
  font-family: system-ui, Segoe UI, Roboto, Helvetica, Arial, sans-serif;
  background: var(--bg);
  color: var(--fg);
}

h1 {
  color: var(--accent);
  margin: 24px;
}

p {
  margin: 0 24px 24px;
}"#,
    ),
];

#[derive(Debug, Clone)]
pub struct WorkspaceDir {
    root: PathBuf,
}

impl WorkspaceDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an existing workspace without creating it.
    ///
    /// The result is guaranteed to be a directory whose canonical parent is
    /// the canonical workspace root, so neither `..` nor a symlink can lead
    /// a caller outside the root.
    pub fn resolve_existing(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let name = validate_segment(name)?;
        let not_found = || WorkspaceError::NotFound(name.to_string());

        let root = fs::canonicalize(&self.root).map_err(|_| not_found())?;
        let resolved = fs::canonicalize(root.join(name)).map_err(|_| not_found())?;
        if resolved.parent() != Some(root.as_path()) || !resolved.is_dir() {
            return Err(not_found());
        }
        Ok(resolved)
    }

    /// Return the workspace directory, creating it (with starter files) on
    /// first access.
    pub fn ensure_workspace(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let name = validate_segment(name)?;
        let dir = self.root.join(name);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            info!(
                component = "workspace",
                event = "workspace.created",
                workspace = name,
                "Created workspace"
            );
        }

        for (file, content) in STARTER_FILES {
            let path = dir.join(file);
            if path.exists() {
                continue;
            }
            if let Err(e) = fs::write(&path, content) {
                warn!(
                    component = "workspace",
                    event = "workspace.starter_file_failed",
                    workspace = name,
                    file = file,
                    error = %e,
                    "Failed to write starter file"
                );
            }
        }

        Ok(dir)
    }

    /// Names of all workspace directories, sorted. A missing root is empty.
    pub fn list_workspaces(&self) -> Result<Vec<String>, WorkspaceError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Entry names directly inside a workspace, sorted.
    pub fn list_files(&self, name: &str) -> Result<Vec<String>, WorkspaceError> {
        let dir = self.ensure_workspace(name)?;
        let mut names = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    pub fn read_file(&self, name: &str, path: &str) -> Result<String, WorkspaceError> {
        let full = self.ensure_workspace(name)?.join(validate_relative(path)?);
        if !full.is_file() {
            return Err(WorkspaceError::FileNotFound(path.to_string()));
        }
        Ok(fs::read_to_string(full)?)
    }

    pub fn write_file(&self, name: &str, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let full = self.ensure_workspace(name)?.join(validate_relative(path)?);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }
}

/// Accept exactly one normal path component.
fn validate_segment(name: &str) -> Result<&str, WorkspaceError> {
    let invalid = || WorkspaceError::InvalidName(name.to_string());
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == name => Ok(name),
        _ => Err(invalid()),
    }
}

/// Accept a relative path made only of normal components.
fn validate_relative(path: &str) -> Result<PathBuf, WorkspaceError> {
    let invalid = || WorkspaceError::InvalidPath(path.to_string());
    if path.is_empty() || path.contains('\0') {
        return Err(invalid());
    }
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_dir() -> (tempfile::TempDir, WorkspaceDir) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = WorkspaceDir::new(tmp.path().join("project-data"));
        fs::create_dir_all(dir.root()).expect("create root");
        (tmp, dir)
    }

    #[test]
    fn resolve_existing_finds_direct_children_only() {
        let (_tmp, dir) = workspace_dir();
        fs::create_dir_all(dir.root().join("demo")).unwrap();

        let resolved = dir.resolve_existing("demo").expect("demo exists");
        assert!(resolved.ends_with("demo"));
        assert!(resolved.is_dir());
    }

    #[test]
    fn resolve_existing_never_creates() {
        let (_tmp, dir) = workspace_dir();
        assert!(matches!(
            dir.resolve_existing("ghost"),
            Err(WorkspaceError::NotFound(_))
        ));
        assert!(!dir.root().join("ghost").exists());
    }

    #[test]
    fn resolve_existing_rejects_traversal() {
        let (tmp, dir) = workspace_dir();
        fs::create_dir_all(tmp.path().join("outside")).unwrap();
        fs::create_dir_all(dir.root().join("demo/nested")).unwrap();

        for name in ["", ".", "..", "../outside", "demo/nested", "demo/..", "/etc", "a\\b"] {
            assert!(
                matches!(
                    dir.resolve_existing(name),
                    Err(WorkspaceError::InvalidName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn resolve_existing_rejects_symlink_escape() {
        let (tmp, dir) = workspace_dir();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, dir.root().join("sneaky")).unwrap();

        assert!(matches!(
            dir.resolve_existing("sneaky"),
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_existing_rejects_plain_files() {
        let (_tmp, dir) = workspace_dir();
        fs::write(dir.root().join("notes.txt"), "hi").unwrap();
        assert!(matches!(
            dir.resolve_existing("notes.txt"),
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[test]
    fn ensure_workspace_writes_starter_files_once() {
        let (_tmp, dir) = workspace_dir();
        let path = dir.ensure_workspace("fresh").expect("create");
        assert_eq!(
            dir.list_files("fresh").unwrap(),
            vec!["app.ts", "index.html", "style.css"]
        );

        fs::write(path.join("app.ts"), "edited").unwrap();
        dir.ensure_workspace("fresh").expect("re-ensure");
        assert_eq!(fs::read_to_string(path.join("app.ts")).unwrap(), "edited");
    }

    #[test]
    fn list_workspaces_only_returns_directories() {
        let (_tmp, dir) = workspace_dir();
        fs::create_dir_all(dir.root().join("beta")).unwrap();
        fs::create_dir_all(dir.root().join("alpha")).unwrap();
        fs::write(dir.root().join("stray.txt"), "").unwrap();

        assert_eq!(dir.list_workspaces().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn list_workspaces_with_missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkspaceDir::new(tmp.path().join("nope"));
        assert!(dir.list_workspaces().unwrap().is_empty());
    }

    #[test]
    fn write_then_read_file() {
        let (_tmp, dir) = workspace_dir();
        dir.write_file("demo", "src/main.ts", "let x = 1;").unwrap();
        assert_eq!(dir.read_file("demo", "src/main.ts").unwrap(), "let x = 1;");
        assert!(matches!(
            dir.read_file("demo", "missing.ts"),
            Err(WorkspaceError::FileNotFound(_))
        ));
    }

    #[test]
    fn file_paths_cannot_escape_workspace() {
        let (_tmp, dir) = workspace_dir();
        for path in ["../secret", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(
                    dir.write_file("demo", path, "x"),
                    Err(WorkspaceError::InvalidPath(_))
                ),
                "{path:?} should be rejected"
            );
        }
    }
}
