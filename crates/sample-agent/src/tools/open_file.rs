use async_trait::async_trait;
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;
use crate::registry::ToolHandler;

/// Hands a file to whatever application the platform associates with it
pub trait FileOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<()>;
}

/// Opens files through the operating system's default handler
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

// No shell in between: the path reaches the handler as a single argument.
#[cfg(target_os = "windows")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("rundll32");
    command.arg("url.dll,FileProtocolHandler").arg(path);
    command
}

#[cfg(target_os = "macos")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}

impl FileOpener for SystemOpener {
    fn open(&self, path: &Path) -> io::Result<()> {
        let status = opener_command(path).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("opener exited with {}", status),
            ))
        }
    }
}

/// The `open_file` tool
pub struct OpenFileTool {
    tool: Tool,
    opener: Arc<dyn FileOpener>,
}

impl Default for OpenFileTool {
    fn default() -> Self {
        Self::new(Arc::new(SystemOpener))
    }
}

impl OpenFileTool {
    pub fn new(opener: Arc<dyn FileOpener>) -> Self {
        let tool = Tool::new(
            "open_file",
            "Open a local file with the application the operating system associates with it. \
            Returns a message saying whether the file was opened.",
            json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Full path of the file to open, e.g. C:\\Users\\Alice\\Documents\\example.pdf"
                    }
                }
            }),
        );
        Self { tool, opener }
    }
}

#[async_trait]
impl ToolHandler for OpenFileTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<String> {
        let file_path = arguments
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("file_path parameter required".into()))?
            .to_string();

        tracing::info!(%file_path, "opening file");

        let path = PathBuf::from(&file_path);
        tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::Execution(format!("Failed to open file {}: {}", file_path, e)))?;

        let opener = self.opener.clone();
        tokio::task::spawn_blocking(move || opener.open(&path))
            .await
            .map_err(|e| ToolError::Execution(format!("Opener task failed: {}", e)))?
            .map_err(|e| ToolError::Execution(format!("Failed to open file {}: {}", file_path, e)))?;

        Ok(format!("Opened file: {}", file_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl FileOpener for RecordingOpener {
        fn open(&self, path: &Path) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "no handler"));
            }
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn temp_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_open_existing_file() {
        let (_dir, path) = temp_file();
        let opener = Arc::new(RecordingOpener::default());
        let tool = OpenFileTool::new(opener.clone());

        let output = tool
            .invoke(json!({"file_path": path.to_string_lossy()}))
            .await
            .unwrap();

        assert_eq!(output, format!("Opened file: {}", path.display()));
        assert_eq!(*opener.opened.lock().unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn test_missing_file_is_execution_error() {
        let opener = Arc::new(RecordingOpener::default());
        let tool = OpenFileTool::new(opener.clone());

        let result = tool
            .invoke(json!({"file_path": "/definitely/not/here.pdf"}))
            .await;

        assert!(matches!(result, Err(ToolError::Execution(_))));
        assert!(opener.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_opener_failure_is_execution_error() {
        let (_dir, path) = temp_file();
        let tool = OpenFileTool::new(Arc::new(RecordingOpener {
            fail: true,
            ..Default::default()
        }));

        let result = tool.invoke(json!({"file_path": path.to_string_lossy()})).await;
        match result {
            Err(ToolError::Execution(reason)) => assert!(reason.contains("no handler")),
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn test_opener_command_bypasses_the_shell() {
        let path = Path::new(r"C:\tmp\a&calc.pdf");
        let command = opener_command(path);
        assert_eq!(command.get_program(), "rundll32");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec![OsStr::new("url.dll,FileProtocolHandler"), path.as_os_str()]);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_opener_command_passes_path_verbatim() {
        let path = Path::new("/tmp/x&calc;|.pdf");
        let command = opener_command(path);
        let expected = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        assert_eq!(command.get_program(), expected);
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec![OsStr::new("/tmp/x&calc;|.pdf")]);
    }

    #[test]
    fn test_schema_requires_file_path() {
        let tool = OpenFileTool::default();
        assert_eq!(tool.tool().name, "open_file");
        assert_eq!(tool.tool().input_schema["required"], json!(["file_path"]));
    }
}
