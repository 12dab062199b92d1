//! Built-in tool implementations for the representative families named in
//! spec §4.4.
//!
//! Grounded on `cloudllm::tools::bash::BashTool` (shell-exec) and
//! `cloudllm::tools::filesystem::FileSystemTool` (the file family); the
//! remaining families (view-image, view-document, todo-write, task, skill)
//! have no direct teacher counterpart and are built fresh in the same
//! handler-returns-`ToolOutcome`-never-errors-operationally idiom.

pub mod files;
pub mod shell_exec;
pub mod skill;
pub mod task;
pub mod todo;
pub mod view_document;
pub mod view_image;
