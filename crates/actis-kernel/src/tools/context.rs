//! What a tool can reach during a call.

use crate::sandbox::{Budget, NetworkGuard, OutputBuffer, ScopedFs};

/// Borrowed view of the run's sandbox, handed to one tool call.
///
/// Filesystem and network access only go through the scoped handles here;
/// there is no other path from a tool to the host.
pub struct ToolContext<'a> {
    pub fs: &'a ScopedFs,
    pub net: &'a NetworkGuard,
    pub stdout: &'a mut OutputBuffer,
    pub stderr: &'a mut OutputBuffer,
    pub budget: &'a mut Budget,
}
