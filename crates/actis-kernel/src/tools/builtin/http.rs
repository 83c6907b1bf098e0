//! http_get behind the network policy.

use async_trait::async_trait;

use crate::interpreter::{Dict, Interrupt, Value};
use crate::tools::{Tool, ToolArgs, ToolContext};

/// GET a URL; returns `{"status": int, "body": str}`.
///
/// The body is read against the remaining memory budget.
pub struct HttpGet;

#[async_trait]
impl Tool for HttpGet {
    fn name(&self) -> &str {
        "http_get"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let url = args.str_arg("http_get", 0, "url")?;
        let response = ctx.net.get(url, ctx.budget.remaining_memory()).await?;
        let mut result = Dict::new();
        result.insert(Value::str("status"), Value::Int(i64::from(response.status)))?;
        result.insert(Value::str("body"), Value::str(response.body))?;
        Ok(Value::dict(result))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::interpreter::FaultKind;
    use crate::sandbox::{Budget, FilesystemPolicy, NetworkGuard, NetworkPolicy, OutputBuffer, ScopedFs};

    #[tokio::test]
    async fn denied_host_never_connects() {
        let fs = ScopedFs::new(FilesystemPolicy::Disabled);
        let net = NetworkGuard::new(NetworkPolicy::AllowListed {
            hosts: vec!["api.example.com".into()],
        });
        let mut stdout = OutputBuffer::default();
        let mut stderr = OutputBuffer::default();
        let mut budget = Budget::new(Duration::from_secs(5), 1 << 20);
        let mut ctx = ToolContext {
            fs: &fs,
            net: &net,
            stdout: &mut stdout,
            stderr: &mut stderr,
            budget: &mut budget,
        };
        let args = ToolArgs::from_positional(vec![Value::str("http://localhost:1/")]);
        match HttpGet.execute(args, &mut ctx).await {
            Err(Interrupt::Denied(fault)) => assert_eq!(fault.kind, FaultKind::NetworkDenied),
            other => panic!("unexpected {other:?}"),
        }
    }
}
