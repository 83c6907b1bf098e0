//! Turn-ending signals and agent reflection.

use async_trait::async_trait;

use crate::interpreter::{Interrupt, TurnSignal, Value};
use crate::tools::{Tool, ToolArgs, ToolContext};

/// `respond(message)`: end the turn with a message for the user.
pub struct Respond;

#[async_trait]
impl Tool for Respond {
    fn name(&self) -> &str {
        "respond"
    }

    async fn execute(&self, args: ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let message = args.required("respond", 0, "message")?.to_str();
        Err(Interrupt::Signal(TurnSignal::Respond { message }))
    }
}

/// `continue_turn()`: end this script and ask for another one.
pub struct ContinueTurn;

#[async_trait]
impl Tool for ContinueTurn {
    fn name(&self) -> &str {
        "continue_turn"
    }

    async fn execute(&self, _args: ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        Err(Interrupt::Signal(TurnSignal::ContinueTurn))
    }
}

/// `reflect(analysis)`: record reasoning in the run's output.
pub struct Reflect;

#[async_trait]
impl Tool for Reflect {
    fn name(&self) -> &str {
        "reflect"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let analysis = args.required("reflect", 0, "analysis")?.to_str();
        ctx.stdout.write(&format!(
            "--- AGENT REFLECTION ---\n{analysis}\n------------------------\n"
        ));
        Ok(Value::None)
    }
}
