//! Executes tool calls requested by the model.

use super::ToolRegistry;
use crate::chat::{ToolCallRequest, ToolObservation};
use crate::error::ParleyError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Resolves tool calls against a registry and produces observations.
///
/// Every failure becomes observation text the model can read; nothing is
/// retried here.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, tool_timeout: Duration) -> Self {
        Self {
            registry,
            tool_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[instrument(skip(self, call), fields(tool = %call.tool_name, id = %call.id))]
    pub async fn invoke(&self, call: &ToolCallRequest) -> ToolObservation {
        let content = self.run(call).await;
        ToolObservation {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            content,
        }
    }

    async fn run(&self, call: &ToolCallRequest) -> String {
        let name = &call.tool_name;

        let Some(tool) = self.registry.get(name) else {
            warn!("Model requested unknown tool '{}'", name);
            return format!("Invalid function name: '{}'", name);
        };

        let raw = call.raw_arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw) {
                Ok(args) => args,
                Err(e) => {
                    warn!("Could not decode arguments for {}: {}", name, e);
                    return decode_failure(name, &call.raw_arguments, &e.to_string());
                }
            }
        };

        info!("Calling tool {} with args: {}", name, args);

        match tokio::time::timeout(self.tool_timeout, tool.call(args.clone())).await {
            Ok(Ok(result)) => serde_json::to_string(&result)
                .unwrap_or_else(|e| call_failure(name, &args, &e.to_string())),
            Ok(Err(ParleyError::InvalidArguments(e))) => {
                warn!("Arguments for {} have the wrong shape: {}", name, e);
                decode_failure(name, &call.raw_arguments, &e)
            }
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", name, e);
                call_failure(name, &args, &e.to_string())
            }
            Err(_) => {
                warn!("Tool {} timed out after {:?}", name, self.tool_timeout);
                call_failure(
                    name,
                    &args,
                    &format!("timed out after {}s", self.tool_timeout.as_secs_f32()),
                )
            }
        }
    }
}

fn decode_failure(name: &str, raw: &str, error: &str) -> String {
    format!(
        "Error decoding function call `{}` arguments '{}'! Error: {}",
        name, raw, error
    )
}

fn call_failure(name: &str, args: &Value, error: &str) -> String {
    format!(
        "Function call `{}` failed with arguments {}! Error: {}",
        name, args, error
    )
}
