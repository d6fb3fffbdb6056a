mod rpc_code;
mod tool_error;

pub use rpc_code::ErrorCode;
pub use tool_error::{ToolError, ToolErrorKind};
