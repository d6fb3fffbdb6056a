/// JSON-RPC error codes for protocol-level failures. Tool failures never
/// use these; they come back as `isError` tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
