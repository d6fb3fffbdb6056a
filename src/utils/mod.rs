pub mod data_path;
pub mod ids;
pub mod paths;
pub mod suggest;
pub mod text;
pub mod tool_errors;
