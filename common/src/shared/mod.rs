pub mod alloy_tools;
pub mod execution_layer;
