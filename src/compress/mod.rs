pub mod bitpack;
pub mod delta;
pub mod quantize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Linear,
    LogarithmicLinear,
}
