pub mod activation;
pub mod fused;
pub mod op;
pub mod pass_through;
pub mod scale;

pub use activation::{Relu, Sigmoid, Silu};
pub use fused::{AddRelu, AddReluAdd, OutputOp, MAX_D_TENSORS};
pub use op::{ElementwiseOp, ElementwisePipeline, PipelineOps, Then};
pub use pass_through::PassThrough;
pub use scale::Scale;
