//! Standard operator library
//!
//! Collection of built-in operators for common graphs

mod debug;
mod forward;
mod ping;
mod tensor;
mod time;

pub use debug::DebugOp;
pub use forward::ForwardOp;
pub use ping::{PingRxOp, PingTxOp, ReceivedValues};
pub use tensor::{TensorSinkOp, TensorSourceOp, TensorSummaries, TensorSummary, TENSOR_COMPONENT};
pub use time::DelayOp;
use tickruntime::OperatorRegistry;

use std::sync::Arc;

/// Register all standard operators with a registry
pub fn register_all(registry: &mut OperatorRegistry) {
    registry.register(Arc::new(debug::DebugOpFactory));
    registry.register(Arc::new(forward::ForwardOpFactory));
    registry.register(Arc::new(ping::PingTxOpFactory));
    registry.register(Arc::new(ping::PingRxOpFactory));
    registry.register(Arc::new(tensor::TensorSourceOpFactory));
    registry.register(Arc::new(tensor::TensorSinkOpFactory));
    registry.register(Arc::new(time::DelayOpFactory));
}
