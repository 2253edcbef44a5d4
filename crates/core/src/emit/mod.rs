//! Native code emission: the C syntax tree, the struct emitter and the RPC
//! function emitter.

pub mod c;
pub mod rpc;
pub mod structs;

pub use c::{CFile, CItem, Emit};
pub use rpc::{ModuleOutput, emit_module};
pub use structs::{StructEmitter, StructOutput};
