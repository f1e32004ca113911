pub mod inst;
pub mod operand;
pub mod reg;

pub use inst::{lookup, lookup_by_opcode, InstructionInfo, TABLE};
pub use operand::{OperandSize, WireKind};
pub use reg::Register;
