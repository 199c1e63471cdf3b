mod instruction;
mod mnemonic;
mod node;
mod number;
mod operand;
mod register;

pub use instruction::{Code, ExprPatch, Fixup, Instruction, Target, Width};
pub use mnemonic::{Mnemonic, MAX_MNEMONIC_LEN};
pub use node::{IncludeKind, Line, Node, TextKind};
pub use number::{Displacement, Number, NumberFormat};
pub use operand::{Indirect, Operand};
pub use register::{Condition, IndexReg, Reg16, Reg8, RESERVED_NAMES};
