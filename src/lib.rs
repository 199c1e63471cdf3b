/// Records of an assembled module: lines, instructions, operands and registers.
pub mod ast;

/// Transforms Z80 assembly text into position independent records, one per line.
///
/// The steps are:
/// 1. **Lexing** - reading identifiers, numbers and punctuation from a line
/// 2. **Parsing** - turning a line into a [`ast::Line`], interning its names
/// 3. **Encoding** - generating opcode bytes and the fixup left for the linker
pub mod assembler;

/// Renders records back to source text and listings.
pub mod disassembler;

/// Integer expressions used by `equ` and `=expression` operands.
pub mod expression;

/// Hexdump utility
pub mod hexdump;

/// Logging and chrome tracing setup.
pub mod instrumentation;

/// Combines object files into a binary image and map.
///
/// The stages are:
/// 1. **Collect** - load modules and their includes, define labels
/// 2. **Order** - entry module first, the rest by file name
/// 3. **Assign addresses** - place modules back to back from the start address
/// 4. **Resolve** - evaluate global constants
/// 5. **Emit** - patch fixups and write the image
/// 6. **Map** - optionally list every address label
pub mod linker;

/// The `.x` object file format.
pub mod object;

/// T-state cycle counts.
pub mod timing;
