/*!

  The VM uses a 32 bit word size, and every instruction occupies exactly one
  word. The opcode lives in the top 4 bits. Thirteen of the fourteen opcodes
  pack three 3-bit register indices into the bottom 9 bits:

    Opcode:  4 bits (31..28)
    A:       3 bits ( 8..6 )
    B:       3 bits ( 5..3 )
    C:       3 bits ( 2..0 )

  The exception is `LoadValue`, which needs room for a constant and so uses
  its own layout:

    Opcode:  4 bits (31..28)
    A:       3 bits (27..25)
    Value:  25 bits (24..0 )

  One design decision that needed to be made is whether the execution loop
  should operate on a decoded `Instruction` value or on the raw word. Decoding
  to an enum costs a discriminant write and operand moves on every cycle of
  the hot loop, while extracting a field from the raw word is a shift and a
  mask. The loop therefore works on raw words through the `field_*` helpers,
  and the `Instruction` enum exists for the places where instructions are
  built, inspected, or printed rather than executed.

*/

mod instruction;

pub use instruction::{
  assemble, disassemble, field_a, field_b, field_c, field_immediate,
  field_value_register, opcode_bits, Instruction, Opcode, RegisterIndex, Word,
};
