/*!
  Representation of VM instructions abstractly and as binary bytecode.
*/

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

// If you change this you must also change the encode and decode methods of everything that
// serializes to Words.
pub type Word = u32;

/// An index into the register file. Always in `0..8`, as it is produced by
/// masking three bits out of an instruction word.
pub type RegisterIndex = usize;

/// The 25-bit immediate operand of `LoadValue`.
pub const IMMEDIATE_MASK: Word = (1 << 25) - 1;

/**
  Opcodes of the virtual machine.

  Rust stores enum variants as bytes. As in C, enum values are represented by consecutive
  natural numbers and can be treated as numeric types. The numeric value of each variant
  below is the value of the opcode field in bytecode, so the order the opcodes are listed
  is significant. `LoadValue` is the only opcode that does not use the three-register
  operand layout; see the module documentation.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq,        Debug, Hash
)]
#[repr(u8)]
pub enum Opcode {
  ConditionalMove,   // if R[C] != 0 then R[A] <- R[B]
  SegmentedLoad,     // R[A] <- segment[R[B]][R[C]]
  SegmentedStore,    // segment[R[A]][R[B]] <- R[C]
  Addition,          // R[A] <- R[B] + R[C]
  Multiplication,    // R[A] <- R[B] * R[C]
  Division,          // R[A] <- R[B] / R[C]
  BitwiseNand,       // R[A] <- !(R[B] & R[C])
  Halt,              // stop the machine
  MapSegment,        // R[B] <- new segment id, R[C] words long
  UnmapSegment,      // release segment R[C]
  Output,            // emit the byte R[C]
  Input,             // R[C] <- next input byte
  LoadProgram,       // duplicate segment R[B] over segment 0, jump to R[C]
  LoadValue,         // R[A] <- immediate
  // Opcode 14
}

impl Opcode {
  /// Gives the 4-bit numeric value that represents the operation, padded
  /// with zeros to make a `Word`.
  pub fn code(&self) -> Word {
    let val: u8 = (*self).into();
    val as Word
  }
}

// region Field extraction

/*
  The bit-field accessors below are the decoder the execution loop uses. Each
  is a single shift and mask, which is cheaper than building a decoded
  `Instruction` value every cycle.
*/

/// The opcode field, bits 31..28.
#[inline(always)]
pub fn opcode_bits(word: Word) -> u8 {
  (word >> 28) as u8
}

/// Register operand A of a three-register instruction, bits 8..6.
#[inline(always)]
pub fn field_a(word: Word) -> RegisterIndex {
  ((word >> 6) & 7) as RegisterIndex
}

/// Register operand B of a three-register instruction, bits 5..3.
#[inline(always)]
pub fn field_b(word: Word) -> RegisterIndex {
  ((word >> 3) & 7) as RegisterIndex
}

/// Register operand C of a three-register instruction, bits 2..0.
#[inline(always)]
pub fn field_c(word: Word) -> RegisterIndex {
  (word & 7) as RegisterIndex
}

/// The destination register of `LoadValue`, bits 27..25.
#[inline(always)]
pub fn field_value_register(word: Word) -> RegisterIndex {
  ((word >> 25) & 7) as RegisterIndex
}

/// The immediate operand of `LoadValue`, bits 24..0.
#[inline(always)]
pub fn field_immediate(word: Word) -> Word {
  word & IMMEDIATE_MASK
}

// endregion

/// Holds the unencoded components of an instruction. As such, it enumerates the possible
/// instruction operand layouts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [Opcode:4][Unused:19][A:3][B:3][C:3]
  Register {
    opcode :  Opcode,
    a      :  RegisterIndex,
    b      :  RegisterIndex,
    c      :  RegisterIndex
  },
  /// [Opcode:4][A:3][Value:25], the layout of `LoadValue` alone
  Immediate {
    a     :  RegisterIndex,
    value :  Word
  },
}

impl Instruction {

  /**
    Decodes a bytecode word. Returns `None` when the high nibble is not one
    of the fourteen opcodes. Operands a decoded instruction does not use
    (the registers of `Halt`, say) are still extracted, as they cost nothing
    and keep the layouts uniform.
  */
  pub fn try_decode(word: Word) -> Option<Instruction> {
    let opcode = match Opcode::try_from(opcode_bits(word)) {
      Ok(oc)  => oc,
      Err(_e) => { return None; }
    };

    let instruction =
    match opcode {
      Opcode::LoadValue => {
        Instruction::Immediate {
          a     : field_value_register(word),
          value : field_immediate(word)
        }
      }
      _ => {
        Instruction::Register {
          opcode,
          a: field_a(word),
          b: field_b(word),
          c: field_c(word)
        }
      }
    };

    Some(instruction)
  }

  /**
    Encodes the instruction into bytecode. The inverse of `try_decode`. It is
    the caller's responsibility to use the `Immediate` variant for
    `LoadValue` and the `Register` variant for everything else.
  */
  pub fn encode(&self) -> Word {
    match self {

      Instruction::Register { opcode, a, b, c } => {
        // [Opcode:4][Unused:19][A:3][B:3][C:3]
        (opcode.code() << 28)
          + ((*a as Word) << 6)
          + ((*b as Word) << 3)
          +  (*c as Word)
      }

      Instruction::Immediate { a, value } => {
        // [Opcode:4][A:3][Value:25]
        (Opcode::LoadValue.code() << 28)
          + ((*a as Word) << 25)
          + (value & IMMEDIATE_MASK)
      }

    }
  }

  /// The opcode of either layout.
  pub fn opcode(&self) -> Opcode {
    match self {
      Instruction::Register { opcode, .. } => *opcode,
      Instruction::Immediate { .. }        => Opcode::LoadValue
    }
  }

}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Register { opcode, a, b, c } => {
        write!(f, "{}(r{}, r{}, r{})", opcode, a, b, c)
      }

      Instruction::Immediate { a, value } => {
        write!(f, "{}(r{}, {})", Opcode::LoadValue, a, value)
      }

    }
  }
}

/// Encodes a sequence of instructions into a segment's worth of bytecode.
pub fn assemble(instructions: &[Instruction]) -> Vec<Word> {
  instructions.iter()
              .map(Instruction::encode)
              .collect()
}

/**
  Renders a segment of bytecode as one instruction per line, with the word
  offset in the left column. Words that do not decode are shown as raw data:
  a program is free to store non-instruction words in segment 0 as long as
  the program counter never reaches them.
*/
pub fn disassemble(words: &[Word]) -> String {
  let mut listing = String::new();
  for (offset, word) in words.iter().enumerate() {
    let line =
    match Instruction::try_decode(*word) {
      Some(instruction) => format!("{:>6}:  {}\n",          offset, instruction),
      None              => format!("{:>6}:  0x{:0>8X}\n", offset, word)
    };
    listing.push_str(line.as_str());
  }
  listing
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_high_nibble_selects_at_most_one_opcode() {
    // Opcodes 0 through 13 decode; 14 and 15 do not.
    for code in 0u8..14 {
      assert!(Opcode::try_from(code).is_ok());
    }
    assert!(Opcode::try_from(14).is_err());
    assert!(Opcode::try_from(15).is_err());
  }

  #[test]
  fn three_register_layout_round_trips() {
    let instruction = Instruction::Register {
      opcode: Opcode::Addition, a: 1, b: 2, c: 3
    };
    let word = instruction.encode();

    // Hand-packed: opcode 3 in the top nibble, operands in the bottom 9 bits.
    assert_eq!(word, (3 << 28) | (1 << 6) | (2 << 3) | 3);
    assert_eq!(opcode_bits(word), 3);
    assert_eq!(field_a(word), 1);
    assert_eq!(field_b(word), 2);
    assert_eq!(field_c(word), 3);
    assert_eq!(Instruction::try_decode(word), Some(instruction));
  }

  #[test]
  fn immediate_layout_round_trips() {
    let instruction = Instruction::Immediate { a: 5, value: 1_000_000 };
    let word = instruction.encode();

    assert_eq!(word, (13 << 28) | (5 << 25) | 1_000_000);
    assert_eq!(field_value_register(word), 5);
    assert_eq!(field_immediate(word), 1_000_000);
    assert_eq!(Instruction::try_decode(word), Some(instruction));
  }

  #[test]
  fn immediate_holds_exactly_25_bits() {
    let instruction = Instruction::Immediate { a: 0, value: IMMEDIATE_MASK };
    let word = instruction.encode();
    assert_eq!(field_immediate(word), 0x1FF_FFFF);

    // A 26th bit does not leak into the destination register field.
    let oversized = Instruction::Immediate { a: 0, value: IMMEDIATE_MASK + 1 };
    assert_eq!(field_immediate(oversized.encode()), 0);
    assert_eq!(field_value_register(oversized.encode()), 0);
  }

  #[test]
  fn undecodable_word_is_rejected() {
    assert_eq!(Instruction::try_decode(0xF000_0000), None);
    assert_eq!(Instruction::try_decode(0xE123_4567), None);
  }

  #[test]
  fn display_names_operands() {
    let conditional = Instruction::Register {
      opcode: Opcode::ConditionalMove, a: 7, b: 0, c: 4
    };
    assert_eq!(format!("{}", conditional), "ConditionalMove(r7, r0, r4)");

    let load = Instruction::Immediate { a: 2, value: 42 };
    assert_eq!(format!("{}", load), "LoadValue(r2, 42)");
  }

  #[test]
  fn disassembly_marks_raw_data() {
    let mut words = assemble(&[
      Instruction::Immediate { a: 0, value: 72 },
      Instruction::Register { opcode: Opcode::Output, a: 0, b: 0, c: 0 },
    ]);
    words.push(0xFFFF_FFFF); // not an instruction

    let listing = disassemble(&words);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("LoadValue(r0, 72)"));
    assert!(lines[1].contains("Output"));
    assert!(lines[2].contains("0xFFFFFFFF"));
  }
}
