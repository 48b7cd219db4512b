//! Structures and functions for the Universal Virtual Machine, the execution
//! core that owns the register file, the program counter, and the segment
//! table, and drives the fetch-decode-dispatch cycle.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::io::{self, BufReader, BufWriter, Read, Write};

use prettytable::{format as TableFormat, Table};

use crate::bytecode::{
  field_a, field_b, field_c, field_immediate, field_value_register,
  opcode_bits, Opcode, RegisterIndex, Word,
};
use crate::error::UmError;
use crate::segments::{Segment, SegmentTable};

#[cfg(feature = "trace_computation")]
use crate::bytecode::Instruction;

/// What the `Input` instruction delivers when the input stream is exhausted.
pub const EOF_SENTINEL: Word = !0;

pub struct UVM {

  // Registers //
  registers : [Word; 8], // The general-purpose register file
  pc        : Word,      // Program counter, an offset into segment 0

  // Memory store //
  segments  : SegmentTable,

  // Byte streams backing the `Input` and `Output` instructions //
  input     : Box<dyn Read>,
  output    : Box<dyn Write>,

  // For tracing computations :
  #[cfg(feature = "trace_computation")] step_count : u64,

}

impl UVM {

  // region Low-level utility methods

  /// Builds a machine around `program`, wired to the process's standard
  /// streams. Registers and the program counter start at zero.
  pub fn new(program: Segment) -> UVM {
    UVM::with_io(
      program,
      Box::new(BufReader::new(io::stdin())),
      Box::new(BufWriter::new(io::stdout())),
    )
  }

  /// Builds a machine around `program` with caller-supplied byte streams.
  pub fn with_io(program: Segment, input: Box<dyn Read>, output: Box<dyn Write>) -> UVM {
    UVM {
      registers : [0; 8],
      pc        : 0,
      segments  : SegmentTable::new(program),
      input,
      output,

      // Computation tracing:
      #[cfg(feature = "trace_computation")] step_count : 0,
    }
  }

  pub fn registers(&self) -> &[Word; 8] {
    &self.registers
  }

  pub fn pc(&self) -> Word {
    self.pc
  }

  pub fn segments(&self) -> &SegmentTable {
    &self.segments
  }

  // endregion

  // region VM control methods

  /**
    Begin execution of the bytecode starting at the current program counter,
    which is offset 0 of segment 0 on a fresh machine. Returns `Ok(())` when
    the program halts and the first runtime fault otherwise. The output
    stream is flushed on both paths, since a fault must not swallow bytes the
    program already emitted.
  */
  pub fn run(&mut self) -> Result<(), UmError> {
    let result = self.execute();
    match self.output.flush() {
      Ok(())     => result,
      Err(error) => result.and(Err(UmError::Io(error))),
    }
  }

  /**
    The fetch-decode-dispatch cycle. This loop is the hot path: a program is
    a few kilobytes of bytecode executed billions of times over, so operands
    are extracted from the raw word with single-mask helpers and dispatch is
    one `match` on the high nibble, which the compiler lowers to a jump
    table. No decoded instruction value is built here.

    The program counter advances after every instruction except `LoadProgram`,
    whose handler sets it, and `Halt`, which leaves the loop.
  */
  fn execute(&mut self) -> Result<(), UmError> {
    loop {
      let word = match self.segments.read(0, self.pc) {
        Ok(word) => word,
        Err(_)   => { return Err(UmError::ProgramCounterRange(self.pc)); }
      };

      #[cfg(feature = "trace_computation")] self.trace(word);

      let opcode = match Opcode::try_from(opcode_bits(word)) {
        Ok(opcode) => opcode,
        Err(_e)    => { return Err(UmError::BadOpcode { word, pc: self.pc }); }
      };

      match opcode {
        Opcode::ConditionalMove => { self.conditional_move(field_a(word), field_b(word), field_c(word)); }
        Opcode::SegmentedLoad   => { self.segmented_load(field_a(word), field_b(word), field_c(word))?; }
        Opcode::SegmentedStore  => { self.segmented_store(field_a(word), field_b(word), field_c(word))?; }
        Opcode::Addition        => { self.addition(field_a(word), field_b(word), field_c(word)); }
        Opcode::Multiplication  => { self.multiplication(field_a(word), field_b(word), field_c(word)); }
        Opcode::Division        => { self.division(field_a(word), field_b(word), field_c(word))?; }
        Opcode::BitwiseNand     => { self.bitwise_nand(field_a(word), field_b(word), field_c(word)); }

        Opcode::Halt            => {
          #[cfg(feature = "trace_computation")] eprintln!("{}", self);
          return Ok(());
        }

        Opcode::MapSegment      => { self.map_segment(field_b(word), field_c(word))?; }
        Opcode::UnmapSegment    => { self.unmap_segment(field_c(word))?; }
        Opcode::Output          => { self.output(field_c(word))?; }
        Opcode::Input           => { self.input(field_c(word))?; }

        Opcode::LoadProgram     => {
          self.load_program(field_b(word), field_c(word))?;
          // The handler redirected the program counter.
          continue;
        }

        Opcode::LoadValue       => { self.load_value(field_value_register(word), field_immediate(word)); }
      }

      self.pc += 1;
    }
  }

  #[cfg(feature = "trace_computation")]
  fn trace(&mut self, word: Word) {
    self.step_count += 1;
    match Instruction::try_decode(word) {
      Some(instruction) => eprintln!("{:>10}  CODE[{}]  {}",          self.step_count, self.pc, instruction),
      None              => eprintln!("{:>10}  CODE[{}]  0x{:0>8X}", self.step_count, self.pc, word),
    }
  }

  // endregion

  // region VM instruction methods

  /// if R[C] != 0 then R[A] <- R[B]
  #[inline(always)]
  fn conditional_move(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) {
    if self.registers[c] != 0 {
      self.registers[a] = self.registers[b];
    }
  }

  /// R[A] <- segment[R[B]][R[C]]
  #[inline(always)]
  fn segmented_load(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) -> Result<(), UmError> {
    self.registers[a] = self.segments.read(self.registers[b], self.registers[c])?;
    Ok(())
  }

  /// segment[R[A]][R[B]] <- R[C]
  #[inline(always)]
  fn segmented_store(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) -> Result<(), UmError> {
    self.segments.write(self.registers[a], self.registers[b], self.registers[c])
  }

  /// R[A] <- R[B] + R[C], wrapping at 2^32
  #[inline(always)]
  fn addition(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) {
    self.registers[a] = self.registers[b].wrapping_add(self.registers[c]);
  }

  /// R[A] <- R[B] * R[C], wrapping at 2^32
  #[inline(always)]
  fn multiplication(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) {
    self.registers[a] = self.registers[b].wrapping_mul(self.registers[c]);
  }

  /// R[A] <- floor(R[B] / R[C]). A zero divisor is a fault.
  #[inline(always)]
  fn division(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) -> Result<(), UmError> {
    let divisor = self.registers[c];
    if divisor == 0 {
      return Err(UmError::DivisionByZero { pc: self.pc });
    }
    self.registers[a] = self.registers[b] / divisor;
    Ok(())
  }

  /// R[A] <- !(R[B] & R[C])
  #[inline(always)]
  fn bitwise_nand(&mut self, a: RegisterIndex, b: RegisterIndex, c: RegisterIndex) {
    self.registers[a] = !(self.registers[b] & self.registers[c]);
  }

  /// R[B] <- identifier of a fresh zero-filled segment, R[C] words long
  #[inline(always)]
  fn map_segment(&mut self, b: RegisterIndex, c: RegisterIndex) -> Result<(), UmError> {
    self.registers[b] = self.segments.allocate(self.registers[c])?;
    Ok(())
  }

  /// Releases the identifier in R[C] back to the pool.
  #[inline(always)]
  fn unmap_segment(&mut self, c: RegisterIndex) -> Result<(), UmError> {
    self.segments.free(self.registers[c])
  }

  /// Emits the byte in R[C]. A value above 255 is a fault.
  #[inline(always)]
  fn output(&mut self, c: RegisterIndex) -> Result<(), UmError> {
    let value = self.registers[c];
    if value > 0xFF {
      return Err(UmError::OutputRange(value));
    }
    self.output.write_all(&[value as u8])?;
    Ok(())
  }

  /// R[C] <- the next input byte, or the all-ones sentinel at end of stream.
  #[inline(always)]
  fn input(&mut self, c: RegisterIndex) -> Result<(), UmError> {
    let mut byte = [0u8; 1];
    self.registers[c] = match self.input.read(&mut byte)? {
      0 => EOF_SENTINEL,
      _ => byte[0] as Word,
    };
    Ok(())
  }

  /**
    Duplicates segment R[B] over segment 0 and redirects the program counter
    to R[C]. When R[B] is 0 the duplication is skipped and the instruction is
    a plain jump, which is the only cheap control transfer the machine has,
    so the common case is the jump.
  */
  #[inline(always)]
  fn load_program(&mut self, b: RegisterIndex, c: RegisterIndex) -> Result<(), UmError> {
    let id = self.registers[b];
    if id != 0 {
      self.segments.replace_zero(id)?;
    }
    self.pc = self.registers[c];
    Ok(())
  }

  /// R[A] <- 25-bit immediate
  #[inline(always)]
  fn load_value(&mut self, a: RegisterIndex, value: Word) {
    self.registers[a] = value;
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (i, value) in self.registers.iter().enumerate() {
      table.add_row(row![r->format!("r{} =", i), format!("0x{:0>8X}", value)]);
    }
    table
  }

  fn make_segment_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Segment", ubr->"Words", ubl->"State"]);

    for id in 0..self.segments.slot_count() {
      let id = id as Word;
      // `segment` cannot fail for ids below `slot_count`.
      let length = self.segments.segment(id).map(Vec::len).unwrap_or(0);
      let state  = match self.segments.is_mapped(id) {
        true  => "mapped",
        false => "free"
      };
      table.add_row(row![r->format!("{}:", id), r->length, state]);
    }
    table
  }

  // endregion

}

impl Display for UVM {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut combined_table = table!([self.make_register_table(), self.make_segment_table()]);

    combined_table.set_titles(row![ub->"Registers", ub->"Segments"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "PC: {}\n{}", self.pc, combined_table)
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{assemble, Instruction};

  use Instruction::{Immediate, Register};
  use Opcode::*;

  fn machine(instructions: &[Instruction]) -> UVM {
    UVM::with_io(
      assemble(instructions),
      Box::new(io::empty()),
      Box::new(io::sink()),
    )
  }

  #[test]
  fn pc_advances_once_per_instruction() {
    let mut vm = machine(&[
      Immediate { a: 0, value: 1 },
      Immediate { a: 1, value: 2 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();

    // Two advances; `Halt` does not advance past itself.
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.registers()[0], 1);
    assert_eq!(vm.registers()[1], 2);
  }

  #[test]
  fn conditional_move_ignores_a_zero_condition() {
    let mut vm = machine(&[
      Immediate { a: 1, value: 77 },
      // r2 is 0, so r0 keeps its value.
      Register { opcode: ConditionalMove, a: 0, b: 1, c: 2 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[0], 0);
  }

  #[test]
  fn conditional_move_fires_on_a_nonzero_condition() {
    let mut vm = machine(&[
      Immediate { a: 1, value: 77 },
      Immediate { a: 2, value: 1 },
      Register { opcode: ConditionalMove, a: 0, b: 1, c: 2 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[0], 77);
  }

  #[test]
  fn addition_wraps_at_two_to_the_32() {
    let mut vm = machine(&[
      // r1 <- 0xFFFFFFFF, r2 <- 1, r3 <- r1 + r2
      Register { opcode: BitwiseNand, a: 1, b: 0, c: 0 },
      Immediate { a: 2, value: 1 },
      Register { opcode: Addition, a: 3, b: 1, c: 2 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[3], 0);
  }

  #[test]
  fn multiplication_wraps_at_two_to_the_32() {
    let mut vm = machine(&[
      // r3 <- 2^31 built as 2^24 * 2^7, then r5 <- r3 * 2
      Immediate { a: 1, value: 1 << 24 },
      Immediate { a: 2, value: 1 << 7 },
      Register { opcode: Multiplication, a: 3, b: 1, c: 2 },
      Immediate { a: 4, value: 2 },
      Register { opcode: Multiplication, a: 5, b: 3, c: 4 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[3], 1 << 31);
    assert_eq!(vm.registers()[5], 0);
  }

  #[test]
  fn nand_of_zeros_is_all_ones() {
    let mut vm = machine(&[
      Register { opcode: BitwiseNand, a: 1, b: 0, c: 0 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[1], Word::MAX);
  }

  #[test]
  fn division_truncates() {
    let mut vm = machine(&[
      Immediate { a: 1, value: 7 },
      Immediate { a: 2, value: 2 },
      Register { opcode: Division, a: 3, b: 1, c: 2 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[3], 3);
  }

  #[test]
  fn division_by_zero_faults() {
    let mut vm = machine(&[
      Immediate { a: 1, value: 5 },
      Register { opcode: Division, a: 3, b: 1, c: 0 },
    ]);
    assert!(matches!(vm.run(), Err(UmError::DivisionByZero { pc: 1 })));
  }

  #[test]
  fn oversized_output_faults() {
    let mut vm = machine(&[
      Register { opcode: BitwiseNand, a: 1, b: 0, c: 0 },
      Register { opcode: Output, a: 0, b: 0, c: 1 },
    ]);
    assert!(matches!(vm.run(), Err(UmError::OutputRange(value)) if value == Word::MAX));
  }

  #[test]
  fn input_at_end_of_stream_delivers_the_sentinel() {
    let mut vm = machine(&[
      Register { opcode: Input, a: 0, b: 0, c: 3 },
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[3], EOF_SENTINEL);
  }

  #[test]
  fn load_program_with_zero_source_is_a_jump() {
    let mut vm = machine(&[
      Immediate { a: 1, value: 3 },
      // r0 is 0: no duplication, just a jump to r1.
      Register { opcode: LoadProgram, a: 0, b: 0, c: 1 },
      Immediate { a: 7, value: 9 }, // skipped
      Register { opcode: Halt, a: 0, b: 0, c: 0 },
    ]);
    vm.run().unwrap();
    assert_eq!(vm.registers()[7], 0);
    assert_eq!(vm.pc(), 3);
  }

  #[test]
  fn running_off_the_end_of_the_program_faults() {
    let mut vm = machine(&[Immediate { a: 0, value: 1 }]);
    assert!(matches!(vm.run(), Err(UmError::ProgramCounterRange(1))));
  }

  #[test]
  fn empty_program_faults_immediately() {
    let mut vm = machine(&[]);
    assert!(matches!(vm.run(), Err(UmError::ProgramCounterRange(0))));
  }

  #[test]
  fn word_without_an_opcode_faults() {
    let mut vm = UVM::with_io(
      vec![0xF000_0000],
      Box::new(io::empty()),
      Box::new(io::sink()),
    );
    assert!(matches!(vm.run(), Err(UmError::BadOpcode { pc: 0, .. })));
  }

  #[test]
  fn display_renders_the_machine_state() {
    let vm = machine(&[Register { opcode: Halt, a: 0, b: 0, c: 0 }]);
    let rendered = format!("{}", vm);
    assert!(rendered.contains("PC: 0"));
    assert!(rendered.contains("Registers"));
    assert!(rendered.contains("Segments"));
  }
}
