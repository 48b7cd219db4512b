/*!

  Everything that can go wrong, in one enum. The machine gives a running
  program no way to observe or recover from a failure: a malformed program
  image is rejected before execution starts, and a runtime fault abandons the
  execution loop. Either way the error propagates to the top of the
  interpreter, which reports it and exits non-zero.

*/

use thiserror::Error;

use crate::bytecode::Word;
use crate::segments::SegmentId;

#[derive(Debug, Error)]
pub enum UmError {

  // Load-time errors //

  #[error("program image is {len} bytes, not a whole number of 32-bit words")]
  TruncatedProgram { len: usize },

  // Runtime faults //

  #[error("division by zero at offset {pc}")]
  DivisionByZero { pc: Word },

  #[error("output value {0} does not fit in a byte")]
  OutputRange(Word),

  #[error("segment {0} is not mapped")]
  UnmappedSegment(SegmentId),

  #[error("offset {offset} is out of bounds for segment {id}, which holds {len} words")]
  OffsetRange {
    id     : SegmentId,
    offset : Word,
    len    : usize
  },

  #[error("program counter {0} ran off the end of the program segment")]
  ProgramCounterRange(Word),

  #[error("word 0x{word:0>8X} at offset {pc} has no opcode in its high nibble")]
  BadOpcode { word: Word, pc: Word },

  #[error("cannot unmap the program segment")]
  UnmapProgramSegment,

  #[error("segment identifier space is exhausted")]
  IdSpaceExhausted,

  // Host I/O //

  #[error(transparent)]
  Io(#[from] std::io::Error),

}
