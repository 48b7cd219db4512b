/*!

  An interpreter for the Universal Machine: a 32-bit, word-addressable
  register machine with eight registers, a dynamically mapped segmented
  memory, and a fourteen-opcode instruction set. A program is a flat image of
  big-endian words that becomes segment 0 of a fresh machine; execution is a
  single synchronous fetch-decode-dispatch loop over segment 0 that ends at a
  `Halt` instruction or at the first runtime fault.

  The crate splits along the machine's own seams:

    - [`bytecode`]  The instruction word format: opcodes, operand fields,
                    encoding and decoding.
    - [`segments`]  The segment table, with its map/unmap protocol and
                    identifier recycling.
    - [`loader`]    (De)serialization of program images.
    - [`uvm`]       The machine itself and its execution loop.
    - [`error`]     Load-time errors and runtime faults.

*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod bytecode;
pub mod error;
pub mod loader;
pub mod segments;
pub mod uvm;

pub use crate::error::UmError;
pub use crate::uvm::UVM;
