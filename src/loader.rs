/*!

  Deserialization of program images. A program image is a bare sequence of
  32-bit words stored most significant byte first, nothing else: no header,
  no footer, no alignment padding. The decoded words become segment 0 of a
  fresh machine, so the only thing that can be wrong with an image is a
  length that is not a multiple of four bytes.

*/

use nom::multi::many0;
use nom::number::complete::be_u32;
use nom::IResult;

use crate::bytecode::Word;
use crate::error::UmError;
use crate::segments::Segment;

/// Big-endian words, as many as the input holds.
fn words(input: &[u8]) -> IResult<&[u8], Vec<Word>> {
  many0(be_u32)(input)
}

/**
  Decodes a program image into the segment that will become segment 0.
  A trailing partial word means the image is malformed, and the whole image
  is rejected rather than truncated.
*/
pub fn decode_program(bytes: &[u8]) -> Result<Segment, UmError> {
  match words(bytes) {
    Ok((rest, program)) if rest.is_empty() => Ok(program),
    _                                      => Err(UmError::TruncatedProgram { len: bytes.len() })
  }
}

/// Serializes a segment back into image form. The inverse of `decode_program`.
pub fn encode_program(words: &[Word]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(words.len() * 4);
  for word in words {
    bytes.extend_from_slice(&word.to_be_bytes());
  }
  bytes
}
