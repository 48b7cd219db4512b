/*!

  The segment table: the machine's memory manager. Segments are flat arrays
  of words named by 32-bit identifiers that running programs mint with
  `MapSegment` and release with `UnmapSegment`. The table is two structures:
  a dense spine, `segments`, indexed directly by identifier, and a LIFO stack
  of released identifiers, `free_ids`, waiting to be reissued.

  Allocation prefers the top of `free_ids`, so identifiers cluster near zero
  and the spine stays dense even when a program churns through map/unmap
  cycles. The stack also gives the recency guarantee programs can rely on:
  the next identifier mapped is the last one unmapped.

  Releasing an identifier does not release its segment. The stale segment
  sits in its slot until the identifier is reissued, at which point
  installing the replacement drops it. A program that reads through a
  released identifier before then sees the stale words; such a read is
  outside the machine's contract anyway, and deferring the drop keeps
  `UnmapSegment` a push onto a vector.

  Identifier 0 is the program segment. It is installed at construction,
  `free` refuses to release it, and `allocate` can never mint it, so the
  execution loop may fetch through it unconditionally.

*/

use crate::bytecode::Word;
use crate::error::UmError;

/// Segment identifiers are words so that they can live in registers.
pub type SegmentId = Word;

/// A segment is bare storage. Nothing distinguishes instructions from data
/// except whether the program counter ever reaches them.
pub type Segment = Vec<Word>;


pub struct SegmentTable {
  /// Identifier-indexed spine. A slot whose identifier is on `free_ids`
  /// still holds its last segment; see the module documentation.
  segments : Vec<Segment>,
  /// Released identifiers, most recently released on top.
  free_ids : Vec<SegmentId>,
}

impl SegmentTable {

  /// Builds a table whose segment 0 is `program`.
  pub fn new(program: Segment) -> SegmentTable {
    SegmentTable {
      segments : vec![program],
      free_ids : Vec::new(),
    }
  }

  /**
    Creates a zero-filled segment `length` words long and returns its
    identifier, reissuing the most recently released identifier when one is
    available. Installing over a reissued slot is what finally drops the
    segment that `free` left behind.
  */
  pub fn allocate(&mut self, length: Word) -> Result<SegmentId, UmError> {
    let segment = vec![0; length as usize];

    match self.free_ids.pop() {

      Some(id) => {
        self.segments[id as usize] = segment;
        Ok(id)
      }

      None => {
        // The spine only grows here, so its length is the next fresh
        // identifier. Identifier 0 was taken at construction.
        let id = self.segments.len();
        if id > SegmentId::MAX as usize {
          return Err(UmError::IdSpaceExhausted);
        }
        self.segments.push(segment);
        Ok(id as SegmentId)
      }

    }
  }

  /**
    Releases `id` for reuse. The segment itself is dropped later, when the
    identifier is reissued by `allocate`.

    Releasing the program segment or an identifier that was never issued is
    refused. Releasing an identifier twice is not detected; the machine's
    contract forbids it, and the table has no cheap way to notice.
  */
  pub fn free(&mut self, id: SegmentId) -> Result<(), UmError> {
    if id == 0 {
      return Err(UmError::UnmapProgramSegment);
    }
    if id as usize >= self.segments.len() {
      return Err(UmError::UnmappedSegment(id));
    }
    self.free_ids.push(id);
    Ok(())
  }

  /// Fetches the word at `offset` in segment `id`.
  #[inline]
  pub fn read(&self, id: SegmentId, offset: Word) -> Result<Word, UmError> {
    let segment = match self.segments.get(id as usize) {
      Some(segment) => segment,
      None          => { return Err(UmError::UnmappedSegment(id)); }
    };
    match segment.get(offset as usize) {
      Some(word) => Ok(*word),
      None       => Err(UmError::OffsetRange { id, offset, len: segment.len() })
    }
  }

  /// Stores `word` at `offset` in segment `id`.
  #[inline]
  pub fn write(&mut self, id: SegmentId, offset: Word, word: Word) -> Result<(), UmError> {
    let segment = match self.segments.get_mut(id as usize) {
      Some(segment) => segment,
      None          => { return Err(UmError::UnmappedSegment(id)); }
    };
    match segment.get_mut(offset as usize) {
      Some(slot) => {
        *slot = word;
        Ok(())
      }
      None => Err(UmError::OffsetRange { id, offset, len: segment.len() })
    }
  }

  /**
    Duplicates segment `id` over segment 0, dropping the program that was
    there. A segment cannot be loaded over itself, so `id == 0` does
    nothing. The duplicate is independent of its source: releasing `id`
    afterwards leaves segment 0 intact.
  */
  pub fn replace_zero(&mut self, id: SegmentId) -> Result<(), UmError> {
    if id == 0 {
      return Ok(());
    }
    let duplicate = match self.segments.get(id as usize) {
      Some(segment) => segment.clone(),
      None          => { return Err(UmError::UnmappedSegment(id)); }
    };
    self.segments[0] = duplicate;
    Ok(())
  }

  /// Borrows the segment stored at `id`.
  pub fn segment(&self, id: SegmentId) -> Result<&Segment, UmError> {
    match self.segments.get(id as usize) {
      Some(segment) => Ok(segment),
      None          => Err(UmError::UnmappedSegment(id))
    }
  }

  /// Number of slots in the spine, issued and released alike.
  pub fn slot_count(&self) -> usize {
    self.segments.len()
  }

  /// Number of identifiers waiting to be reissued.
  pub fn free_count(&self) -> usize {
    self.free_ids.len()
  }

  /// Whether `id` currently names a live segment.
  pub fn is_mapped(&self, id: SegmentId) -> bool {
    (id as usize) < self.segments.len() && !self.free_ids.contains(&id)
  }

}
