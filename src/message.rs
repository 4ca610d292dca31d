//! A from-scratch reader over the Cap'n Proto wire format
//! (<https://capnproto.org/encoding.html>), scoped to exactly what default-
//! and const-value comparison needs: locating a pointer's target words
//! inside a message's segments without decoding them into heap structures.
//!
//! This has no dependency on any third-party Cap'n Proto crate. It mirrors,
//! at the word level, the same kind of leaf-level bit/byte cursor a
//! bitstream-format reader would use, just addressing 64-bit words instead
//! of bytes.

use std::fmt;
use std::sync::Arc;

use num_enum::TryFromPrimitive;

/// Errors produced while walking a [`Message`]'s pointer graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    SegmentOutOfRange(u32),
    WordOutOfRange { segment: u32, offset: u32 },
    /// A far pointer was encountered. Per the data model, the schema loader
    /// is expected to have already flattened these; seeing one here means
    /// the message was not canonicalized the way this crate requires.
    FarPointer,
    UnknownPointerKind(u8),
    UnknownElementSize(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentOutOfRange(id) => write!(f, "segment {id} out of range"),
            Self::WordOutOfRange { segment, offset } => {
                write!(f, "word offset {offset} out of range in segment {segment}")
            }
            Self::FarPointer => write!(f, "unresolved far pointer in value payload"),
            Self::UnknownPointerKind(tag) => write!(f, "unknown pointer kind tag {tag}"),
            Self::UnknownElementSize(tag) => write!(f, "unknown list element size tag {tag}"),
        }
    }
}

impl std::error::Error for Error {}

/// An owned Cap'n Proto message: a sequence of 64-bit-word segments, the
/// same shape a `CodeGeneratorRequest` arrives in once the schema loader has
/// decoded it.
#[derive(Debug, Clone)]
pub struct Message {
    segments: Vec<Box<[u64]>>,
}

impl Message {
    #[must_use]
    pub fn new(segments: Vec<Box<[u64]>>) -> Self {
        Self { segments }
    }

    /// A single-segment message holding nothing but a null pointer word.
    /// Used as the backing store for defaults that carry no payload.
    #[must_use]
    pub fn null() -> Arc<Self> {
        Arc::new(Self {
            segments: vec![Box::from([0u64].as_slice())],
        })
    }

    fn segment(&self, id: u32) -> Result<&[u64], Error> {
        self.segments
            .get(id as usize)
            .map(Box::as_ref)
            .ok_or(Error::SegmentOutOfRange(id))
    }

    fn word(&self, segment: u32, offset: u32) -> Result<u64, Error> {
        self.segment(segment)?
            .get(offset as usize)
            .copied()
            .ok_or(Error::WordOutOfRange { segment, offset })
    }
}

fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as i64
}

/// Location of a pointer word inside a [`Message`]. This is what `Value`'s
/// pointer-typed variants carry instead of a decoded Rust value.
#[derive(Debug, Clone)]
pub struct PointerRef {
    message: Arc<Message>,
    segment: u32,
    offset: u32,
}

impl PointerRef {
    #[must_use]
    pub fn new(message: Arc<Message>, segment: u32, offset: u32) -> Self {
        Self {
            message,
            segment,
            offset,
        }
    }

    /// A pointer that always resolves to [`Content::Null`].
    #[must_use]
    pub fn null() -> Self {
        Self::new(Message::null(), 0, 0)
    }

    fn word(&self) -> Result<u64, Error> {
        self.message.word(self.segment, self.offset)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.word(), Ok(0))
    }

    /// Decode the pointer word and locate its target.
    pub fn resolve(&self) -> Result<Content, Error> {
        let word = self.word()?;
        if word == 0 {
            return Ok(Content::Null);
        }
        match word & 0x3 {
            0 => {
                let offset_words = sign_extend(((word >> 2) & 0x3FFF_FFFF) as u32, 30);
                let data_words = ((word >> 32) & 0xFFFF) as u16;
                let pointer_words = ((word >> 48) & 0xFFFF) as u16;
                let data_offset = (self.offset as i64 + 1 + offset_words) as u32;
                Ok(Content::Struct(StructReader {
                    message: self.message.clone(),
                    segment: self.segment,
                    data_offset,
                    data_words,
                    pointer_offset: data_offset + data_words as u32,
                    pointer_words,
                }))
            }
            1 => {
                let offset_words = sign_extend(((word >> 2) & 0x3FFF_FFFF) as u32, 30);
                let size_tag = ((word >> 32) & 0x7) as u8;
                let length = ((word >> 35) & 0x1FFF_FFFF) as u32;
                let element_size =
                    ElementSize::try_from(size_tag).map_err(|_| Error::UnknownElementSize(size_tag))?;
                let target = (self.offset as i64 + 1 + offset_words) as u32;
                Ok(Content::List(ListReader::new(
                    self.message.clone(),
                    self.segment,
                    element_size,
                    target,
                    length,
                )?))
            }
            2 => Err(Error::FarPointer),
            3 => {
                let tag = (word >> 2) & 0x3FFF_FFFF;
                if tag == 0 {
                    Ok(Content::Capability((word >> 32) as u32))
                } else {
                    Err(Error::UnknownPointerKind(3))
                }
            }
            _ => unreachable!("mask is 2 bits"),
        }
    }
}

/// What a pointer word resolves to.
#[derive(Debug, Clone)]
pub enum Content {
    Null,
    Struct(StructReader),
    List(ListReader),
    Capability(u32),
}

/// A struct's data and pointer section, located but not copied out of its
/// segment.
#[derive(Debug, Clone)]
pub struct StructReader {
    message: Arc<Message>,
    segment: u32,
    data_offset: u32,
    data_words: u16,
    pointer_offset: u32,
    pointer_words: u16,
}

impl StructReader {
    #[must_use]
    pub fn data_word_count(&self) -> u16 {
        self.data_words
    }

    #[must_use]
    pub fn pointer_word_count(&self) -> u16 {
        self.pointer_words
    }

    /// Reads logical data word `i`. Cap'n Proto's struct-upgrade semantics
    /// mean any index at or past the declared word count reads as zero,
    /// rather than erroring - this lets callers compare two structs of
    /// different declared size by iterating `0..max(a, b)`.
    pub fn data_word(&self, i: u16) -> Result<u64, Error> {
        if i >= self.data_words {
            return Ok(0);
        }
        self.message.word(self.segment, self.data_offset + i as u32)
    }

    /// Reads logical pointer word `i`. Past the declared pointer count this
    /// returns a pointer that resolves to [`Content::Null`], for the same
    /// upgrade-compatible reason as [`Self::data_word`].
    pub fn pointer_word(&self, i: u16) -> PointerRef {
        if i >= self.pointer_words {
            return PointerRef::null();
        }
        PointerRef::new(self.message.clone(), self.segment, self.pointer_offset + i as u32)
    }

    /// Whether every data word and every pointer word is a default (zero
    /// word / default pointer). Used to treat "no struct" and "all-zero
    /// struct" as the same default value.
    pub fn is_all_default(&self) -> Result<bool, Error> {
        for i in 0..self.data_words {
            if self.data_word(i)? != 0 {
                return Ok(false);
            }
        }
        for i in 0..self.pointer_words {
            if !is_default_pointer(&self.pointer_word(i))? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether a pointer is null, or points at content indistinguishable from
/// absent (an all-zero struct, or an empty list).
pub fn is_default_pointer(ptr: &PointerRef) -> Result<bool, Error> {
    match ptr.resolve()? {
        Content::Null => Ok(true),
        Content::Struct(s) => s.is_all_default(),
        Content::List(l) => Ok(l.len() == 0),
        Content::Capability(_) => Ok(false),
    }
}

/// Tag carried by a list pointer, naming the representation of its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

/// A list's elements, located but not copied out of their segment.
#[derive(Debug, Clone)]
pub struct ListReader {
    message: Arc<Message>,
    segment: u32,
    element_size: ElementSize,
    /// Word offset of element 0 (for `InlineComposite`, one word past the tag).
    start_word: u32,
    length: u32,
    data_words_per_element: u16,
    pointer_words_per_element: u16,
}

impl ListReader {
    fn new(
        message: Arc<Message>,
        segment: u32,
        element_size: ElementSize,
        target_offset: u32,
        raw_length: u32,
    ) -> Result<Self, Error> {
        if element_size == ElementSize::InlineComposite {
            let tag = message.word(segment, target_offset)?;
            if tag & 0x3 != 0 {
                return Err(Error::UnknownPointerKind((tag & 0x3) as u8));
            }
            let element_count = ((tag >> 2) & 0x3FFF_FFFF) as u32;
            let data_words_per_element = ((tag >> 32) & 0xFFFF) as u16;
            let pointer_words_per_element = ((tag >> 48) & 0xFFFF) as u16;
            Ok(Self {
                message,
                segment,
                element_size,
                start_word: target_offset + 1,
                length: element_count,
                data_words_per_element,
                pointer_words_per_element,
            })
        } else {
            Ok(Self {
                message,
                segment,
                element_size,
                start_word: target_offset,
                length: raw_length,
                data_words_per_element: 0,
                pointer_words_per_element: 0,
            })
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub fn element_size(&self) -> ElementSize {
        self.element_size
    }

    fn check_index(&self, i: u32) -> Result<(), Error> {
        if i >= self.length {
            Err(Error::WordOutOfRange {
                segment: self.segment,
                offset: self.start_word + i,
            })
        } else {
            Ok(())
        }
    }

    pub fn bit(&self, i: u32) -> Result<bool, Error> {
        self.check_index(i)?;
        let bit_index = i as u64;
        let word = self
            .message
            .word(self.segment, self.start_word + (bit_index / 64) as u32)?;
        Ok((word >> (bit_index % 64)) & 1 != 0)
    }

    pub fn byte(&self, i: u32) -> Result<u8, Error> {
        self.check_index(i)?;
        let word = self.message.word(self.segment, self.start_word + i / 8)?;
        Ok(((word >> ((i % 8) * 8)) & 0xFF) as u8)
    }

    pub fn u16_element(&self, i: u32) -> Result<u16, Error> {
        self.check_index(i)?;
        let word = self.message.word(self.segment, self.start_word + i / 4)?;
        Ok(((word >> ((i % 4) * 16)) & 0xFFFF) as u16)
    }

    pub fn u32_element(&self, i: u32) -> Result<u32, Error> {
        self.check_index(i)?;
        let word = self.message.word(self.segment, self.start_word + i / 2)?;
        Ok(((word >> ((i % 2) * 32)) & 0xFFFF_FFFF) as u32)
    }

    pub fn u64_element(&self, i: u32) -> Result<u64, Error> {
        self.check_index(i)?;
        self.message.word(self.segment, self.start_word + i)
    }

    pub fn pointer(&self, i: u32) -> Result<PointerRef, Error> {
        self.check_index(i)?;
        Ok(PointerRef::new(
            self.message.clone(),
            self.segment,
            self.start_word + i,
        ))
    }

    pub fn element_struct(&self, i: u32) -> Result<StructReader, Error> {
        self.check_index(i)?;
        let step = (self.data_words_per_element + self.pointer_words_per_element) as u32;
        let data_offset = self.start_word + i * step;
        Ok(StructReader {
            message: self.message.clone(),
            segment: self.segment,
            data_offset,
            data_words: self.data_words_per_element,
            pointer_offset: data_offset + self.data_words_per_element as u32,
            pointer_words: self.pointer_words_per_element,
        })
    }
}
