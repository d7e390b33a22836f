//! DICOM Part-10 file reading and writing.
//!
//! Files are written as preamble + `DICM` + file meta group + data set in
//! Explicit VR Little Endian. Reading accepts only that transfer syntax;
//! sequences and items may use defined or undefined lengths.

use std::path::Path;

use crate::dataset::{Dataset, Element, Tag, Value, Vr};
use crate::dictionary::{generate_uid, tags, uids};
use crate::error::{CoreError, Result};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const MAX_NESTING: usize = 32;

/// File meta information (group 0002) of a Part-10 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub media_storage_sop_class_uid: String,
    pub media_storage_sop_instance_uid: String,
    pub transfer_syntax_uid: String,
    pub implementation_class_uid: String,
    pub implementation_version_name: Option<String>,
}

impl FileMeta {
    /// Meta information describing `dataset` as written by this crate.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let non_empty = |tag| dataset.get_str(tag).filter(|s| !s.is_empty());
        Self {
            media_storage_sop_class_uid: non_empty(tags::SOP_CLASS_UID)
                .unwrap_or_else(|| uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND.to_string()),
            media_storage_sop_instance_uid: non_empty(tags::SOP_INSTANCE_UID)
                .unwrap_or_else(generate_uid),
            transfer_syntax_uid: uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
            implementation_class_uid: uids::IMPLEMENTATION_CLASS_UID.to_string(),
            implementation_version_name: Some(uids::IMPLEMENTATION_VERSION_NAME.to_string()),
        }
    }

    fn from_elements(meta: &Dataset) -> Result<Self> {
        let transfer_syntax_uid = meta
            .get_str(tags::TRANSFER_SYNTAX_UID)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::invalid_part10("file meta has no transfer syntax"))?;
        Ok(Self {
            media_storage_sop_class_uid: meta
                .get_str(tags::MEDIA_STORAGE_SOP_CLASS_UID)
                .unwrap_or_default(),
            media_storage_sop_instance_uid: meta
                .get_str(tags::MEDIA_STORAGE_SOP_INSTANCE_UID)
                .unwrap_or_default(),
            transfer_syntax_uid,
            implementation_class_uid: meta
                .get_str(tags::IMPLEMENTATION_CLASS_UID)
                .unwrap_or_default(),
            implementation_version_name: meta.get_str(tags::IMPLEMENTATION_VERSION_NAME),
        })
    }

    fn to_elements(&self) -> Result<Dataset> {
        let mut meta = Dataset::new();
        meta.insert(
            tags::FILE_META_INFORMATION_VERSION,
            Element::bytes(Vr::OB, vec![0x00, 0x01]),
        );
        meta.put_str(
            tags::MEDIA_STORAGE_SOP_CLASS_UID,
            Vr::UI,
            &self.media_storage_sop_class_uid,
        )?;
        meta.put_str(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            Vr::UI,
            &self.media_storage_sop_instance_uid,
        )?;
        meta.put_str(tags::TRANSFER_SYNTAX_UID, Vr::UI, &self.transfer_syntax_uid)?;
        meta.put_str(
            tags::IMPLEMENTATION_CLASS_UID,
            Vr::UI,
            &self.implementation_class_uid,
        )?;
        if let Some(name) = &self.implementation_version_name {
            meta.put_str(tags::IMPLEMENTATION_VERSION_NAME, Vr::SH, name)?;
        }
        Ok(meta)
    }
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Dataset> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

pub fn read_file_with_meta(path: impl AsRef<Path>) -> Result<(FileMeta, Dataset)> {
    let bytes = std::fs::read(path)?;
    decode_with_meta(&bytes)
}

pub fn write_file(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let bytes = encode(dataset)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn decode(bytes: &[u8]) -> Result<Dataset> {
    decode_with_meta(bytes).map(|(_, dataset)| dataset)
}

pub fn decode_with_meta(bytes: &[u8]) -> Result<(FileMeta, Dataset)> {
    if bytes.len() < PREAMBLE_LEN + MAGIC.len() {
        return Err(CoreError::invalid_part10("file too short for preamble"));
    }
    if &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] != MAGIC {
        return Err(CoreError::invalid_part10("missing DICM magic"));
    }

    let mut reader = Reader::new(&bytes[PREAMBLE_LEN + MAGIC.len()..]);
    let mut meta_elements = Dataset::new();
    while !reader.is_empty() && reader.peek_tag()?.is_file_meta() {
        let (tag, element) = read_element(&mut reader, 0)?;
        meta_elements.insert(tag, element);
    }

    let meta = FileMeta::from_elements(&meta_elements)?;
    if meta.transfer_syntax_uid != uids::EXPLICIT_VR_LITTLE_ENDIAN {
        return Err(CoreError::unsupported_transfer_syntax(
            meta.transfer_syntax_uid,
        ));
    }

    let dataset = read_dataset(&mut reader, false, 0)?;
    Ok((meta, dataset))
}

pub fn encode(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut meta_body = Vec::new();
    for (tag, element) in FileMeta::for_dataset(dataset).to_elements()?.iter() {
        write_element(&mut meta_body, *tag, element)?;
    }

    let mut out = vec![0u8; PREAMBLE_LEN];
    out.extend_from_slice(MAGIC);
    let group_length = u32::try_from(meta_body.len())
        .map_err(|_| CoreError::invalid_value(tags::FILE_META_INFORMATION_GROUP_LENGTH, "too long"))?;
    write_element(
        &mut out,
        tags::FILE_META_INFORMATION_GROUP_LENGTH,
        &Element::bytes(Vr::UL, group_length.to_le_bytes().to_vec()),
    )?;
    out.extend_from_slice(&meta_body);

    write_dataset(&mut out, dataset)?;
    Ok(out)
}

fn write_dataset(out: &mut Vec<u8>, dataset: &Dataset) -> Result<()> {
    for (tag, element) in dataset.iter() {
        if tag.is_file_meta() {
            continue;
        }
        write_element(out, *tag, element)?;
    }
    Ok(())
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.group().to_le_bytes());
    out.extend_from_slice(&tag.element().to_le_bytes());
}

fn write_element(out: &mut Vec<u8>, tag: Tag, element: &Element) -> Result<()> {
    let vr = element.vr;
    write_tag(out, tag);
    out.extend_from_slice(vr.as_str().as_bytes());

    match &element.value {
        Value::Bytes(_) if vr == Vr::SQ => {
            return Err(CoreError::invalid_value(tag, "SQ element holds raw bytes"));
        }
        Value::Sequence(_) if vr != Vr::SQ => {
            return Err(CoreError::invalid_value(tag, format!("{vr} element holds items")));
        }
        Value::Bytes(bytes) => {
            let padded = bytes.len() + bytes.len() % 2;
            if vr.has_long_length() {
                let length = u32::try_from(padded)
                    .ok()
                    .filter(|len| *len != UNDEFINED_LENGTH)
                    .ok_or_else(|| CoreError::invalid_value(tag, "value too long"))?;
                out.extend_from_slice(&[0, 0]);
                out.extend_from_slice(&length.to_le_bytes());
            } else {
                let length = u16::try_from(padded).map_err(|_| {
                    CoreError::invalid_value(tag, format!("value too long for {vr}"))
                })?;
                out.extend_from_slice(&length.to_le_bytes());
            }
            out.extend_from_slice(bytes);
            if bytes.len() % 2 == 1 {
                out.push(vr.padding());
            }
        }
        Value::Sequence(items) => {
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
            for item in items {
                write_tag(out, tags::ITEM);
                out.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
                write_dataset(out, item)?;
                write_tag(out, tags::ITEM_DELIMITATION_ITEM);
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            write_tag(out, tags::SEQUENCE_DELIMITATION_ITEM);
            out.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                CoreError::invalid_part10(format!(
                    "truncated: need {len} bytes at offset {}",
                    self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn tag(&mut self) -> Result<Tag> {
        Ok(Tag(self.u16()?, self.u16()?))
    }

    fn peek_tag(&self) -> Result<Tag> {
        let mut probe = Reader {
            buf: self.buf,
            pos: self.pos,
        };
        probe.tag()
    }
}

fn read_dataset(reader: &mut Reader<'_>, until_delimiter: bool, depth: usize) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    loop {
        if reader.is_empty() {
            if until_delimiter {
                return Err(CoreError::invalid_part10("item without delimitation"));
            }
            return Ok(dataset);
        }
        if reader.peek_tag()? == tags::ITEM_DELIMITATION_ITEM {
            if !until_delimiter {
                return Err(CoreError::invalid_part10("unexpected item delimitation"));
            }
            reader.tag()?;
            reader.u32()?;
            return Ok(dataset);
        }
        let (tag, element) = read_element(reader, depth)?;
        dataset.insert(tag, element);
    }
}

fn read_element(reader: &mut Reader<'_>, depth: usize) -> Result<(Tag, Element)> {
    let tag = reader.tag()?;
    if tag.group() == 0xFFFE {
        return Err(CoreError::invalid_part10(format!(
            "unexpected delimiter {tag}"
        )));
    }
    let code = reader.take(2)?;
    let vr = Vr::from_bytes([code[0], code[1]])?;
    let length = if vr.has_long_length() {
        reader.take(2)?;
        reader.u32()?
    } else {
        u32::from(reader.u16()?)
    };

    if vr == Vr::SQ {
        let items = read_sequence(reader, length, depth + 1)?;
        return Ok((tag, Element::sequence(items)));
    }
    if length == UNDEFINED_LENGTH {
        return Err(CoreError::invalid_part10(format!(
            "undefined length on {vr} element {tag}"
        )));
    }

    let bytes = reader.take(length as usize)?.to_vec();
    Ok((
        tag,
        Element {
            vr,
            value: Value::Bytes(bytes),
        },
    ))
}

fn read_sequence(reader: &mut Reader<'_>, length: u32, depth: usize) -> Result<Vec<Dataset>> {
    if depth > MAX_NESTING {
        return Err(CoreError::invalid_part10("sequences nested too deeply"));
    }

    let mut items = Vec::new();
    if length == UNDEFINED_LENGTH {
        loop {
            let tag = reader.tag()?;
            let item_length = reader.u32()?;
            match tag {
                tags::SEQUENCE_DELIMITATION_ITEM => return Ok(items),
                tags::ITEM => items.push(read_item(reader, item_length, depth)?),
                other => {
                    return Err(CoreError::invalid_part10(format!(
                        "expected item in sequence, found {other}"
                    )));
                }
            }
        }
    }

    let mut body = Reader::new(reader.take(length as usize)?);
    while !body.is_empty() {
        let tag = body.tag()?;
        let item_length = body.u32()?;
        if tag != tags::ITEM {
            return Err(CoreError::invalid_part10(format!(
                "expected item in sequence, found {tag}"
            )));
        }
        items.push(read_item(&mut body, item_length, depth)?);
    }
    Ok(items)
}

fn read_item(reader: &mut Reader<'_>, length: u32, depth: usize) -> Result<Dataset> {
    if length == UNDEFINED_LENGTH {
        return read_dataset(reader, true, depth);
    }
    let mut body = Reader::new(reader.take(length as usize)?);
    read_dataset(&mut body, false, depth)
}
