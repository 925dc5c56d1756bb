use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::{LongSection, Signal, MAX_SECTIONS, MAX_SIGNAL_WORDS};
use crate::signal_kind::SignalKind;

/////////////////////////////////////
/// 远程传输帧格式 (小端):
///
/// ```txt
/// |=================================|
/// | receiver block ref   u32        |
/// | sender block ref     u32        |
/// | signal id            u16        |
/// | word length          u8         | <= 25
/// | section count        u8         | <= 3
/// | trace id             u32        |
/// |---------------------------------|
/// | inline words         u32 * len  |
/// |---------------------------------|
/// | per section:                    |
/// |   length in words    u32        |
/// |   bytes (padded to 4)           |
/// |=================================|
/// ```
/////////////////////////////////////
pub const FRAME_HEADER_LEN: usize = 16;

/// 编码signal为线上帧
pub fn encode(signal: &Signal) -> XResult<Bytes> {
    let mut buf: Vec<u8> = Vec::with_capacity(FRAME_HEADER_LEN + signal.length() * 4);

    buf.write_u32::<LittleEndian>(signal.receiver().raw())?;
    buf.write_u32::<LittleEndian>(signal.sender().raw())?;
    buf.write_u16::<LittleEndian>(signal.kind().into())?;
    buf.write_u8(signal.length() as u8)?;
    buf.write_u8(signal.section_count() as u8)?;
    buf.write_u32::<LittleEndian>(signal.trace_id())?;

    for w in signal.words() {
        buf.write_u32::<LittleEndian>(*w)?;
    }

    for section in signal.sections() {
        buf.write_u32::<LittleEndian>(section.len_words())?;
        buf.extend_from_slice(section.data());
        // 字节补齐到4
        let pad = (4 - section.len() % 4) % 4;
        for _ in 0..pad {
            buf.write_u8(0)?;
        }
    }

    Ok(Bytes::from(buf))
}

/// 解码线上帧。 返回signal与消费的字节数。
///
/// 越界的字长/段数、截断的帧都会被拒绝。
pub fn decode(input: &[u8]) -> XResult<(Signal, usize)> {
    if input.len() < FRAME_HEADER_LEN {
        return Err(XtError::Error(format!("frame header truncated: {} bytes.", input.len())));
    }
    let mut cur = Cursor::new(input);

    let receiver = BlockRef::from_raw(cur.read_u32::<LittleEndian>()?);
    let sender = BlockRef::from_raw(cur.read_u32::<LittleEndian>()?);
    let raw_kind = cur.read_u16::<LittleEndian>()?;
    let word_length = cur.read_u8()? as usize;
    let section_count = cur.read_u8()? as usize;
    let trace_id = cur.read_u32::<LittleEndian>()?;

    let kind = SignalKind::try_from(raw_kind)
        .map_err(|_| XtError::Error(format!("unknown signal id {}.", raw_kind)))?;
    if word_length > MAX_SIGNAL_WORDS {
        return Err(XtError::Error(format!("frame word length {} exceeds {}.", word_length, MAX_SIGNAL_WORDS)));
    }
    if section_count > MAX_SECTIONS {
        return Err(XtError::Error(format!("frame section count {} exceeds {}.", section_count, MAX_SECTIONS)));
    }

    let mut need = FRAME_HEADER_LEN + word_length * 4;
    if input.len() < need {
        return Err(XtError::Error("frame inline words truncated.".to_string()));
    }

    let mut words = [0u32; MAX_SIGNAL_WORDS];
    for i in 0..word_length {
        words[i] = cur.read_u32::<LittleEndian>()?;
    }

    let mut signal = Signal::new(kind, sender, receiver, &words[..word_length])?;
    signal.set_trace_id(trace_id);

    for _ in 0..section_count {
        need += 4;
        if input.len() < need {
            return Err(XtError::Error("frame section header truncated.".to_string()));
        }
        let len_words = cur.read_u32::<LittleEndian>()? as usize;
        let len_bytes = len_words * 4;
        need += len_bytes;
        if input.len() < need {
            return Err(XtError::Error("frame section body truncated.".to_string()));
        }
        let start = cur.position() as usize;
        let section = LongSection::from_slice(&input[start..start + len_bytes]);
        cur.set_position((start + len_bytes) as u64);
        signal.attach_section(section)?;
    }

    Ok((signal, need))
}
