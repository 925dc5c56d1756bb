use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::codec;
use crate::signal::{Signal, MAX_SECTIONS, MAX_SIGNAL_WORDS};

/////////////////////////////////////
/// 远程传输: 把signal帧写入/读出一条连接。
///
/// 本地传输是指针交接(直接入队), 不经过这里。
/// 帧格式见 codec。
/////////////////////////////////////
pub struct RemoteLink;

impl RemoteLink {
    /// 把signal序列化后写入连接
    pub fn send<W: Write>(writer: &mut W, signal: &Signal) -> XResult<()> {
        let frame = codec::encode(signal)?;
        writer.write_all(&frame)?;
        Ok(())
    }

    /// 从连接读取一个完整帧。
    /// 流起始处的干净EOF返回None; 帧中途断开算损坏。
    pub fn recv<R: Read>(reader: &mut R) -> XResult<Option<Signal>> {
        let mut header = [0u8; codec::FRAME_HEADER_LEN];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let word_length = header[10] as usize;
        let section_count = header[11] as usize;
        if word_length > MAX_SIGNAL_WORDS {
            return Err(XtError::Error(format!("frame word length {} exceeds {}.", word_length, MAX_SIGNAL_WORDS)));
        }
        if section_count > MAX_SECTIONS {
            return Err(XtError::Error(format!("frame section count {} exceeds {}.", section_count, MAX_SECTIONS)));
        }

        let mut frame: Vec<u8> = header.to_vec();
        let mut words = vec![0u8; word_length * 4];
        reader.read_exact(&mut words)?;
        frame.extend_from_slice(&words);

        for _ in 0..section_count {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let len_words = (&len_buf[..]).read_u32::<LittleEndian>()?;
            frame.extend_from_slice(&len_buf);
            let mut body = vec![0u8; len_words as usize * 4];
            reader.read_exact(&mut body)?;
            frame.extend_from_slice(&body);
        }

        let (signal, _used) = codec::decode(&frame)?;
        Ok(Some(signal))
    }
}
