//! 帧编解码
//!
//! 流式传输只保证字节有序，不保证一次读取恰好是一条消息，因此在协议层显式分帧:
//! ```text
//! ┌──────────────────────────────┬───────────┐
//! │     Payload (UTF-8 文本)      │  '\n'     │
//! │   最长 MAX_FRAME_SIZE 字节    │  分隔符    │
//! └──────────────────────────────┴───────────┘
//! ```
//! 分隔符前的 `'\r'` 会被去掉，兼容 CRLF 客户端。长度上限只约束入站帧。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::{FRAME_DELIMITER, MAX_FRAME_SIZE};

/// 单次读取的块大小
const READ_CHUNK: usize = 1024;

/// 帧读取器
///
/// 内部缓冲不完整的读取，一次读取中携带的多帧会在后续调用中依次返回。
pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
    /// 缓冲区中已确认不含分隔符的前缀长度
    scanned: usize,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// 创建新的帧读取器，单帧上限为 [`MAX_FRAME_SIZE`]
    pub fn new(reader: R) -> Self {
        Self::with_max_frame(reader, MAX_FRAME_SIZE)
    }

    /// 指定单帧上限
    ///
    /// 客户端读取服务端拼装的帧时需要比入站上限更宽的限制。
    pub fn with_max_frame(reader: R, max_frame: usize) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
            max_frame,
        }
    }

    /// 读取一帧
    ///
    /// 对端关闭写端且缓冲区为空时返回 [`ProtocolError::ConnectionClosed`]；
    /// 若关闭时仍有未带分隔符的尾部数据，先将其作为最后一帧返回。
    pub async fn read_frame(&mut self) -> Result<String> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                debug!("Peer closed with {} undelimited bytes", self.buffer.len());
                let tail = std::mem::take(&mut self.buffer);
                self.scanned = 0;
                return Ok(decode(&tail));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// 从缓冲区切出一条完整帧
    fn take_frame(&mut self) -> Result<Option<String>> {
        let pending = &self.buffer[self.scanned..];
        match pending.iter().position(|b| *b == FRAME_DELIMITER) {
            Some(offset) => {
                let end = self.scanned + offset;
                if end > self.max_frame {
                    debug!("Frame of {} bytes exceeds {}", end, self.max_frame);
                    return Err(ProtocolError::FrameTooLarge {
                        max: self.max_frame,
                    });
                }
                let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                self.scanned = 0;
                Ok(Some(decode(&raw[..end])))
            }
            None => {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_frame {
                    debug!(
                        "{} bytes buffered without delimiter, limit {}",
                        self.buffer.len(),
                        self.max_frame
                    );
                    return Err(ProtocolError::FrameTooLarge {
                        max: self.max_frame,
                    });
                }
                Ok(None)
            }
        }
    }
}

/// 按 UTF-8 解码（非法字节替换），并去掉行尾的 '\r'
fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一帧（自动追加分隔符）
    ///
    /// 出站帧由服务端拼装（前缀 + 消息体），不受 [`MAX_FRAME_SIZE`] 限制。
    pub async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(&[FRAME_DELIMITER]).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// 写入提示文本，不追加分隔符
    pub async fn write_prompt(&mut self, prompt: &str) -> Result<()> {
        self.writer.write_all(prompt.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
