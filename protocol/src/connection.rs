//! 连接封装
//!
//! 将传输层和换行分帧封装在一起，按行收发文本。

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::Result;
use crate::transport::Transport;

/// 按行收发的连接
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    pub fn split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }

    /// 接收一行
    pub async fn recv(&mut self) -> Result<String> {
        self.reader.read_frame().await
    }

    /// 发送一行
    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_frame(line).await
    }

    /// 发送不带分隔符的提示
    pub async fn prompt(&mut self, text: &str) -> Result<()> {
        self.writer.write_prompt(text).await
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}
