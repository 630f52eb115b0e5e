//! 命令语法
//!
//! ```text
//! /priv <name> <text…>   私聊
//! /salir                 退出
//! <任意非空文本>           广播
//! ```

use crate::{PRIVATE_COMMAND, QUIT_COMMAND};

/// 客户端发来的一行文本解析后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 空行，忽略
    Empty,
    /// 广播给其他所有人
    Broadcast { body: String },
    /// 私聊给指定用户
    Private { target: String, body: String },
    /// 请求断开
    Quit,
    /// `/priv` 缺少目标或正文
    Malformed,
}

impl Command {
    /// 解析一行文本（首尾空白会被去掉）
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if line == QUIT_COMMAND {
            return Command::Quit;
        }

        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(PRIVATE_COMMAND) {
            return Command::Broadcast {
                body: line.to_string(),
            };
        }

        let Some(target) = tokens.next() else {
            return Command::Malformed;
        };
        let body = tokens.collect::<Vec<_>>().join(" ");
        if body.is_empty() {
            return Command::Malformed;
        }

        Command::Private {
            target: target.to_string(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broadcast() {
        assert_eq!(
            Command::parse("  hola a todos \r\n"),
            Command::Broadcast {
                body: "hola a todos".to_string()
            }
        );
    }

    #[test]
    fn test_parse_private_joins_tokens() {
        assert_eq!(
            Command::parse("/priv bob  que   tal"),
            Command::Private {
                target: "bob".to_string(),
                body: "que tal".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_private_missing_parts() {
        assert_eq!(Command::parse("/priv"), Command::Malformed);
        assert_eq!(Command::parse("/priv bob"), Command::Malformed);
        assert_eq!(Command::parse("/priv bob   "), Command::Malformed);
    }

    #[test]
    fn test_priv_prefix_must_be_whole_token() {
        assert_eq!(
            Command::parse("/private bob hi"),
            Command::Broadcast {
                body: "/private bob hi".to_string()
            }
        );
    }

    #[test]
    fn test_parse_quit_and_empty() {
        assert_eq!(Command::parse("/salir"), Command::Quit);
        assert_eq!(Command::parse(" /salir\n"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
        // 只有整行等于 /salir 才退出
        assert!(matches!(
            Command::parse("/salir ahora"),
            Command::Broadcast { .. }
        ));
    }
}
