//! 交互式终端的输入分类
//!
//! 读取的每一行归为四类之一：
//!
//! | 输入 | 结果 |
//! |------|------|
//! | `quit` / `exit` / `q`（不区分大小写） | [`Input::Quit`] |
//! | 空行 | [`Input::Empty`]，重新提示 |
//! | `/note`、`/notes`、`/reset`、`/help` | [`Input::Command`]，走确定性分发 |
//! | 其他 | [`Input::Query`]，交给 Agent |

use crate::memory::notes::DEFAULT_RECENT_LIMIT;

pub const TITLE: &str = "E-commerce Customer Support AI Agent";
pub const UNDERLINE: &str = "===================================";
pub const USAGE_HINT: &str = "Ask me anything about our products or policies (type 'quit' to exit)";
/// 每次提示前先输出一个空行
pub const PROMPT: &str = "Customer: ";
pub const FAREWELL: &str = "Thank you for using our customer support service. Goodbye!";

pub const HELP: &str = "\
Commands:
  /note [category:] text   save a customer note (category defaults to 'general')
  /notes [n]               show the n most recent notes (default 5)
  /reset                   forget the conversation so far
  /help                    show this help
  quit | exit | q          leave";

const EXIT_TOKENS: [&str; 3] = ["quit", "exit", "q"];

/// 操作员命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddNote {
        content: String,
        category: Option<String>,
    },
    RecentNotes {
        limit: usize,
    },
    Reset,
    Help,
    /// 无法识别或参数不合法，携带提示文本
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Quit,
    Empty,
    Command(Command),
    Query(String),
}

/// 启动时打印的横幅
pub fn banner() -> String {
    format!("{TITLE}\n{UNDERLINE}\n{USAGE_HINT}")
}

/// 对一行输入分类
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if EXIT_TOKENS.iter().any(|t| line.eq_ignore_ascii_case(t)) {
        return Input::Quit;
    }
    match line.strip_prefix('/') {
        Some(rest) => Input::Command(parse_command(rest)),
        None => Input::Query(line.to_string()),
    }
}

fn parse_command(rest: &str) -> Command {
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "note" => parse_note(args),
        "notes" => {
            if args.is_empty() {
                return Command::RecentNotes {
                    limit: DEFAULT_RECENT_LIMIT,
                };
            }
            match args.parse::<usize>() {
                Ok(limit) if limit >= 1 => Command::RecentNotes { limit },
                _ => Command::Invalid(format!("'/notes' expects a positive number, got '{args}'")),
            }
        }
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        other => Command::Invalid(format!("Unknown command '/{other}'. Type /help for a list.")),
    }
}

/// `/note preference: Customer prefers email` → 分类 `preference`
///
/// 只有冒号前是单个词时才当作分类，避免把正文里的冒号误判。
fn parse_note(args: &str) -> Command {
    if args.is_empty() {
        return Command::Invalid("'/note' needs some text to save".to_string());
    }
    if let Some((head, body)) = args.split_once(':') {
        let head = head.trim();
        let body = body.trim();
        if !head.is_empty() && !head.contains(char::is_whitespace) && !body.is_empty() {
            return Command::AddNote {
                content: body.to_string(),
                category: Some(head.to_string()),
            };
        }
    }
    Command::AddNote {
        content: args.to_string(),
        category: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_tokens_case_insensitive() {
        for line in ["quit", "EXIT", " q ", "Quit"] {
            assert_eq!(parse_input(line), Input::Quit, "{line}");
        }
        assert_eq!(
            parse_input("quite"),
            Input::Query("quite".to_string())
        );
    }

    #[test]
    fn test_empty_input_is_ignored() {
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(parse_input("   \t"), Input::Empty);
    }

    #[test]
    fn test_query_is_trimmed() {
        assert_eq!(
            parse_input("  How much does the UltraPhone X cost?  "),
            Input::Query("How much does the UltraPhone X cost?".to_string())
        );
    }

    #[test]
    fn test_note_command_with_category() {
        assert_eq!(
            parse_input("/note preference: Customer prefers email contact"),
            Input::Command(Command::AddNote {
                content: "Customer prefers email contact".to_string(),
                category: Some("preference".to_string()),
            })
        );
    }

    #[test]
    fn test_note_command_without_category() {
        assert_eq!(
            parse_input("/note call back after 5pm: urgent"),
            Input::Command(Command::AddNote {
                content: "call back after 5pm: urgent".to_string(),
                category: None,
            })
        );
        assert!(matches!(
            parse_input("/note"),
            Input::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_notes_command_limit() {
        assert_eq!(
            parse_input("/notes"),
            Input::Command(Command::RecentNotes {
                limit: DEFAULT_RECENT_LIMIT
            })
        );
        assert_eq!(
            parse_input("/notes 2"),
            Input::Command(Command::RecentNotes { limit: 2 })
        );
        assert!(matches!(
            parse_input("/notes 0"),
            Input::Command(Command::Invalid(_))
        ));
        assert!(matches!(
            parse_input("/notes many"),
            Input::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_reset_help_and_unknown() {
        assert_eq!(parse_input("/reset"), Input::Command(Command::Reset));
        assert_eq!(parse_input("/HELP"), Input::Command(Command::Help));
        match parse_input("/refund 42") {
            Input::Command(Command::Invalid(msg)) => assert!(msg.contains("/refund")),
            other => panic!("应为未知命令: {:?}", other),
        }
    }

    #[test]
    fn test_banner_layout() {
        let banner = banner();
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines, vec![TITLE, UNDERLINE, USAGE_HINT]);
    }
}
