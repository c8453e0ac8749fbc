//! 输入清洗与房间名校验
//!
//! 所有来自客户端的用户名和房间名在使用前都要经过 [`sanitize`]，
//! 房间名还必须通过 [`validate_room_name`]。

/// 房间名最大长度（字符数）
pub const MAX_ROOM_NAME_LEN: usize = 50;

const SCRIPT_OPEN: &str = "&lt;script&gt;";
const SCRIPT_CLOSE: &str = "&lt;/script&gt;";

/// HTML 转义，并去掉转义后残留的 script 标签。
pub fn sanitize(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&#34;"),
            other => escaped.push(other),
        }
    }

    escaped.replace(SCRIPT_OPEN, "").replace(SCRIPT_CLOSE, "")
}

/// 房间名：1-50 个字符，仅允许 `A-Za-z0-9-_.`
pub fn validate_room_name(name: &str) -> bool {
    let len = name.chars().count();
    if len == 0 || len > MAX_ROOM_NAME_LEN {
        return false;
    }

    name.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}
