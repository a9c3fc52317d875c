//! 变量替换引擎 - 将模板中的 `{name}` 占位符替换为调用方提供的值
//!
//! 纯函数，单遍扫描，无嵌套模板、无转义语法。未提供值的占位符原样保留，
//! 空映射等价于恒等变换。

use std::collections::HashMap;

/// Replace every `{key}` token in `pattern` with `vars[key]`.
///
/// Tokens whose key is absent from `vars` pass through unchanged. An
/// unterminated `{...` run at the end of the pattern is emitted literally.
/// Replacement values are inserted verbatim and never re-scanned, so a value
/// containing `{other}` cannot trigger a second substitution.
pub fn substitute(pattern: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        match after_open.find('}') {
            Some(close) => {
                let key = &after_open[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    // 未声明的变量原样保留
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                // 没有闭合括号，剩余部分按字面量输出
                out.push('{');
                out.push_str(after_open);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
