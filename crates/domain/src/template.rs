//! 消息模板渲染: 将占位符替换为客户字段。
//!
//! 支持的占位符: `{first_name}`, `{last_name}`, `{full_name}`。
//! 未知占位符原样保留, 缺失字段替换为空串。

use crate::entities::Prospect;

pub fn render(template: &str, prospect: &Prospect) -> String {
    let full_name = format!("{} {}", prospect.first_name, prospect.last_name)
        .trim()
        .to_string();
    template
        .replace("{first_name}", prospect.first_name.trim())
        .replace("{last_name}", prospect.last_name.trim())
        .replace("{full_name}", &full_name)
}
