use crate::plugins::HelpRequest;
use crate::plugins::godcmd::commands::{CommandKind, CommandSpec};
use crate::plugins::godcmd::router::CommandRouter;
use crate::plugins::manager::PluginManager;

/// Channels where the `id` command makes sense.
const ID_CHANNELS: &[&str] = &["wxy", "wechatmp"];

fn command_line<K>(trigger: char, spec: &CommandSpec<K>) -> String {
    let mut line = String::new();
    if let Some(alias) = spec.aliases.first() {
        line.push(trigger);
        line.push_str(alias);
        line.push(' ');
    }
    line.push_str(&spec.args.join(" "));
    line.push_str(": ");
    line.push_str(spec.desc);
    line.push('\n');
    line
}

/// The `help` reply: general commands, enabled visible plugins, then
/// the admin table for admins.
pub fn global_help(
    router: &CommandRouter,
    plugins: Option<&PluginManager>,
    trigger: char,
    channel_type: &str,
    is_admin: bool,
    is_group: bool,
) -> String {
    let mut text = String::from("通用指令\n");
    for spec in router.general().iter() {
        if spec.kind.hidden_from_help() {
            continue;
        }
        if spec.kind == CommandKind::Id && !ID_CHANNELS.contains(&channel_type) {
            continue;
        }
        text.push_str(&command_line(trigger, spec));
    }

    if let Some(manager) = plugins {
        text.push_str("\n可用插件");
        let req = HelpRequest { verbose: false, is_admin, is_group };
        for summary in manager.list_plugins() {
            if !summary.enabled || summary.meta.hidden {
                continue;
            }
            let body = match manager.instance(&summary.meta.name) {
                Some(plugin) => plugin.help_text(req),
                None => summary.meta.desc.clone(),
            };
            text.push_str(&format!("\n{}:{}", summary.meta.display_name(), body.trim()));
        }
    }

    if is_admin {
        text.push_str("\n\n管理员指令：\n");
        for spec in router.admin().iter() {
            text.push_str(&command_line(trigger, spec));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_commands_are_not_listed() {
        let router = CommandRouter::new('#', &[]).unwrap();
        let text = global_help(&router, None, '#', "wx", false, false);
        assert!(text.starts_with("通用指令\n#help [插件名]: "));
        assert!(text.contains("#status : 状态查询\n"));
        assert!(!text.contains("#auth"));
        assert!(!text.contains("set_openai_api_key"));
        assert!(!text.contains("#id"));
        assert!(!text.contains("管理员指令"));
    }

    #[test]
    fn admins_see_admin_table_and_id_follows_channel() {
        let router = CommandRouter::new('#', &[]).unwrap();
        let text = global_help(&router, None, '#', "wechatmp", true, false);
        assert!(text.contains("#id : 获取用户id"));
        assert!(text.contains("\n\n管理员指令：\n#resume : 恢复服务\n"));
        assert!(text.contains("#setpri 插件名 优先级: "));
    }
}
