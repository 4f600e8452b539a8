//! The two command tables: everyday commands and admin-only commands.
//! Tables are built once at startup; an alias may appear only once per table.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Auth,
    Model,
    SetOpenaiApiKey,
    ResetOpenaiApiKey,
    SetGptModel,
    ResetGptModel,
    GptModel,
    Id,
    Reset,
    Status,
}

impl CommandKind {
    /// Commands kept out of the help listing.
    pub fn hidden_from_help(self) -> bool {
        matches!(
            self,
            CommandKind::Auth
                | CommandKind::SetOpenaiApiKey
                | CommandKind::ResetOpenaiApiKey
                | CommandKind::SetGptModel
                | CommandKind::ResetGptModel
                | CommandKind::GptModel
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminCommandKind {
    Resume,
    Stop,
    Reconf,
    ResetAll,
    ScanPlugins,
    PluginList,
    SetPriority,
    ReloadPlugin,
    EnablePlugin,
    DisablePlugin,
    InstallPlugin,
    UninstallPlugin,
    UpdatePlugin,
    Debug,
}

#[derive(Debug, Clone)]
pub struct CommandSpec<K> {
    pub kind: K,
    pub name: &'static str,
    /// The first alias is the one shown in help.
    pub aliases: Vec<String>,
    pub args: &'static [&'static str],
    pub desc: &'static str,
}

impl<K> CommandSpec<K> {
    fn new(kind: K, name: &'static str, aliases: &[&str], args: &'static [&'static str], desc: &'static str) -> Self {
        Self {
            kind,
            name,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            args,
            desc,
        }
    }
}

/// Alias → command lookup for one table.
#[derive(Debug)]
pub struct CommandTable<K> {
    label: &'static str,
    specs: Vec<CommandSpec<K>>,
    by_alias: HashMap<String, K>,
}

impl<K: Copy + Eq + Debug> CommandTable<K> {
    /// Fails on the first alias that is registered twice.
    pub fn new(label: &'static str, specs: Vec<CommandSpec<K>>) -> Result<Self, Error> {
        let mut by_alias = HashMap::new();
        for spec in &specs {
            for alias in &spec.aliases {
                if by_alias.insert(alias.clone(), spec.kind).is_some() {
                    return Err(Error::DuplicateAlias { table: label, alias: alias.clone() });
                }
            }
        }
        Ok(Self { label, specs, by_alias })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Case-sensitive alias lookup.
    pub fn resolve(&self, alias: &str) -> Option<K> {
        self.by_alias.get(alias).copied()
    }

    pub fn spec(&self, kind: K) -> Option<&CommandSpec<K>> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    /// Specs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec<K>> {
        self.specs.iter()
    }
}

/// Builds the general table. `extra_reset_aliases` come from the
/// `clear_memory_commands` setting and only count when written with `trigger`.
pub fn general_commands(trigger: char, extra_reset_aliases: &[String]) -> Result<CommandTable<CommandKind>, Error> {
    use CommandKind::*;
    let mut reset = CommandSpec::new(Reset, "reset", &["reset", "重置会话"], &[], "重置会话");
    for custom in extra_reset_aliases {
        if let Some(alias) = custom.strip_prefix(trigger) {
            if !alias.is_empty() && !reset.aliases.iter().any(|a| a == alias) {
                reset.aliases.push(alias.to_string());
            }
        }
    }

    CommandTable::new(
        "general",
        vec![
            CommandSpec::new(Help, "help", &["help", "帮助"], &["[插件名]"], "回复此帮助或指定插件的详细帮助"),
            CommandSpec::new(Auth, "auth", &["auth", "认证"], &["口令"], "管理员认证"),
            CommandSpec::new(Model, "model", &["model", "模型"], &[], "查看和设置全局模型"),
            CommandSpec::new(SetOpenaiApiKey, "set_openai_api_key", &["set_openai_api_key"], &["api_key"], "设置你的OpenAI私有api_key"),
            CommandSpec::new(ResetOpenaiApiKey, "reset_openai_api_key", &["reset_openai_api_key"], &[], "重置为默认的api_key"),
            CommandSpec::new(SetGptModel, "set_gpt_model", &["set_gpt_model"], &[], "设置你的私有模型"),
            CommandSpec::new(ResetGptModel, "reset_gpt_model", &["reset_gpt_model"], &[], "重置你的私有模型"),
            CommandSpec::new(GptModel, "gpt_model", &["gpt_model"], &[], "查询你使用的模型"),
            CommandSpec::new(Id, "id", &["id", "用户"], &[], "获取用户id"),
            reset,
            CommandSpec::new(Status, "status", &["status", "health", "状态", "状况", "在吗"], &[], "状态查询"),
        ],
    )
}

pub fn admin_commands() -> Result<CommandTable<AdminCommandKind>, Error> {
    use AdminCommandKind::*;
    CommandTable::new(
        "admin",
        vec![
            CommandSpec::new(Resume, "resume", &["resume", "恢复服务", "起床", "醒醒", "起床了"], &[], "恢复服务"),
            CommandSpec::new(Stop, "stop", &["stop", "暂停服务", "睡觉", "晚安", "休息", "好梦"], &[], "暂停服务"),
            CommandSpec::new(Reconf, "reconf", &["reconf", "重载配置"], &[], "重载配置(不包含插件配置)"),
            CommandSpec::new(ResetAll, "resetall", &["resetall", "重置所有会话"], &[], "重置所有会话"),
            CommandSpec::new(ScanPlugins, "scanp", &["scanp", "扫描插件"], &[], "扫描插件目录是否有新插件"),
            CommandSpec::new(PluginList, "plist", &["plist", "插件"], &[], "打印当前插件列表"),
            CommandSpec::new(SetPriority, "setpri", &["setpri", "设置插件优先级"], &["插件名", "优先级"], "设置指定插件的优先级，越大越优先"),
            CommandSpec::new(ReloadPlugin, "reloadp", &["reloadp", "重载插件"], &["插件名"], "重载指定插件配置"),
            CommandSpec::new(EnablePlugin, "enablep", &["enablep", "启用插件"], &["插件名"], "启用指定插件"),
            CommandSpec::new(DisablePlugin, "disablep", &["disablep", "禁用插件"], &["插件名"], "禁用指定插件"),
            CommandSpec::new(InstallPlugin, "installp", &["installp", "安装插件"], &["仓库地址或插件名"], "安装指定插件"),
            CommandSpec::new(UninstallPlugin, "uninstallp", &["uninstallp", "卸载插件"], &["插件名"], "卸载指定插件"),
            CommandSpec::new(UpdatePlugin, "updatep", &["updatep", "更新插件"], &["插件名"], "更新指定插件"),
            CommandSpec::new(Debug, "debug", &["debug", "调试模式", "DEBUG"], &[], "开启机器调试日志"),
        ],
    )
}
