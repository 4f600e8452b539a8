//! Godcmd: the command plugin. Runs first in the chain, answers
//! trigger-prefixed commands and holds the bot's paused/serving switch.

pub mod auth;
pub mod commands;
pub mod help;
pub mod router;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use plugbot_common::models::{PluginMeta, Reply};
use plugbot_common::traits::{ChatBackend, LogControl};
use tracing::{debug, error, info};

use crate::Error;
use crate::config::{model_mapping, BotConfig, ConfigHandle, PluginConfigStore, UserDataStore, MODEL_LIST};
use crate::plugins::{EventAction, EventContext, HelpRequest, Plugin};

pub use auth::{AdminRegistry, GodcmdConfig};
pub use commands::{AdminCommandKind, CommandKind};
pub use router::{CommandRouter, ParsedCommand, Resolved};

pub const PLUGIN_NAME: &str = "Godcmd";

/// Serving vs. paused.
#[derive(Debug)]
pub struct RunningFlag(AtomicBool);

impl Default for RunningFlag {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl RunningFlag {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `true` if the bot was serving before.
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Returns `true` if the bot was paused before.
    pub fn resume(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Identity of whoever sent the command.
#[derive(Debug, Clone)]
struct Caller {
    user_id: String,
    is_admin: bool,
    is_group: bool,
    /// Group message whose actual sender is an admin.
    group_admin: bool,
}

type Outcome = (bool, String);

fn ok(msg: impl Into<String>) -> Outcome {
    (true, msg.into())
}

fn fail(msg: impl Into<String>) -> Outcome {
    (false, msg.into())
}

pub struct Godcmd {
    meta: PluginMeta,
    /// Rebuilt whenever the trigger or the reset aliases may have changed.
    router: RwLock<Arc<CommandRouter>>,
    registry: AdminRegistry,
    running: RunningFlag,
    config: Arc<ConfigHandle>,
    store: PluginConfigStore,
    backend: Arc<dyn ChatBackend>,
    user_data: Arc<UserDataStore>,
    log_control: Arc<dyn LogControl>,
}

impl Godcmd {
    /// Loads (or creates) the godcmd config and builds both command tables.
    pub fn new(
        config: Arc<ConfigHandle>,
        store: PluginConfigStore,
        backend: Arc<dyn ChatBackend>,
        user_data: Arc<UserDataStore>,
        log_control: Arc<dyn LogControl>,
    ) -> Result<Self, Error> {
        let own = match store.load::<GodcmdConfig>(PLUGIN_NAME)? {
            Some(c) => c,
            None => {
                let c = GodcmdConfig::default();
                store.save(PLUGIN_NAME, &c)?;
                info!("[Godcmd] Created default config at {:?}", store.config_path(PLUGIN_NAME));
                c
            }
        };
        let bot = config.get();
        let router = CommandRouter::new(bot.command_trigger, &bot.clear_memory_commands)?;
        info!("[Godcmd] inited");
        Ok(Self {
            meta: PluginMeta {
                name: PLUGIN_NAME.to_string(),
                namecn: Some("指令插件".to_string()),
                desc: "为你的机器人添加指令集，有用户和管理员两种角色，加载顺序请放在首位，初次运行后插件目录会生成配置文件, 填充管理员密码后即可认证".to_string(),
                version: "1.0".to_string(),
                author: "lanvent".to_string(),
                desire_priority: 999,
                hidden: true,
            },
            router: RwLock::new(Arc::new(router)),
            registry: AdminRegistry::new(&own),
            running: RunningFlag::default(),
            config,
            store,
            backend,
            user_data,
            log_control,
        })
    }

    pub fn registry(&self) -> &AdminRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    pub fn router(&self) -> Arc<CommandRouter> {
        self.router.read().clone()
    }

    /// On error the previous router stays in place.
    fn rebuild_router(&self, bot: &BotConfig) -> Result<(), Error> {
        let router = CommandRouter::new(bot.command_trigger, &bot.clear_memory_commands)?;
        *self.router.write() = Arc::new(router);
        debug!("[Godcmd] command router rebuilt for trigger '{}'", bot.command_trigger);
        Ok(())
    }

    fn caller(&self, ectx: &EventContext) -> Caller {
        let ctx = &ectx.context;
        Caller {
            user_id: ctx.receiver.clone(),
            is_admin: self.registry.is_admin(&ctx.receiver),
            is_group: ctx.is_group,
            group_admin: ctx.is_group && self.registry.is_admin(&ctx.msg.actual_user_id),
        }
    }

    fn status_text(&self, caller: &Caller, bot: &BotConfig) -> String {
        format!(
            "我的状态：{}\n你的身份：{}\n对话模型：{}\n绘画模型：{}",
            if self.running.is_running() { "Q我吧" } else { "睡觉中" },
            if caller.is_admin { "尊贵的管理员" } else { "尊敬的用户" },
            bot.model,
            bot.text_to_image,
        )
    }

    fn plugin_help(&self, query: &str, caller: &Caller, ectx: &EventContext) -> Outcome {
        let upper = query.to_uppercase();
        for summary in ectx.plugins.list_plugins() {
            // Help for a plugin only while it is enabled.
            if !summary.enabled {
                continue;
            }
            let name_match = summary.meta.name.to_uppercase() == upper;
            let cn_match = summary.meta.namecn.as_deref() == Some(query);
            if !name_match && !cn_match {
                continue;
            }
            let req = HelpRequest { verbose: true, is_admin: caller.is_admin, is_group: caller.is_group };
            let text = match ectx.plugins.instance(&summary.meta.name) {
                Some(plugin) => plugin.help_text(req),
                None => summary.meta.desc.clone(),
            };
            return ok(text);
        }
        fail("插件不存在或未启用")
    }

    async fn run_general(&self, kind: CommandKind, args: &[&str], caller: &Caller, ectx: &EventContext, bot: &BotConfig) -> Outcome {
        let user = caller.user_id.as_str();
        match kind {
            CommandKind::Help => match args.first() {
                None => ok(help::global_help(
                    &self.router(),
                    Some(ectx.plugins.as_ref()),
                    bot.command_trigger,
                    &bot.channel_type,
                    caller.is_admin,
                    caller.is_group,
                )),
                Some(query) => self.plugin_help(query, caller, ectx),
            },
            CommandKind::Auth => self.registry.authenticate(user, args, caller.is_admin, caller.is_group),
            CommandKind::Model => {
                if !caller.is_admin && !caller.group_admin {
                    return fail("需要管理员权限执行");
                }
                match args {
                    [] => ok(format!("当前模型为: {}", bot.model)),
                    [model] if !MODEL_LIST.contains(model) => fail("模型名称不存在"),
                    [model] => {
                        let mapped = model_mapping(model);
                        self.config.update(|c| c.model = mapped.clone());
                        self.backend.reset_bot();
                        info!("[Godcmd] Global model switched to {}", mapped);
                        ok(format!("模型设置为: {}", mapped))
                    }
                    _ => fail("请提供一个模型名称"),
                }
            }
            CommandKind::SetOpenaiApiKey => match args {
                [key] => {
                    self.user_data.update(user, |d| d.openai_api_key = Some(key.to_string()));
                    ok(format!("你的OpenAI私有api_key已设置为{}", key))
                }
                _ => fail("请提供一个api_key"),
            },
            CommandKind::ResetOpenaiApiKey => match self.user_data.update(user, |d| d.openai_api_key.take()) {
                Some(_) => ok("你的OpenAI私有api_key已清除"),
                None => fail("你没有设置私有api_key"),
            },
            CommandKind::SetGptModel => match args {
                [model] => {
                    self.user_data.update(user, |d| d.gpt_model = Some(model.to_string()));
                    ok(format!("你的GPT模型已设置为{}", model))
                }
                _ => fail("请提供一个GPT模型"),
            },
            CommandKind::ResetGptModel => match self.user_data.update(user, |d| d.gpt_model.take()) {
                Some(_) => ok("你的GPT模型已重置"),
                None => fail("你没有设置私有GPT模型"),
            },
            CommandKind::GptModel => {
                let model = self.user_data.get(user).gpt_model.unwrap_or_else(|| bot.model.clone());
                ok(format!("你的GPT模型为{}", model))
            }
            CommandKind::Id => ok(user),
            CommandKind::Reset => {
                if !self.backend.supports_session_reset() {
                    return fail("当前对话机器人不支持重置会话");
                }
                let session_id = &ectx.context.session_id;
                self.backend.clear_session(session_id);
                ectx.channel.cancel_session(session_id);
                ok("会话已重置")
            }
            CommandKind::Status => ok(self.status_text(caller, bot)),
        }
    }

    async fn run_admin(&self, kind: AdminCommandKind, args: &[&str], ectx: &EventContext) -> Outcome {
        let nick = &ectx.context.msg.to_user_nickname;
        let plugins = &ectx.plugins;
        match kind {
            AdminCommandKind::Stop => {
                if self.running.stop() {
                    info!("[Godcmd] Service paused");
                    ok(format!("{}现在要进入甜甜的梦乡啦，啾咪😘再见啦💤", nick))
                } else {
                    ok(format!("亲爱的，{}正沉浸在梦乡里呢，嘘~🌙不要吵醒我的美梦哦💤", nick))
                }
            }
            AdminCommandKind::Resume => {
                if self.running.resume() {
                    info!("[Godcmd] Service resumed");
                    ok(format!("{}跳跳蹦蹦地从床上蹦了起来🏃新的一天开始啦🌞", nick))
                } else {
                    ok(format!("亲爱的，{}正在这里玩得不亦乐乎呢~✨不许打扰我的快乐时光哦🎈", nick))
                }
            }
            AdminCommandKind::Reconf => match self.config.reload().and_then(|()| self.rebuild_router(&self.config.get())) {
                Ok(()) => ok("配置已重载"),
                Err(e) => {
                    error!("[Godcmd] Config reload failed: {}", e);
                    fail(format!("配置重载失败：{}", e))
                }
            },
            AdminCommandKind::ResetAll => {
                if !self.backend.supports_session_reset() {
                    return fail("当前对话机器人不支持重置会话");
                }
                ectx.channel.cancel_all_sessions();
                self.backend.clear_all_sessions();
                ok("重置所有会话成功")
            }
            AdminCommandKind::ScanPlugins => match plugins.scan_plugins() {
                Ok(found) if found.is_empty() => ok("插件扫描完成, 未发现新插件"),
                Ok(found) => {
                    let mut msg = String::from("插件扫描完成\n发现新插件：\n");
                    for meta in found {
                        msg.push_str(&format!("{}_v{}\n", meta.name, meta.version));
                    }
                    ok(msg)
                }
                Err(e) => fail(format!("插件扫描失败：{}", e)),
            },
            AdminCommandKind::PluginList => {
                let mut msg = String::from("插件列表：\n");
                for p in plugins.list_plugins() {
                    msg.push_str(&format!(
                        "{}_v{} {} - {}\n",
                        p.meta.name,
                        p.meta.version,
                        p.priority,
                        if p.enabled { "已启用" } else { "未启用" }
                    ));
                }
                ok(msg)
            }
            AdminCommandKind::SetPriority => match args {
                [name, priority] => {
                    let Ok(priority) = priority.parse::<i32>() else {
                        return fail("优先级必须是整数");
                    };
                    if plugins.set_plugin_priority(name, priority) {
                        ok(format!("插件{}优先级已设置为{}", name, priority))
                    } else {
                        fail("插件不存在")
                    }
                }
                _ => fail("请提供插件名和优先级"),
            },
            AdminCommandKind::ReloadPlugin => match args {
                [name] if plugins.reload_plugin(name) => ok("插件配置已重载"),
                [_] => fail("插件不存在"),
                _ => fail("请提供插件名"),
            },
            AdminCommandKind::EnablePlugin => match args {
                [name] => plugins.enable_plugin(name),
                _ => fail("请提供插件名"),
            },
            AdminCommandKind::DisablePlugin => match args {
                [name] if plugins.disable_plugin(name) => ok("插件已禁用"),
                [_] => fail("插件不存在"),
                _ => fail("请提供插件名"),
            },
            AdminCommandKind::InstallPlugin => match args {
                [target] => plugins.install_plugin(target).await,
                _ => fail("请提供插件名或.git结尾的仓库地址"),
            },
            AdminCommandKind::UninstallPlugin => match args {
                [name] => plugins.uninstall_plugin(name).await,
                _ => fail("请提供插件名"),
            },
            AdminCommandKind::UpdatePlugin => match args {
                [name] => plugins.update_plugin(name).await,
                _ => fail("请提供插件名"),
            },
            AdminCommandKind::Debug => {
                let enable = !self.log_control.is_debug();
                match self.log_control.set_debug(enable) {
                    Ok(()) if enable => ok("DEBUG模式已开启"),
                    Ok(()) => ok("DEBUG模式已关闭"),
                    Err(e) => fail(format!("切换DEBUG模式失败：{}", e)),
                }
            }
        }
    }

    async fn execute(&self, cmd: &str, args: &[&str], ectx: &EventContext, bot: &BotConfig) -> Option<Outcome> {
        let caller = self.caller(ectx);
        let trigger = bot.command_trigger;
        match self.router().resolve(cmd) {
            Resolved::General(kind) => Some(self.run_general(kind, args, &caller, ectx, bot).await),
            Resolved::Admin(kind) => {
                if !caller.is_admin && !caller.group_admin {
                    return Some(fail("需要管理员权限才能执行该指令"));
                }
                if caller.is_group && !bot.group_chat_admin_commands {
                    return Some(fail("群聊不可执行管理员指令"));
                }
                Some(self.run_admin(kind, args, ectx).await)
            }
            Resolved::Unknown if bot.plugin_trigger_prefix == trigger.to_string() => None,
            Resolved::Unknown => Some(fail(format!("未知指令：{}\n查看指令列表请输入{}help \n", cmd, trigger))),
        }
    }
}

#[async_trait]
impl Plugin for Godcmd {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    async fn on_handle_context(&self, ectx: &mut EventContext) -> Result<(), Error> {
        if !ectx.context.is_text() {
            if !self.running.is_running() {
                ectx.action = EventAction::BreakPass;
            }
            return Ok(());
        }

        let bot = self.config.get();
        let content = ectx.context.content.clone();
        debug!("[Godcmd] on_handle_context. content: {}", content);

        let outcome = match router::parse(&content, bot.command_trigger) {
            None => {
                if !self.running.is_running() {
                    ectx.action = EventAction::BreakPass;
                }
                return Ok(());
            }
            Some(ParsedCommand::Empty) => fail(format!("空指令，输入{}help查看指令列表", bot.command_trigger)),
            Some(ParsedCommand::Command { cmd, args }) => match self.execute(cmd, &args, ectx, &bot).await {
                Some(outcome) => outcome,
                None => {
                    debug!("[Godcmd] '{}' left to the plugin trigger", cmd);
                    return Ok(());
                }
            },
        };

        let (success, msg) = outcome;
        ectx.finish(if success { Reply::info(msg) } else { Reply::error(msg) });
        Ok(())
    }

    fn help_text(&self, req: HelpRequest) -> String {
        let bot = self.config.get();
        help::global_help(&self.router(), None, bot.command_trigger, &bot.channel_type, req.is_admin, req.is_group)
    }

    fn reload(&self) -> Result<(), Error> {
        if let Some(own) = self.store.load::<GodcmdConfig>(PLUGIN_NAME)? {
            self.registry.apply_config(&own);
        }
        self.rebuild_router(&self.config.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_and_resume_report_transitions() {
        let flag = RunningFlag::default();
        assert!(flag.is_running());
        assert!(flag.stop());
        assert!(!flag.stop());
        assert!(!flag.is_running());
        assert!(flag.resume());
        assert!(!flag.resume());
    }
}
