// File: plugbot-core/tests/godcmd_tests.rs

mod test_utils;

use plugbot_common::models::{Context, ReplyKind};
use plugbot_core::config::BotConfig;
use plugbot_core::plugins::godcmd::GodcmdConfig;
use plugbot_core::plugins::EventAction;
use test_utils::helpers::{reply_text, write_godcmd_config, Harness};

fn harness_with_password(password: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    write_godcmd_config(dir.path(), &GodcmdConfig { password: password.into(), admin_users: vec![] });
    Harness::with_dir(dir, BotConfig::default())
}

#[tokio::test]
async fn auth_round_trip() {
    let h = harness_with_password("1234");

    let ectx = h.say("alice", "#auth 1234").await;
    assert_eq!(ectx.action, EventAction::BreakPass);
    let reply = ectx.reply.unwrap();
    assert_eq!(reply.kind, ReplyKind::Info);
    assert_eq!(reply.content, "认证成功");
    assert!(h.godcmd.registry().is_admin("alice"));

    let again = h.say("alice", "#auth 1234").await;
    assert_eq!(again.reply.unwrap().content, "管理员账号无需认证");
}

#[tokio::test]
async fn wrong_password_and_group_auth_are_rejected() {
    let h = harness_with_password("1234");
    let ectx = h.say("bob", "#认证 0000").await;
    assert_eq!(ectx.reply.unwrap().kind, ReplyKind::Error);
    assert!(!h.godcmd.registry().is_admin("bob"));

    let ectx = h.send(Context::text("#auth 1234", "group-1").in_group("bob")).await;
    assert_eq!(reply_text(&ectx), "请勿在群聊中认证");
}

#[tokio::test]
async fn first_run_creates_config_and_accepts_temp_password() {
    let h = Harness::new(BotConfig::default());
    let stored: GodcmdConfig = h.store().load("Godcmd").unwrap().unwrap();
    assert_eq!(stored, GodcmdConfig::default());

    let temp = h.godcmd.registry().temp_password().unwrap();
    assert_eq!(temp.len(), 4);
    let ectx = h.say("carol", &format!("#auth {}", temp)).await;
    assert_eq!(reply_text(&ectx), "认证成功，请尽快设置口令");
}

#[tokio::test]
async fn stop_twice_gives_two_messages_and_pauses_chat() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;

    let mut ctx = Context::text("#stop", "admin");
    ctx.msg.to_user_nickname = "小助手".into();
    let first = reply_text(&h.send(ctx.clone()).await);
    let second = reply_text(&h.send(ctx).await);
    assert_eq!(first, "小助手现在要进入甜甜的梦乡啦，啾咪😘再见啦💤");
    assert_ne!(first, second);
    assert!(!h.godcmd.is_running());

    let chat = h.say("someone", "hello there").await;
    assert_eq!(chat.action, EventAction::BreakPass);
    assert!(chat.reply.is_none());

    let status = h.say("someone", "#status").await;
    assert!(reply_text(&status).starts_with("我的状态：睡觉中\n你的身份：尊敬的用户"));

    let woke = h.say("admin", "#醒醒").await;
    assert!(reply_text(&woke).contains("新的一天开始啦"));
    let chat = h.say("someone", "hello there").await;
    assert_eq!(chat.action, EventAction::Continue);
}

#[tokio::test]
async fn admin_commands_need_admin() {
    let h = harness_with_password("pw");
    let ectx = h.say("mallory", "#plist").await;
    assert_eq!(reply_text(&ectx), "需要管理员权限才能执行该指令");
    assert_eq!(ectx.reply.unwrap().kind, ReplyKind::Error);
}

#[tokio::test]
async fn group_admin_commands_follow_policy() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;
    let ectx = h.send(Context::text("#plist", "group-1").in_group("admin")).await;
    assert_eq!(reply_text(&ectx), "群聊不可执行管理员指令");

    h.config.update(|c| c.group_chat_admin_commands = true);
    let ectx = h.send(Context::text("#plist", "group-1").in_group("admin")).await;
    assert!(reply_text(&ectx).starts_with("插件列表：\nGodcmd_v1.0 999 - 已启用"));
}

#[tokio::test]
async fn setpri_on_unknown_plugin() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;

    let ectx = h.say("admin", "#setpri X 5").await;
    assert_eq!(reply_text(&ectx), "插件不存在");
    assert_eq!(ectx.reply.unwrap().kind, ReplyKind::Error);

    assert_eq!(reply_text(&h.say("admin", "#setpri X").await), "请提供插件名和优先级");
    assert_eq!(reply_text(&h.say("admin", "#setpri godcmd 1000").await), "插件godcmd优先级已设置为1000");
}

#[tokio::test]
async fn empty_and_unknown_commands() {
    let h = Harness::new(BotConfig::default());
    assert_eq!(reply_text(&h.say("u", "#").await), "空指令，输入#help查看指令列表");
    assert_eq!(reply_text(&h.say("u", "#   ").await), "空指令，输入#help查看指令列表");
    assert_eq!(reply_text(&h.say("u", "#dance").await), "未知指令：dance\n查看指令列表请输入#help \n");
}

#[tokio::test]
async fn unknown_command_passes_through_when_triggers_collide() {
    let bot = BotConfig { plugin_trigger_prefix: "#".into(), ..BotConfig::default() };
    let h = Harness::new(bot);
    let ectx = h.say("u", "#dance").await;
    assert_eq!(ectx.action, EventAction::Continue);
    assert!(ectx.reply.is_none());
}

#[tokio::test]
async fn reset_aliases_clear_the_session() {
    let h = Harness::new(BotConfig::default());
    use plugbot_common::traits::ChatBackend;
    h.backend.build_session("u", Some("prompt"));

    let ectx = h.say("u", "#清除记忆").await;
    assert_eq!(reply_text(&ectx), "会话已重置");
    assert!(!h.backend.has_session("u"));
    assert_eq!(h.channel.cancelled.lock().clone(), vec!["u".to_string()]);
}

#[tokio::test]
async fn model_switch_maps_turbo_and_resets_backend() {
    let h = harness_with_password("pw");
    assert_eq!(reply_text(&h.say("u", "#model").await), "需要管理员权限执行");

    h.login("admin", "pw").await;
    assert_eq!(reply_text(&h.say("admin", "#model").await), "当前模型为: gpt-3.5-turbo");
    assert_eq!(reply_text(&h.say("admin", "#model gpt-4-turbo").await), "模型设置为: gpt-4-turbo-preview");
    assert_eq!(h.config.get().model, "gpt-4-turbo-preview");
    assert_eq!(h.backend.generation(), 1);
    assert_eq!(reply_text(&h.say("admin", "#model nope").await), "模型名称不存在");
    assert_eq!(reply_text(&h.say("admin", "#模型 a b").await), "请提供一个模型名称");
}

#[tokio::test]
async fn private_overrides() {
    let h = Harness::new(BotConfig::default());
    assert_eq!(reply_text(&h.say("u", "#reset_openai_api_key").await), "你没有设置私有api_key");
    assert_eq!(reply_text(&h.say("u", "#set_openai_api_key sk-1").await), "你的OpenAI私有api_key已设置为sk-1");
    assert_eq!(h.user_data.get("u").openai_api_key.as_deref(), Some("sk-1"));
    assert_eq!(reply_text(&h.say("u", "#reset_openai_api_key").await), "你的OpenAI私有api_key已清除");

    assert_eq!(reply_text(&h.say("u", "#gpt_model").await), "你的GPT模型为gpt-3.5-turbo");
    assert_eq!(reply_text(&h.say("u", "#set_gpt_model gpt-4").await), "你的GPT模型已设置为gpt-4");
    assert_eq!(reply_text(&h.say("u", "#gpt_model").await), "你的GPT模型为gpt-4");
    assert_eq!(reply_text(&h.say("u", "#reset_gpt_model").await), "你的GPT模型已重置");
    assert_eq!(reply_text(&h.say("u", "#id").await), "u");
}

#[tokio::test]
async fn debug_toggles_log_level() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;
    assert_eq!(reply_text(&h.say("admin", "#debug").await), "DEBUG模式已开启");
    assert_eq!(reply_text(&h.say("admin", "#调试模式").await), "DEBUG模式已关闭");
    use plugbot_common::traits::LogControl;
    assert!(!h.log_control.is_debug());
}

#[tokio::test]
async fn single_plugin_commands_check_arguments() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;
    for cmd in ["#reloadp", "#enablep a b", "#disablep", "#uninstallp", "#updatep"] {
        assert_eq!(reply_text(&h.say("admin", cmd).await), "请提供插件名", "{}", cmd);
    }
    assert_eq!(reply_text(&h.say("admin", "#installp").await), "请提供插件名或.git结尾的仓库地址");
    assert_eq!(reply_text(&h.say("admin", "#uninstallp godcmd").await), "内置插件不可卸载");
    assert_eq!(reply_text(&h.say("admin", "#reloadp godcmd").await), "插件配置已重载");
}

#[tokio::test]
async fn reconf_picks_up_new_trigger_and_reset_aliases() {
    use plugbot_core::config::ConfigHandle;

    let dir = tempfile::tempdir().unwrap();
    write_godcmd_config(dir.path(), &GodcmdConfig { password: "pw".into(), admin_users: vec![] });
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, r##"{"command_trigger": "#", "clear_memory_commands": ["#清除记忆"]}"##).unwrap();
    let h = Harness::with_config(dir, ConfigHandle::load(&config_path).unwrap());
    h.login("admin", "pw").await;

    assert_eq!(reply_text(&h.say("u", "#清除记忆").await), "会话已重置");
    assert!(reply_text(&h.say("u", "#忘掉一切").await).starts_with("未知指令：忘掉一切"));

    std::fs::write(&config_path, r##"{"command_trigger": "/", "clear_memory_commands": ["/忘掉一切"]}"##).unwrap();
    assert_eq!(reply_text(&h.say("admin", "#reconf").await), "配置已重载");

    assert_eq!(reply_text(&h.say("u", "/忘掉一切").await), "会话已重置");
    assert_eq!(reply_text(&h.say("u", "/reset").await), "会话已重置");
    assert!(reply_text(&h.say("u", "/help").await).starts_with("通用指令\n/help [插件名]: "));
    // The old trigger is plain text now.
    assert!(h.say("u", "#清除记忆").await.reply.is_none());
}

#[tokio::test]
async fn reloadp_rebuilds_the_router_from_the_current_config() {
    let h = harness_with_password("pw");
    h.login("admin", "pw").await;
    h.config.update(|c| c.clear_memory_commands = vec!["#重新开始".to_string()]);
    assert!(reply_text(&h.say("u", "#重新开始").await).starts_with("未知指令"));

    assert_eq!(reply_text(&h.say("admin", "#reloadp godcmd").await), "插件配置已重载");
    assert_eq!(reply_text(&h.say("u", "#重新开始").await), "会话已重置");
}
