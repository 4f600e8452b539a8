//! Admin identities and the shared secret.

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Persisted godcmd config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GodcmdConfig {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub admin_users: Vec<String>,
}

/// Four distinct digits.
pub fn generate_temp_password() -> String {
    let mut digits: Vec<char> = ('0'..='9').collect();
    digits.shuffle(&mut rand::rng());
    digits.into_iter().take(4).collect()
}

/// Who may run admin commands. Users are only ever added.
#[derive(Debug)]
pub struct AdminRegistry {
    users: RwLock<Vec<String>>,
    password: RwLock<String>,
    temp_password: RwLock<Option<String>>,
}

impl AdminRegistry {
    /// A temporary secret is generated when `config.password` is empty.
    pub fn new(config: &GodcmdConfig) -> Self {
        let temp = if config.password.is_empty() {
            let temp = generate_temp_password();
            info!("[Godcmd] 因未设置口令，本次的临时口令为{}。", temp);
            Some(temp)
        } else {
            None
        };
        Self {
            users: RwLock::new(config.admin_users.clone()),
            password: RwLock::new(config.password.clone()),
            temp_password: RwLock::new(temp),
        }
    }

    pub fn temp_password(&self) -> Option<String> {
        self.temp_password.read().clone()
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.users.read().iter().any(|u| u == user_id)
    }

    pub fn admins(&self) -> Vec<String> {
        self.users.read().clone()
    }

    pub fn add(&self, user_id: &str) {
        let mut users = self.users.write();
        if !users.iter().any(|u| u == user_id) {
            users.push(user_id.to_string());
        }
    }

    /// Takes a freshly read config. A newly set password retires the
    /// temporary one; admins listed in the file are merged in.
    pub fn apply_config(&self, config: &GodcmdConfig) {
        if !config.password.is_empty() {
            *self.password.write() = config.password.clone();
            self.temp_password.write().take();
        }
        for user in &config.admin_users {
            self.add(user);
        }
    }

    /// Checks `args` against the secrets and authorizes `user_id` on success.
    pub fn authenticate(&self, user_id: &str, args: &[&str], is_admin: bool, is_group: bool) -> (bool, String) {
        if is_group {
            return (false, "请勿在群聊中认证".to_string());
        }
        if is_admin {
            return (false, "管理员账号无需认证".to_string());
        }
        if args.len() != 1 {
            return (false, "请提供口令".to_string());
        }
        let given = args[0];
        let password = self.password.read().clone();
        if !password.is_empty() {
            if given == password {
                self.add(user_id);
                info!("[Godcmd] {} authenticated as admin", user_id);
                return (true, "认证成功".to_string());
            }
            return (false, "认证失败".to_string());
        }
        match self.temp_password() {
            Some(temp) if temp == given => {
                self.add(user_id);
                info!("[Godcmd] {} authenticated with the temporary secret", user_id);
                (true, "认证成功，请尽快设置口令".to_string())
            }
            _ => (false, "认证失败".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn temp_password_is_four_distinct_digits() {
        for _ in 0..50 {
            let p = generate_temp_password();
            assert_eq!(p.chars().count(), 4);
            assert!(p.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(p.chars().collect::<HashSet<_>>().len(), 4);
        }
    }

    #[test]
    fn temp_password_only_without_persistent_one() {
        let reg = AdminRegistry::new(&GodcmdConfig::default());
        let temp = reg.temp_password().unwrap();
        let (ok, msg) = reg.authenticate("alice", &[temp.as_str()], false, false);
        assert!(ok);
        assert_eq!(msg, "认证成功，请尽快设置口令");
        assert!(reg.is_admin("alice"));

        let reg = AdminRegistry::new(&GodcmdConfig { password: "1234".into(), admin_users: vec![] });
        assert!(reg.temp_password().is_none());
    }

    #[test]
    fn setting_password_retires_temp_secret() {
        let reg = AdminRegistry::new(&GodcmdConfig::default());
        let temp = reg.temp_password().unwrap();
        reg.apply_config(&GodcmdConfig { password: "secret".into(), admin_users: vec![] });
        let (ok, msg) = reg.authenticate("bob", &[temp.as_str()], false, false);
        assert!(!ok);
        assert_eq!(msg, "认证失败");
        assert!(reg.authenticate("bob", &["secret"], false, false).0);
    }

    #[test]
    fn rejections_are_checked_in_order() {
        let reg = AdminRegistry::new(&GodcmdConfig { password: "1234".into(), admin_users: vec!["root".into()] });
        assert_eq!(reg.authenticate("root", &["1234"], true, true).1, "请勿在群聊中认证");
        assert_eq!(reg.authenticate("root", &["1234"], true, false).1, "管理员账号无需认证");
        assert_eq!(reg.authenticate("eve", &[], false, false).1, "请提供口令");
        assert_eq!(reg.authenticate("eve", &["1", "2"], false, false).1, "请提供口令");
        assert_eq!(reg.authenticate("eve", &["0000"], false, false).1, "认证失败");
        assert!(!reg.is_admin("eve"));
    }

    #[test]
    fn admins_are_never_removed_by_reload() {
        let reg = AdminRegistry::new(&GodcmdConfig { password: "x".into(), admin_users: vec!["a".into()] });
        reg.add("b");
        reg.apply_config(&GodcmdConfig { password: "x".into(), admin_users: vec!["c".into()] });
        assert_eq!(reg.admins(), vec!["a", "b", "c"]);
    }
}
