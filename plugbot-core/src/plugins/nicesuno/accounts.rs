//! Upstream account pool: picks one endpoint per request and keeps
//! per-account usage and health.

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use parking_lot::Mutex;
use tracing::{debug, warn};

pub const STATUS_OK: &str = "ok";
pub const INSUFFICIENT_CREDITS: &str = "Insufficient credits.";

/// Daily quotas come back at this local time.
const RESET_HOUR: u32 = 11;
const RESET_MINUTE: u32 = 0;
const RESET_SECOND: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Consumes account credits (music).
    Create,
    /// Free for the account (lyrics).
    Read,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub endpoint: String,
    /// `None` until the account is first used.
    pub last_attempt: Option<DateTime<Local>>,
    /// `"ok"`, empty, or the upstream error detail.
    pub last_status: String,
    pub used_count: u32,
    pub daily_limit: u32,
    /// Create requests selected on this account and not yet accounted for.
    pub reserved: u32,
}

impl AccountRecord {
    pub fn new(endpoint: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            last_attempt: None,
            last_status: String::new(),
            used_count: 0,
            daily_limit,
            reserved: 0,
        }
    }

    fn under_limit(&self) -> bool {
        self.used_count + self.reserved < self.daily_limit
    }

    /// Eligible in the first pass.
    fn is_preferred(&self, kind: RequestKind) -> bool {
        let status = self.last_status.as_str();
        match kind {
            RequestKind::Create => self.under_limit() && (status == STATUS_OK || status.is_empty()),
            RequestKind::Read => status == STATUS_OK || status.is_empty() || status == INSUFFICIENT_CREDITS,
        }
    }

    /// Eligible in the fallback pass.
    fn has_capacity(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Create => self.under_limit(),
            RequestKind::Read => true,
        }
    }

    /// Third `:` segment of the endpoint (the port of `http://host:port`).
    pub fn endpoint_tail(&self) -> &str {
        self.endpoint.split(':').nth(2).unwrap_or(&self.endpoint)
    }
}

/// Today's quota cutoff in local time.
pub fn reset_cutoff(now: DateTime<Local>) -> DateTime<Local> {
    let time = NaiveTime::from_hms_opt(RESET_HOUR, RESET_MINUTE, RESET_SECOND).unwrap_or_default();
    Local
        .from_local_datetime(&now.date_naive().and_time(time))
        .earliest()
        .unwrap_or(now)
}

#[derive(Debug, Default)]
pub struct AccountPool {
    accounts: Mutex<Vec<AccountRecord>>,
}

impl AccountPool {
    pub fn new(endpoints: &[String], daily_limit: u32) -> Self {
        Self::from_records(endpoints.iter().map(|e| AccountRecord::new(e.clone(), daily_limit)).collect())
    }

    pub fn from_records(records: Vec<AccountRecord>) -> Self {
        Self { accounts: Mutex::new(records) }
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AccountRecord> {
        self.accounts.lock().clone()
    }

    fn reset_quotas(accounts: &mut [AccountRecord], now: DateTime<Local>) {
        let cutoff = reset_cutoff(now);
        for account in accounts.iter_mut() {
            let stale = account.last_attempt.is_none_or(|t| t < cutoff);
            if !stale {
                continue;
            }
            account.used_count = 0;
            if account.last_status == INSUFFICIENT_CREDITS {
                account.last_status = STATUS_OK.to_string();
            }
        }
    }

    pub fn select(&self, kind: RequestKind) -> Option<String> {
        self.select_at(kind, Local::now())
    }

    /// Healthy accounts first, in registration order; otherwise the
    /// least recently tried account with capacity left.
    ///
    /// A create selection reserves one unit of the account's quota until
    /// it is settled by `record_success`, `record_failure` or `release`.
    pub fn select_at(&self, kind: RequestKind, now: DateTime<Local>) -> Option<String> {
        let mut accounts = self.accounts.lock();
        Self::reset_quotas(&mut accounts, now);

        let index = match accounts.iter().position(|a| a.is_preferred(kind)) {
            Some(i) => {
                debug!("[Nicesuno] account {} is healthy, selected", accounts[i].endpoint);
                i
            }
            None => {
                // `min_by_key` keeps the first of equal keys; `None` sorts first.
                let fallback = accounts
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.has_capacity(kind))
                    .min_by_key(|(_, a)| a.last_attempt)
                    .map(|(i, _)| i);
                let Some(i) = fallback else {
                    warn!("[Nicesuno] no account available: {:?}", *accounts);
                    return None;
                };
                debug!("[Nicesuno] account {} last failed with '{}', retrying it", accounts[i].endpoint, accounts[i].last_status);
                i
            }
        };
        let account = &mut accounts[index];
        if kind == RequestKind::Create {
            account.reserved += 1;
        }
        Some(account.endpoint.clone())
    }

    fn record_at(&self, endpoint: &str, kind: RequestKind, now: DateTime<Local>, f: impl FnOnce(&mut AccountRecord)) {
        let mut accounts = self.accounts.lock();
        if let Some(account) = accounts.iter_mut().find(|a| a.endpoint == endpoint) {
            account.last_attempt = Some(now);
            if kind == RequestKind::Create {
                account.reserved = account.reserved.saturating_sub(1);
            }
            f(account);
        }
    }

    /// Drops a create reservation that never reached the upstream.
    pub fn release(&self, endpoint: &str) {
        let mut accounts = self.accounts.lock();
        if let Some(account) = accounts.iter_mut().find(|a| a.endpoint == endpoint) {
            account.reserved = account.reserved.saturating_sub(1);
        }
    }

    /// Only create requests count against the daily limit.
    pub fn record_success(&self, endpoint: &str, kind: RequestKind) {
        self.record_success_at(endpoint, kind, Local::now());
    }

    pub fn record_success_at(&self, endpoint: &str, kind: RequestKind, now: DateTime<Local>) {
        self.record_at(endpoint, kind, now, |a| {
            a.last_status = STATUS_OK.to_string();
            if kind == RequestKind::Create {
                a.used_count += 1;
            }
        });
    }

    pub fn record_failure(&self, endpoint: &str, kind: RequestKind, detail: &str) {
        self.record_failure_at(endpoint, kind, detail, Local::now());
    }

    pub fn record_failure_at(&self, endpoint: &str, kind: RequestKind, detail: &str, now: DateTime<Local>) {
        self.record_at(endpoint, kind, now, |a| {
            a.last_status = detail.to_string();
            if detail == INSUFFICIENT_CREDITS {
                a.used_count = a.daily_limit;
            }
        });
    }

    pub fn info(&self) -> String {
        self.info_at(Local::now())
    }

    /// One tab-separated line per account.
    pub fn info_at(&self, now: DateTime<Local>) -> String {
        let mut accounts = self.accounts.lock();
        Self::reset_quotas(&mut accounts, now);
        let lines: Vec<String> = accounts
            .iter()
            .map(|a| {
                let last = a
                    .last_attempt
                    .map(|t| t.format("%Y/%m/%d %H:%M").to_string())
                    .unwrap_or_else(|| "0001/01/01 00:00".to_string());
                format!("{}\t{}/{}\t{}\t{}", a.endpoint_tail(), a.used_count, a.daily_limit, last, a.last_status)
            })
            .collect();
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        let naive = Local::now().date_naive().and_hms_opt(h, m, 0).unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn record(endpoint: &str, status: &str, used: u32, last: Option<DateTime<Local>>) -> AccountRecord {
        AccountRecord {
            endpoint: endpoint.to_string(),
            last_attempt: last,
            last_status: status.to_string(),
            used_count: used,
            daily_limit: 5,
            reserved: 0,
        }
    }

    #[test]
    fn healthy_account_wins_the_first_pass() {
        let noon = at(12, 0);
        let used = Some(at(11, 30));
        let pool = AccountPool::from_records(vec![
            record("http://a:1", "error", 0, used),
            record("http://b:2", "ok", 0, used),
            record("http://c:3", "", 0, used),
        ]);
        assert_eq!(pool.select_at(RequestKind::Create, noon).as_deref(), Some("http://b:2"));
    }

    #[test]
    fn nothing_under_limit_means_no_account() {
        let noon = at(12, 0);
        let used = Some(at(11, 30));
        let pool = AccountPool::from_records(vec![
            record("http://a:1", "error", 5, used),
            record("http://b:2", "ok", 5, used),
            record("http://c:3", "", 5, used),
        ]);
        assert_eq!(pool.select_at(RequestKind::Create, noon), None);
        // Reads do not need capacity.
        assert_eq!(pool.select_at(RequestKind::Read, noon).as_deref(), Some("http://b:2"));
    }

    #[test]
    fn fallback_picks_the_oldest_attempt() {
        let noon = at(12, 0);
        let pool = AccountPool::from_records(vec![
            record("http://a:1", "Unauthorized", 0, Some(at(11, 50))),
            record("http://b:2", "Topic too long.", 0, Some(at(11, 10))),
            record("http://c:3", "boom", 0, Some(at(11, 40))),
        ]);
        assert_eq!(pool.select_at(RequestKind::Create, noon).as_deref(), Some("http://b:2"));
    }

    #[test]
    fn reads_accept_insufficient_credits() {
        let noon = at(12, 0);
        let pool = AccountPool::from_records(vec![
            record("http://a:1", "Unauthorized", 0, Some(at(11, 10))),
            record("http://b:2", INSUFFICIENT_CREDITS, 5, Some(at(11, 50))),
        ]);
        assert_eq!(pool.select_at(RequestKind::Read, noon).as_deref(), Some("http://b:2"));
        assert_eq!(pool.select_at(RequestKind::Create, noon).as_deref(), Some("http://a:1"));
    }

    #[test]
    fn quota_resets_only_for_attempts_before_cutoff() {
        let noon = at(12, 0);
        let pool = AccountPool::from_records(vec![
            record("http://a:1", INSUFFICIENT_CREDITS, 5, Some(at(12, 0) - Duration::days(1))),
            record("http://b:2", "ok", 3, Some(at(11, 30))),
        ]);
        pool.select_at(RequestKind::Create, noon);
        let snap = pool.snapshot();
        assert_eq!(snap[0].used_count, 0);
        assert_eq!(snap[0].last_status, STATUS_OK);
        assert_eq!(snap[1].used_count, 3);
    }

    #[test]
    fn accounting_after_use() {
        let pool = AccountPool::new(&["http://host:8000".to_string()], 5);
        let noon = at(12, 0);
        pool.record_success_at("http://host:8000", RequestKind::Create, noon);
        pool.record_success_at("http://host:8000", RequestKind::Read, noon);
        assert_eq!(pool.snapshot()[0].used_count, 1);

        pool.record_failure_at("http://host:8000", RequestKind::Create, INSUFFICIENT_CREDITS, noon);
        let snap = pool.snapshot();
        assert_eq!(snap[0].used_count, 5);
        assert_eq!(snap[0].last_status, INSUFFICIENT_CREDITS);
        assert_eq!(snap[0].last_attempt, Some(noon));
    }

    #[test]
    fn in_flight_creates_hold_their_quota() {
        let noon = at(12, 0);
        let mut limited = record("http://host:8000", "ok", 3, Some(at(11, 30)));
        limited.daily_limit = 4;
        let pool = AccountPool::from_records(vec![limited]);

        assert_eq!(pool.select_at(RequestKind::Create, noon).as_deref(), Some("http://host:8000"));
        // The last unit is reserved by the request above.
        assert_eq!(pool.select_at(RequestKind::Create, noon), None);
        assert_eq!(pool.select_at(RequestKind::Read, noon).as_deref(), Some("http://host:8000"));
        assert_eq!(pool.snapshot()[0].reserved, 1);

        pool.record_success_at("http://host:8000", RequestKind::Create, noon);
        let snap = pool.snapshot();
        assert_eq!((snap[0].used_count, snap[0].reserved), (4, 0));
        assert_eq!(pool.select_at(RequestKind::Create, noon), None);
    }

    #[test]
    fn failed_or_released_creates_give_the_quota_back() {
        let noon = at(12, 0);
        let pool = AccountPool::from_records(vec![record("http://host:8000", "ok", 4, Some(at(11, 30)))]);

        pool.select_at(RequestKind::Create, noon);
        pool.record_failure_at("http://host:8000", RequestKind::Create, "Too many running jobs.", noon);
        assert_eq!(pool.snapshot()[0].reserved, 0);
        assert_eq!(pool.snapshot()[0].used_count, 4);

        assert!(pool.select_at(RequestKind::Create, noon).is_some());
        pool.release("http://host:8000");
        assert_eq!(pool.snapshot()[0].reserved, 0);
        assert_eq!(pool.select_at(RequestKind::Create, noon).as_deref(), Some("http://host:8000"));
    }

    #[test]
    fn info_lists_port_usage_and_status() {
        let pool = AccountPool::from_records(vec![record("http://host:8000", "ok", 2, Some(at(12, 0)))]);
        let line = pool.info_at(at(12, 30));
        let expected_time = at(12, 0).format("%Y/%m/%d %H:%M").to_string();
        assert_eq!(line, format!("8000\t2/5\t{}\tok", expected_time));
    }
}
