//! Readiness state machine.
//!
//! The machine is fed one [`Probe`] per polling tick and decides what the
//! driver does next. It holds no clock of its own; elapsed time is passed in
//! with every sample, so the whole decision logic runs without a browser.
//!
//! ```text
//! Navigating ──► ContentLoading ──► ContentStable
//!     │  ▲            │
//!     ▼  │            ▼
//! LoginRequired / ErrorPage ──► Failed (timeout)
//! ```

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ReadinessConfig;
use crate::error::SessionDiagnostic;

static ERROR_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(403|404|410|500|503)(/|$)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Navigating,
    LoginRequired,
    ErrorPage,
    ContentLoading,
    ContentStable,
    Failed,
}

impl ReadinessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadinessState::ContentStable | ReadinessState::Failed)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadinessState::Navigating => "navigating",
            ReadinessState::LoginRequired => "login_required",
            ReadinessState::ErrorPage => "error_page",
            ReadinessState::ContentLoading => "content_loading",
            ReadinessState::ContentStable => "content_stable",
            ReadinessState::Failed => "failed",
        })
    }
}

/// One observation of the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Probe {
    pub href: String,
    pub ready_state: String,
    /// The document model is reachable
    pub has_model: bool,
    pub block_count: u64,
    pub text_length: u64,
    /// The page shows login controls
    pub login_markers: bool,
    pub error_code: Option<String>,
    /// Blocks that only fill in once scrolled into view
    pub lazy_blocks: u64,
}

impl Probe {
    /// Growth proxy compared between samples
    pub fn content_size(&self) -> u64 {
        self.block_count + self.text_length
    }

    fn is_login_page(&self) -> bool {
        if self.login_markers {
            return true;
        }
        let Ok(url) = Url::parse(&self.href) else {
            return false;
        };
        let host = url.host_str().unwrap_or_default();
        host.starts_with("passport.")
            || host.starts_with("accounts.")
            || url.path().contains("/accounts/page/login")
            || url.path().starts_with("/suite/passport")
    }

    fn error_page_code(&self) -> Option<String> {
        if let Some(code) = self.error_code.as_ref().filter(|code| !code.is_empty()) {
            return Some(code.clone());
        }
        let url = Url::parse(&self.href).ok()?;
        ERROR_PATH
            .captures(url.path())
            .map(|captures| captures[1].to_string())
    }

    fn classify(&self) -> ReadinessState {
        if self.is_login_page() {
            ReadinessState::LoginRequired
        } else if self.error_page_code().is_some() {
            ReadinessState::ErrorPage
        } else if !self.has_model || self.ready_state == "loading" {
            ReadinessState::Navigating
        } else {
            ReadinessState::ContentLoading
        }
    }
}

/// What the driver does after a sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Sleep and probe again, scrolling virtualized containers first if set
    Poll { scroll: bool },
    /// Stuck on a login wall or error page until something outside changes it
    Blocked(ReadinessState),
    /// Capture now
    Stable,
    /// The time budget ran out. The diagnostic names the state it ran out in.
    TimedOut(SessionDiagnostic),
}

pub struct ReadinessMachine {
    url: String,
    state: ReadinessState,
    required_samples: u32,
    max_scroll_passes: u32,
    timeout: Duration,
    login_grace: Option<Duration>,
    /// Elapsed time when the login wall appeared
    blocked_since: Option<Duration>,
    stable_samples: u32,
    last_size: Option<u64>,
    scroll_passes: u32,
    elapsed: Duration,
    href: Option<String>,
    error_code: Option<String>,
    timed_out_in: Option<ReadinessState>,
}

impl ReadinessMachine {
    pub fn new(url: impl Into<String>, config: &ReadinessConfig) -> Self {
        Self {
            url: url.into(),
            state: ReadinessState::Navigating,
            required_samples: config.stable_samples.max(1),
            max_scroll_passes: config.max_scroll_passes,
            timeout: config.timeout(),
            login_grace: config.login_grace(),
            blocked_since: None,
            stable_samples: 0,
            last_size: None,
            scroll_passes: 0,
            elapsed: Duration::ZERO,
            href: None,
            error_code: None,
            timed_out_in: None,
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    /// Consecutive samples without growth so far
    pub fn stable_samples(&self) -> u32 {
        self.stable_samples
    }

    pub fn scroll_passes(&self) -> u32 {
        self.scroll_passes
    }

    /// Feed one sample. `None` means the page could not be probed at all.
    pub fn observe(&mut self, probe: Option<&Probe>, elapsed: Duration) -> Step {
        match self.state {
            ReadinessState::ContentStable => return Step::Stable,
            ReadinessState::Failed => return Step::TimedOut(self.diagnostic()),
            _ => {}
        }
        self.elapsed = elapsed;

        if let Some(probe) = probe {
            self.href = Some(probe.href.clone()).filter(|href| !href.is_empty());
            self.error_code = probe.error_page_code();
            self.transition(probe.classify());
        }

        match self.state {
            ReadinessState::LoginRequired | ReadinessState::ErrorPage => {
                if self.out_of_time() || self.login_grace_spent() {
                    self.fail()
                } else {
                    Step::Blocked(self.state)
                }
            }
            ReadinessState::ContentLoading => match probe {
                Some(probe) => self.sample(probe),
                None if self.out_of_time() => self.fail(),
                None => Step::Poll { scroll: false },
            },
            _ => {
                if self.out_of_time() {
                    self.fail()
                } else {
                    Step::Poll { scroll: false }
                }
            }
        }
    }

    /// The time budget ran out while the driver was waiting on the page
    pub fn expire(&mut self, elapsed: Duration) -> SessionDiagnostic {
        self.elapsed = elapsed;
        if self.state != ReadinessState::Failed {
            self.fail();
        }
        self.diagnostic()
    }

    /// Note that the driver ran one scroll pass
    pub fn record_scroll(&mut self) {
        self.scroll_passes += 1;
    }

    pub fn diagnostic(&self) -> SessionDiagnostic {
        SessionDiagnostic {
            url: self.url.clone(),
            state: self.timed_out_in.unwrap_or(self.state),
            elapsed: self.elapsed,
            stable_samples: self.stable_samples,
            content_size: self.last_size,
            scroll_passes: self.scroll_passes,
            href: self.href.clone(),
            error_code: self.error_code.clone(),
        }
    }

    fn transition(&mut self, next: ReadinessState) {
        if next == self.state {
            return;
        }
        debug!("Readiness {} -> {} for {}", self.state, next, self.url);
        if self.state == ReadinessState::ContentLoading || next == ReadinessState::ContentLoading {
            self.stable_samples = 0;
            self.last_size = None;
        }
        self.blocked_since =
            (next == ReadinessState::LoginRequired).then_some(self.elapsed);
        self.state = next;
    }

    fn sample(&mut self, probe: &Probe) -> Step {
        let size = probe.content_size();
        match self.last_size {
            Some(previous) if previous == size => self.stable_samples += 1,
            _ => self.stable_samples = 0,
        }
        self.last_size = Some(size);

        let scroll = probe.lazy_blocks > 0 && self.scroll_passes < self.max_scroll_passes;

        if self.stable_samples >= self.required_samples && !scroll {
            debug!(
                "Content stable for {} after {} samples, size {}",
                self.url, self.stable_samples, size
            );
            self.state = ReadinessState::ContentStable;
            Step::Stable
        } else if self.out_of_time() {
            self.fail()
        } else {
            Step::Poll { scroll }
        }
    }

    fn out_of_time(&self) -> bool {
        self.elapsed >= self.timeout
    }

    fn login_grace_spent(&self) -> bool {
        match (self.state, self.login_grace, self.blocked_since) {
            (ReadinessState::LoginRequired, Some(grace), Some(since)) => {
                self.elapsed.saturating_sub(since) >= grace
            }
            _ => false,
        }
    }

    fn fail(&mut self) -> Step {
        self.timed_out_in = Some(self.state);
        self.state = ReadinessState::Failed;
        Step::TimedOut(self.diagnostic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> ReadinessConfig {
        ReadinessConfig {
            poll_interval_ms: 500,
            stable_samples: 3,
            timeout_secs: 10,
            max_scroll_passes: 2,
            dismiss_popups: true,
            login_grace_secs: None,
        }
    }

    fn loaded(size: u64) -> Probe {
        Probe {
            href: "https://acme.feishu.cn/docx/AbC".to_string(),
            ready_state: "complete".to_string(),
            has_model: true,
            block_count: size,
            ..Probe::default()
        }
    }

    fn at(href: &str) -> Probe {
        Probe {
            href: href.to_string(),
            ready_state: "complete".to_string(),
            ..Probe::default()
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_three_quiet_samples_make_it_stable() {
        let mut machine = ReadinessMachine::new("u", &config());
        assert_eq!(machine.observe(Some(&loaded(10)), secs(0)), Step::Poll { scroll: false });
        assert_eq!(machine.state(), ReadinessState::ContentLoading);
        machine.observe(Some(&loaded(10)), secs(1));
        machine.observe(Some(&loaded(10)), secs(2));
        assert_eq!(machine.stable_samples(), 2);
        assert_eq!(machine.observe(Some(&loaded(10)), secs(3)), Step::Stable);
        assert_eq!(machine.state(), ReadinessState::ContentStable);
    }

    #[test]
    fn test_growth_resets_the_counter() {
        let mut machine = ReadinessMachine::new("u", &config());
        for (i, size) in [10, 10, 10, 12, 12, 12].into_iter().enumerate() {
            let step = machine.observe(Some(&loaded(size)), secs(i as u64));
            assert_eq!(step, Step::Poll { scroll: false }, "sample {}", i);
        }
        assert_eq!(machine.stable_samples(), 2);
        assert_eq!(machine.observe(Some(&loaded(12)), secs(6)), Step::Stable);
    }

    #[test]
    fn test_shrinking_content_is_not_quiet() {
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&loaded(10)), secs(0));
        machine.observe(Some(&loaded(10)), secs(1));
        machine.observe(Some(&loaded(8)), secs(2));
        assert_eq!(machine.stable_samples(), 0);
    }

    #[test]
    fn test_navigating_until_model_appears() {
        let mut machine = ReadinessMachine::new("u", &config());
        let mut probe = loaded(0);
        probe.has_model = false;
        machine.observe(Some(&probe), secs(0));
        assert_eq!(machine.state(), ReadinessState::Navigating);

        probe.has_model = true;
        probe.ready_state = "loading".to_string();
        machine.observe(Some(&probe), secs(1));
        assert_eq!(machine.state(), ReadinessState::Navigating);

        machine.observe(Some(&loaded(3)), secs(2));
        assert_eq!(machine.state(), ReadinessState::ContentLoading);
    }

    #[rstest]
    #[case("https://passport.feishu.cn/suite/passport/page/login/")]
    #[case("https://acme.feishu.cn/accounts/page/login?redirect_uri=x")]
    fn test_login_wall(#[case] href: &str) {
        let mut machine = ReadinessMachine::new("u", &config());
        assert_eq!(
            machine.observe(Some(&at(href)), secs(0)),
            Step::Blocked(ReadinessState::LoginRequired)
        );
    }

    #[test]
    fn test_login_markers() {
        let mut machine = ReadinessMachine::new("u", &config());
        let mut probe = loaded(5);
        probe.login_markers = true;
        machine.observe(Some(&probe), secs(0));
        assert_eq!(machine.state(), ReadinessState::LoginRequired);
    }

    #[test]
    fn test_error_page() {
        let mut machine = ReadinessMachine::new("u", &config());
        let step = machine.observe(Some(&at("https://acme.feishu.cn/404")), secs(0));
        assert_eq!(step, Step::Blocked(ReadinessState::ErrorPage));
        assert_eq!(machine.diagnostic().error_code.as_deref(), Some("404"));

        let mut probe = loaded(1);
        probe.error_code = Some("403".to_string());
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&probe), secs(0));
        assert_eq!(machine.state(), ReadinessState::ErrorPage);
    }

    #[test]
    fn test_login_then_document() {
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&at("https://passport.feishu.cn/login")), secs(0));
        machine.observe(Some(&loaded(4)), secs(1));
        assert_eq!(machine.state(), ReadinessState::ContentLoading);
        assert_eq!(machine.stable_samples(), 0);
    }

    #[test]
    fn test_timeout_while_blocked() {
        let mut machine = ReadinessMachine::new("u", &config());
        let login = at("https://passport.feishu.cn/login");
        machine.observe(Some(&login), secs(9));
        match machine.observe(Some(&login), secs(10)) {
            Step::TimedOut(diagnostic) => {
                assert_eq!(diagnostic.state, ReadinessState::LoginRequired);
                assert_eq!(diagnostic.elapsed, secs(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(machine.state(), ReadinessState::Failed);
        assert!(matches!(machine.observe(None, secs(11)), Step::TimedOut(_)));
    }

    #[test]
    fn test_timeout_while_loading_reports_progress() {
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&loaded(1)), secs(8));
        match machine.observe(Some(&loaded(2)), secs(10)) {
            Step::TimedOut(diagnostic) => {
                assert_eq!(diagnostic.state, ReadinessState::ContentLoading);
                assert_eq!(diagnostic.content_size, Some(2));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_stable_wins_over_timeout() {
        let mut machine = ReadinessMachine::new("u", &config());
        for i in 0..3 {
            machine.observe(Some(&loaded(7)), secs(i));
        }
        assert_eq!(machine.observe(Some(&loaded(7)), secs(60)), Step::Stable);
    }

    #[test]
    fn test_unprobed_samples_do_not_count() {
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&loaded(7)), secs(0));
        machine.observe(Some(&loaded(7)), secs(1));
        assert_eq!(machine.observe(None, secs(2)), Step::Poll { scroll: false });
        assert_eq!(machine.stable_samples(), 1);
        assert_eq!(machine.state(), ReadinessState::ContentLoading);
    }

    #[test]
    fn test_scroll_passes_are_bounded() {
        let mut machine = ReadinessMachine::new("u", &config());
        let mut probe = loaded(5);
        probe.lazy_blocks = 1;

        let mut scrolls = 0;
        for i in 0..20 {
            match machine.observe(Some(&probe), secs(i) / 4) {
                Step::Poll { scroll: true } => {
                    scrolls += 1;
                    machine.record_scroll();
                }
                Step::Poll { scroll: false } => {}
                Step::Stable => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(scrolls, 2);
        assert_eq!(machine.state(), ReadinessState::ContentStable);
    }

    #[test]
    fn test_expire_keeps_the_state_it_was_waiting_in() {
        let mut machine = ReadinessMachine::new("u", &config());
        machine.observe(Some(&loaded(7)), secs(0));
        let diagnostic = machine.expire(secs(12));
        assert_eq!(diagnostic.state, ReadinessState::ContentLoading);
        assert_eq!(diagnostic.elapsed, secs(12));
        assert_eq!(machine.state(), ReadinessState::Failed);
        assert_eq!(machine.expire(secs(13)).state, ReadinessState::ContentLoading);
    }

    #[test]
    fn test_login_grace_fails_early() {
        let mut config = config();
        config.login_grace_secs = Some(3);
        let mut machine = ReadinessMachine::new("u", &config);
        let login = Probe {
            href: "https://passport.feishu.cn/login".to_string(),
            ..Default::default()
        };

        machine.observe(Some(&loaded(1)), secs(0));
        assert_eq!(
            machine.observe(Some(&login), secs(2)),
            Step::Blocked(ReadinessState::LoginRequired)
        );
        assert_eq!(
            machine.observe(Some(&login), secs(4)),
            Step::Blocked(ReadinessState::LoginRequired)
        );
        match machine.observe(Some(&login), secs(5)) {
            Step::TimedOut(diagnostic) => assert_eq!(diagnostic.state, ReadinessState::LoginRequired),
            other => panic!("expected early failure, got {:?}", other),
        }
    }

    #[test]
    fn test_login_waits_full_timeout_without_grace() {
        let mut machine = ReadinessMachine::new("u", &config());
        let login = Probe {
            href: "https://passport.feishu.cn/login".to_string(),
            ..Default::default()
        };
        assert_eq!(
            machine.observe(Some(&login), secs(9)),
            Step::Blocked(ReadinessState::LoginRequired)
        );
        assert!(matches!(machine.observe(Some(&login), secs(10)), Step::TimedOut(_)));
    }
}
