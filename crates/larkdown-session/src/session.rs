//! Async driver for the readiness state machine.

use serde_json::Value;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::channel::RemoteChannel;
use crate::config::ReadinessConfig;
use crate::error::{ExtractError, SessionDiagnostic, TransportError};
use crate::readiness::{Probe, ReadinessMachine, ReadinessState, Step};
use crate::scripts;

/// How the wait for content ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Stable,
    /// Content kept changing until the time budget ran out; capture anyway
    Partial(SessionDiagnostic),
}

impl Readiness {
    pub fn is_partial(&self) -> bool {
        matches!(self, Readiness::Partial(_))
    }
}

/// Outcome of one page call bounded by the session deadline
enum Call<T> {
    Done(T),
    Expired,
}

/// Drives one browser tab from navigation to stable content.
pub struct ExtractionSession<'a, C: RemoteChannel + ?Sized> {
    channel: &'a C,
    config: &'a ReadinessConfig,
    machine: ReadinessMachine,
    url: String,
}

impl<'a, C: RemoteChannel + ?Sized> ExtractionSession<'a, C> {
    pub fn new(channel: &'a C, url: impl Into<String>, config: &'a ReadinessConfig) -> Self {
        let url = url.into();
        Self {
            channel,
            config,
            machine: ReadinessMachine::new(url.clone(), config),
            url,
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.machine.state()
    }

    /// Poll the page until it is stable, blocked past the timeout, or
    /// unreachable. The page must already be navigating to the document.
    /// Page calls share the time budget, so a hung page still times out.
    pub async fn wait_until_ready(&mut self) -> Result<Readiness, ExtractError> {
        let start = Instant::now();
        let deadline = start + self.config.timeout();
        let mut blocked_in = None;

        loop {
            let probe = match self.probe(deadline).await? {
                Call::Done(probe) => probe,
                Call::Expired => return self.expire(start),
            };

            match self.machine.observe(probe.as_ref(), start.elapsed()) {
                Step::Stable => {
                    info!(
                        "Document stable after {:.1}s: {}",
                        start.elapsed().as_secs_f64(),
                        self.url
                    );
                    return Ok(Readiness::Stable);
                }
                Step::Poll { scroll } => {
                    blocked_in = None;
                    if self.machine.state() == ReadinessState::ContentLoading {
                        if let Call::Expired = self.dismiss_popups(deadline).await? {
                            return self.expire(start);
                        }
                        if scroll {
                            if let Call::Expired = self.scroll_pass(deadline).await? {
                                return self.expire(start);
                            }
                        }
                    }
                }
                Step::Blocked(state) => {
                    if blocked_in != Some(state) {
                        warn!("Session {} for {}, waiting", state, self.url);
                        blocked_in = Some(state);
                    }
                }
                Step::TimedOut(diagnostic) => return self.timed_out(diagnostic),
            }

            sleep(self.config.poll_interval()).await;
        }
    }

    async fn evaluate(
        &self,
        script: &str,
        deadline: Instant,
    ) -> Call<Result<Value, TransportError>> {
        match timeout_at(deadline, self.channel.evaluate(script)).await {
            Ok(result) => Call::Done(result),
            Err(_) => {
                debug!("Page call still pending at the deadline: {}", self.url);
                Call::Expired
            }
        }
    }

    async fn probe(&self, deadline: Instant) -> Result<Call<Option<Probe>>, ExtractError> {
        let result = match self.evaluate(scripts::PROBE, deadline).await {
            Call::Done(result) => result,
            Call::Expired => return Ok(Call::Expired),
        };
        match result {
            Ok(value) => {
                trace!("Probe: {}", value);
                match serde_json::from_value::<Probe>(value) {
                    Ok(probe) => Ok(Call::Done(Some(probe))),
                    Err(e) => {
                        debug!("Unreadable probe result: {}", e);
                        Ok(Call::Done(None))
                    }
                }
            }
            Err(TransportError::Script(message)) => {
                debug!("Probe failed, page not ready: {}", message);
                Ok(Call::Done(None))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn dismiss_popups(&self, deadline: Instant) -> Result<Call<()>, ExtractError> {
        if !self.config.dismiss_popups {
            return Ok(Call::Done(()));
        }
        match self.evaluate(scripts::DISMISS_POPUPS, deadline).await {
            Call::Done(Ok(closed)) => {
                if closed.as_u64().is_some_and(|n| n > 0) {
                    debug!("Dismissed {} popups", closed);
                }
            }
            Call::Done(Err(TransportError::Script(message))) => {
                debug!("Popup dismissal failed: {}", message)
            }
            Call::Done(Err(e)) => return Err(e.into()),
            Call::Expired => return Ok(Call::Expired),
        }
        Ok(Call::Done(()))
    }

    async fn scroll_pass(&mut self, deadline: Instant) -> Result<Call<()>, ExtractError> {
        match self.evaluate(scripts::SCROLL_PASS, deadline).await {
            Call::Done(Ok(height)) => debug!(
                "Scroll pass {} done, height {}",
                self.machine.scroll_passes() + 1,
                height
            ),
            Call::Done(Err(TransportError::Script(message))) => {
                debug!("Scroll pass failed: {}", message)
            }
            Call::Done(Err(e)) => return Err(e.into()),
            Call::Expired => return Ok(Call::Expired),
        }
        self.machine.record_scroll();
        Ok(Call::Done(()))
    }

    fn expire(&mut self, start: Instant) -> Result<Readiness, ExtractError> {
        let diagnostic = self.machine.expire(start.elapsed());
        self.timed_out(diagnostic)
    }

    fn timed_out(&self, diagnostic: SessionDiagnostic) -> Result<Readiness, ExtractError> {
        let url = self.url.clone();
        match diagnostic.state {
            ReadinessState::ContentLoading => {
                warn!("Content still changing, capturing partial document: {}", diagnostic);
                Ok(Readiness::Partial(diagnostic))
            }
            ReadinessState::LoginRequired => Err(ExtractError::LoginRequired { url, diagnostic }),
            ReadinessState::ErrorPage => Err(ExtractError::ErrorPage {
                url,
                code: diagnostic.error_code.clone().unwrap_or_default(),
                diagnostic,
            }),
            _ => Err(ExtractError::Failed(diagnostic)),
        }
    }
}
