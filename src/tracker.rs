//! Instrumentation around LLM calls.
//!
//! Two forms share one recording path:
//! - wrapping: [`Tracker::call`] / [`Tracker::wrap`] run a unit of work and,
//!   if it succeeds, price the usage reported by its result
//! - scoped: [`Tracker::scope`] returns a [`SpendScope`] guard whose token
//!   slots the caller fills in; the record is written when the scope ends
//!
//! Recording never changes what the instrumented code sees. Failed units
//! produce no record and their error is returned untouched. Unrecognised
//! usage, unpriced models and store failures are logged and skipped.

use std::time::Instant;

use chrono::{SubsecRound, Utc};

use crate::db::SpendStore;
use crate::error::{Result, SpendError};
use crate::models::{CallRecord, CallSite};
use crate::pricing::{PriceEntry, pricing_for_model};
use crate::usage::{ReportsUsage, TokenUsage};

/// Capture the current call site, including the enclosing function path.
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __here() {}
        $crate::models::CallSite::from_type_name(
            file!(),
            line!(),
            $crate::tracker::type_name_of(__here),
        )
    }};
}

/// Run a unit of work under a [`Tracker`], attributing it to the enclosing function.
///
/// ```ignore
/// let response = llm_spend::track!(tracker, || client.chat(&request))?;
/// ```
#[macro_export]
macro_rules! track {
    ($tracker:expr, $work:expr) => {
        $tracker.call_at($crate::call_site!(), $work)
    };
}

/// Open a [`SpendScope`] attributed to the enclosing function.
#[macro_export]
macro_rules! spending {
    ($tracker:expr) => {
        $tracker.scope_at($crate::call_site!())
    };
}

#[doc(hidden)]
pub fn type_name_of<T>(_: T) -> &'static str {
    std::any::type_name::<T>()
}

/// Records calls for one model and label into a store.
#[derive(Debug, Clone)]
pub struct Tracker {
    store: SpendStore,
    model: String,
    label: String,
}

impl Tracker {
    pub fn new(store: SpendStore, model: impl Into<String>) -> Self {
        Self {
            store,
            model: model.into(),
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn store(&self) -> &SpendStore {
        &self.store
    }

    /// Run `work` and record its usage if it returns `Ok`.
    #[track_caller]
    pub fn call<R, E, F>(&self, work: F) -> std::result::Result<R, E>
    where
        R: ReportsUsage,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        self.call_at(CallSite::caller(), work)
    }

    /// [`Tracker::call`] with an explicit call site.
    pub fn call_at<R, E, F>(&self, site: CallSite, work: F) -> std::result::Result<R, E>
    where
        R: ReportsUsage,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let started = Instant::now();
        let response = work()?;
        let duration_ms = elapsed_ms(started);

        match response.token_usage() {
            Ok(usage) => {
                let outcome = self.record(&site, usage, response.reported_model(), duration_ms);
                log_outcome(&site, outcome);
            }
            Err(e) => log::warn!("{}:{}: {e}; call not recorded", site.file, site.line),
        }
        Ok(response)
    }

    /// Wrap `work` so that every call through [`Tracked::call`] is recorded.
    pub fn wrap<F>(self, work: F) -> Tracked<F> {
        Tracked {
            tracker: self,
            work,
        }
    }

    /// Open a scope for a call whose token counts are filled in by hand.
    #[track_caller]
    pub fn scope(&self) -> SpendScope<'_> {
        self.scope_at(CallSite::caller())
    }

    pub fn scope_at(&self, site: CallSite) -> SpendScope<'_> {
        SpendScope {
            tracker: self,
            site,
            started: Instant::now(),
            input_tokens: None,
            output_tokens: None,
            finished: false,
        }
    }

    /// Price `usage` and append it. Shared by both instrumentation forms.
    ///
    /// A model reported by the response wins over the tracker's model when it
    /// has a price; otherwise the tracker's model is used.
    fn record(
        &self,
        site: &CallSite,
        usage: TokenUsage,
        reported_model: Option<&str>,
        duration_ms: u64,
    ) -> Result<CallRecord> {
        let (model, price) = self.resolve_model(reported_model)?;
        let mut record = CallRecord {
            id: None,
            // stored with microsecond precision
            timestamp: Utc::now().trunc_subsecs(6),
            provider: price.provider().as_str().to_string(),
            model,
            label: self.label.clone(),
            source_file: site.file.clone(),
            source_function: site.function.clone(),
            source_line: site.line,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: price.cost(usage.input_tokens, usage.output_tokens),
            duration_ms,
        };
        record.id = Some(self.store.append(&record)?);
        Ok(record)
    }

    fn resolve_model(&self, reported: Option<&str>) -> Result<(String, &'static PriceEntry)> {
        if let Some(reported) = reported
            && let Some(price) = pricing_for_model(reported)
        {
            return Ok((reported.to_string(), price));
        }
        pricing_for_model(&self.model)
            .map(|price| (self.model.clone(), price))
            .ok_or_else(|| SpendError::UnknownModel(self.model.clone()))
    }
}

/// A unit of work wrapped by [`Tracker::wrap`].
///
/// Takes and returns the same types as the wrapped function.
#[derive(Debug, Clone)]
pub struct Tracked<F> {
    tracker: Tracker,
    work: F,
}

impl<F> Tracked<F> {
    #[track_caller]
    pub fn call<A, R, E>(&self, input: A) -> std::result::Result<R, E>
    where
        F: Fn(A) -> std::result::Result<R, E>,
        R: ReportsUsage,
    {
        let site = CallSite::caller();
        self.tracker.call_at(site, || (self.work)(input))
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn into_inner(self) -> F {
        self.work
    }
}

/// Guard for a manually accounted call.
///
/// Set both token slots before the scope ends. [`SpendScope::finish`] ends it
/// explicitly and reports errors; otherwise dropping the guard records the
/// call, including when unwinding from a panic. Nothing is written unless both
/// slots are set.
#[derive(Debug)]
pub struct SpendScope<'a> {
    tracker: &'a Tracker,
    site: CallSite,
    started: Instant,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    finished: bool,
}

impl SpendScope<'_> {
    pub fn set_usage(&mut self, usage: TokenUsage) {
        self.input_tokens = Some(usage.input_tokens);
        self.output_tokens = Some(usage.output_tokens);
    }

    /// Fill both slots from a response.
    pub fn observe<R: ReportsUsage + ?Sized>(&mut self, response: &R) -> Result<TokenUsage> {
        let usage = response.token_usage()?;
        self.set_usage(usage);
        Ok(usage)
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(TokenUsage::new(input, output)),
            _ => None,
        }
    }

    /// End the scope. Returns the written record, or `None` if the slots were not both set.
    pub fn finish(mut self) -> Result<Option<CallRecord>> {
        self.flush()
    }

    fn flush(&mut self) -> Result<Option<CallRecord>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;
        let Some(usage) = self.usage() else {
            log::debug!(
                "{}:{}: scope ended without token counts; call not recorded",
                self.site.file,
                self.site.line
            );
            return Ok(None);
        };
        self.tracker
            .record(&self.site, usage, None, elapsed_ms(self.started))
            .map(Some)
    }
}

impl Drop for SpendScope<'_> {
    fn drop(&mut self) {
        match self.flush() {
            Ok(Some(record)) => log_outcome(&self.site, Ok(record)),
            Ok(None) => {}
            Err(e) => log_outcome(&self.site, Err(e)),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn log_outcome(site: &CallSite, outcome: Result<CallRecord>) {
    match outcome {
        Ok(record) => log::debug!(
            "{}:{} {} cost ${} ({} in / {} out)",
            site.file,
            site.line,
            record.model,
            record.cost_usd,
            record.input_tokens,
            record.output_tokens
        ),
        Err(e @ SpendError::UnknownModel(_)) => {
            log::warn!("{}:{}: {e}; call not recorded", site.file, site.line)
        }
        Err(e) => log::error!(
            "{}:{}: failed to record call: {e}",
            site.file,
            site.line
        ),
    }
}
